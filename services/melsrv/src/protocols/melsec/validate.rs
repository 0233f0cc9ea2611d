//! Configuration-time checks for data blocks
//!
//! Structural problems (unknown device, unknown datatype, bad bit index,
//! empty block) stop at the first offender. Range problems are collected
//! across every block so that one run reports all misplaced fields.

use tracing::debug;

use super::codec::{field_byte_length, field_byte_offset};
use super::types::{DataBlock, Datatype, Units};
use crate::error::{MelsrvError, Result};

/// Highest bit index inside one word
const MAX_BIT_INDEX: u8 = 15;

/// Widest field that still decodes as one integer
const MAX_INTEGER_BYTES: usize = 8;

pub fn validate_blocks(blocks: &[DataBlock]) -> Result<()> {
    let mut invalid: Vec<String> = Vec::new();

    for block in blocks {
        block.device()?;
        if block.wordlength == 0 {
            return Err(MelsrvError::config(format!(
                "Block {}{} has wordlength 0",
                block.register, block.baseaddress
            )));
        }

        let base = block.base_word_address()?;
        let block_start = u64::from(base) * 2;
        let block_end = block_start + block.byte_length() as u64;

        for field in &block.datafields {
            let length = field_byte_length(field)? as u64;
            if field.datatype == Datatype::Bit {
                match field.bit {
                    Some(bit) if bit <= MAX_BIT_INDEX => {},
                    Some(bit) => {
                        return Err(MelsrvError::config(format!(
                            "Bit field '{}' uses bit {} (allowed 0..={})",
                            field.name, bit, MAX_BIT_INDEX
                        )))
                    },
                    None => {
                        return Err(MelsrvError::config(format!(
                            "Bit field '{}' has no bit index",
                            field.name
                        )))
                    },
                }
            }

            if field.datatype == Datatype::Text
                && field.units.as_ref() != Some(&Units::Ascii)
                && length > MAX_INTEGER_BYTES as u64
            {
                return Err(MelsrvError::config(format!(
                    "Text field '{}' is {} bytes; only ASCII text may exceed {} bytes",
                    field.name, length, MAX_INTEGER_BYTES
                )));
            }

            let address = field.word_address()?;
            let field_start = u64::from(address) * 2;
            let field_end = field_start + length;
            if field_start < block_start || field_end > block_end {
                invalid.push(field.name.clone());
                continue;
            }

            // low-byte chars sit one byte past their word start
            let offset = field_byte_offset(base, field)? as u64;
            if offset + length > block.byte_length() as u64 {
                invalid.push(field.name.clone());
            }
        }
    }

    if invalid.is_empty() {
        debug!("Validated {} data block(s)", blocks.len());
        return Ok(());
    }

    invalid.sort();
    invalid.dedup();
    Err(MelsrvError::BlockValidation(invalid))
}
