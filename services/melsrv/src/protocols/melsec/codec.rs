//! MELSEC value codec
//!
//! Pure conversions between wire bytes and typed field values. Nothing here
//! touches a socket.

use tracing::{trace, warn};

use super::types::{CharPos, DataField, Datatype, FieldValue, Units, Value};
use crate::error::{MelsrvError, Result};

/// Little-endian encoding, truncated to `byte_count` bytes
pub fn encode_int_le(n: u64, byte_count: usize) -> Vec<u8> {
    (0..byte_count)
        .map(|i| if i < 8 { (n >> (8 * i)) as u8 } else { 0 })
        .collect()
}

/// Little-endian decoding; bytes beyond the eighth are shifted out
pub fn decode_int_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Upper-case, zero-padded hex with exactly `digits` characters
///
/// Values wider than `digits` keep only their low-order digits.
pub fn encode_hex(n: u64, digits: usize) -> String {
    let masked = if digits >= 16 {
        n
    } else {
        n & ((1u64 << (4 * digits)) - 1)
    };
    format!("{:0width$X}", masked, width = digits)
}

pub fn decode_hex(text: &str) -> Result<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MelsrvError::protocol(format!(
            "Invalid hex text '{}'",
            text.escape_debug()
        )));
    }
    u64::from_str_radix(text, 16)
        .map_err(|e| MelsrvError::protocol(format!("Invalid hex text '{}': {}", text, e)))
}

/// Decode a hex text slice received from the wire
pub fn decode_hex_bytes(text: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(text)
        .map_err(|_| MelsrvError::protocol("Non-ASCII bytes in hex field"))?;
    decode_hex(text)
}

/// Packed BCD, least significant byte first
///
/// Byte `i` contributes `(high_nibble * 10 + low_nibble) * 100^i`.
pub fn decode_bcd(bytes: &[u8]) -> u64 {
    bytes.iter().rev().fold(0u64, |acc, &b| {
        let pair = u64::from(b >> 4) * 10 + u64::from(b & 0x0F);
        acc.wrapping_mul(100).wrapping_add(pair)
    })
}

/// Convert hex text (two characters per byte) to raw bytes
pub fn hex_to_bytes(text: &[u8]) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(MelsrvError::protocol(format!(
            "Odd number of hex characters ({})",
            text.len()
        )));
    }
    text.chunks_exact(2)
        .map(|pair| decode_hex_bytes(pair).map(|v| v as u8))
        .collect()
}

/// Reverse every consecutive pair of bytes in place
///
/// ASCII responses carry each word high byte first; device memory is
/// little-endian.
pub fn swap_byte_pairs(bytes: &mut [u8]) -> Result<()> {
    if bytes.len() % 2 != 0 {
        return Err(MelsrvError::protocol(format!(
            "Cannot swap byte pairs of odd-length payload ({} bytes)",
            bytes.len()
        )));
    }
    for pair in bytes.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    Ok(())
}

/// Number of bytes a field occupies in device memory
pub fn field_byte_length(field: &DataField) -> Result<usize> {
    match &field.datatype {
        Datatype::Bit | Datatype::Word => Ok(2),
        Datatype::Dword => Ok(4),
        Datatype::Char => Ok(1),
        Datatype::Text => field.charlength.ok_or_else(|| {
            MelsrvError::config(format!("Text field '{}' has no charlength", field.name))
        }),
        Datatype::Other(name) => Err(MelsrvError::unknown_datatype(&field.name, name)),
    }
}

/// Byte offset of a field relative to the start of its block
///
/// `char` fields in the low byte sit one byte further than their word
/// address. Existing configurations depend on this placement.
pub fn field_byte_offset(base_address: u32, field: &DataField) -> Result<usize> {
    let address = field.word_address()?;
    let word_offset = address.checked_sub(base_address).ok_or_else(|| {
        MelsrvError::config(format!(
            "Field '{}' at 0x{:X} precedes block base 0x{:X}",
            field.name, address, base_address
        ))
    })?;

    let mut offset = word_offset as usize * 2;
    if field.datatype == Datatype::Char && field.charpos == Some(CharPos::Low) {
        offset += 1;
    }
    Ok(offset)
}

/// Decode one field out of a block's raw (little-endian) bytes
pub fn field_to_value(base_address: u32, field: &DataField, raw: &[u8]) -> Result<FieldValue> {
    let start = field_byte_offset(base_address, field)?;
    let length = field_byte_length(field)?;
    let end = start + length;
    let chunk = raw.get(start..end).ok_or_else(|| {
        MelsrvError::protocol(format!(
            "Field '{}' needs bytes {}..{} but block holds {} bytes",
            field.name,
            start,
            end,
            raw.len()
        ))
    })?;

    let units = field.units.as_ref().unwrap_or(&Units::Binary);
    let value = match (&field.datatype, units) {
        (_, Units::Bcd) => Value::Int(decode_bcd(chunk) as i64),
        (Datatype::Text, Units::Ascii) => {
            let text = String::from_utf8_lossy(chunk);
            Value::Text(text.trim_end_matches(['\0', ' ']).to_string())
        },
        (Datatype::Bit, _) => {
            let bit = field.bit.ok_or_else(|| {
                MelsrvError::config(format!("Bit field '{}' has no bit index", field.name))
            })?;
            let word = decode_int_le(chunk);
            let set = bit < 64 && (word >> bit) & 1 == 1;
            Value::Text(if set { "1" } else { "0" }.to_string())
        },
        (Datatype::Dword, Units::Binary) => Value::Int(decode_int_le(chunk) as i64),
        (_, Units::Ascii) => {
            let code = decode_int_le(chunk);
            let ch = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or_else(|| {
                    warn!(
                        "Field '{}' holds 0x{:X}, not a character code",
                        field.name, code
                    );
                    char::REPLACEMENT_CHARACTER
                });
            Value::Text(ch.to_string())
        },
        _ => Value::Int(decode_int_le(chunk) as i64),
    };

    trace!("{} [{}..{}] = {}", field.name, start, end, value);
    Ok(FieldValue {
        value,
        units: field.units.as_ref().map(ToString::to_string),
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn field(name: &str, address: &str, datatype: Datatype, units: Option<Units>) -> DataField {
        DataField {
            name: name.to_string(),
            address: address.to_string(),
            datatype,
            units,
            bit: None,
            charpos: None,
            charlength: None,
        }
    }

    #[test]
    fn test_int_le_round_trip() {
        for (n, width) in [(0u64, 2usize), (0x1234, 2), (0xDEAD_BEEF, 4), (0x0A_0B0C, 3)] {
            let bytes = encode_int_le(n, width);
            assert_eq!(bytes.len(), width);
            assert_eq!(decode_int_le(&bytes), n);
        }
        assert_eq!(encode_int_le(0x0401, 2), vec![0x01, 0x04]);
        // truncation to the requested width
        assert_eq!(encode_int_le(0x12345, 2), vec![0x45, 0x23]);
    }

    #[test]
    fn test_hex_round_trip_and_truncation() {
        assert_eq!(encode_hex(0x3FF, 4), "03FF");
        assert_eq!(encode_hex(0xFF, 2), "FF");
        assert_eq!(decode_hex("03FF").unwrap(), 0x3FF);
        assert_eq!(decode_hex(&encode_hex(0xBEEF, 4)).unwrap(), 0xBEEF);
        assert_eq!(encode_hex(0x12345, 4), "2345");
    }

    #[test]
    fn test_decode_hex_rejects_garbage() {
        assert!(decode_hex("").is_err());
        assert!(decode_hex("12G4").is_err());
        assert!(decode_hex("+1").is_err());
    }

    #[test]
    fn test_decode_bcd_packed_date() {
        assert_eq!(decode_bcd(&[0x25, 0x12, 0x15, 0x20]), 20151225);
        assert_eq!(decode_bcd(&[0x99]), 99);
        assert_eq!(decode_bcd(&[]), 0);
    }

    #[test]
    fn test_swap_byte_pairs() {
        let mut bytes = hex_to_bytes(b"1234ABCD").unwrap();
        swap_byte_pairs(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x34, 0x12, 0xCD, 0xAB]);

        let mut odd = vec![1, 2, 3];
        assert!(swap_byte_pairs(&mut odd).is_err());
        assert!(hex_to_bytes(b"123").is_err());
    }

    #[test]
    fn test_field_byte_length() {
        assert_eq!(field_byte_length(&field("A", "0", Datatype::Bit, None)).unwrap(), 2);
        assert_eq!(field_byte_length(&field("A", "0", Datatype::Word, None)).unwrap(), 2);
        assert_eq!(field_byte_length(&field("A", "0", Datatype::Dword, None)).unwrap(), 4);
        assert_eq!(field_byte_length(&field("A", "0", Datatype::Char, None)).unwrap(), 1);

        let mut text = field("T", "0", Datatype::Text, Some(Units::Ascii));
        assert!(matches!(
            field_byte_length(&text),
            Err(MelsrvError::ConfigError(_))
        ));
        text.charlength = Some(10);
        assert_eq!(field_byte_length(&text).unwrap(), 10);

        let other = field("F", "0", Datatype::Other("float".into()), None);
        assert!(matches!(
            field_byte_length(&other),
            Err(MelsrvError::UnknownDatatype { .. })
        ));
    }

    #[test]
    fn test_field_to_value_dispatch() {
        // words at 0x100..0x106
        let raw: Vec<u8> = vec![
            0x34, 0x12, // 0x100 word 0x1234
            0x78, 0x56, 0x34, 0x12, // 0x101 dword 0x12345678
            0x25, 0x12, // 0x103 BCD 1225
            b'A', b'B', // 0x104 chars
            b'O', b'K', 0, b' ', // 0x105 text "OK"
        ];

        let word = field("W", "0x100", Datatype::Word, None);
        assert_eq!(field_to_value(0x100, &word, &raw).unwrap().value, Value::Int(0x1234));

        let dword = field("DW", "0x101", Datatype::Dword, Some(Units::Binary));
        let v = field_to_value(0x100, &dword, &raw).unwrap();
        assert_eq!(v.value, Value::Int(0x1234_5678));
        assert_eq!(v.units.as_deref(), Some("BINARY"));

        let bcd = field("B", "0x103", Datatype::Word, Some(Units::Bcd));
        assert_eq!(field_to_value(0x100, &bcd, &raw).unwrap().value, Value::Int(1225));

        let mut high = field("CH", "0x104", Datatype::Char, Some(Units::Ascii));
        high.charpos = Some(CharPos::High);
        assert_eq!(field_to_value(0x100, &high, &raw).unwrap().value, Value::from("A"));

        let mut low = high.clone();
        low.charpos = Some(CharPos::Low);
        assert_eq!(field_to_value(0x100, &low, &raw).unwrap().value, Value::from("B"));

        let mut text = field("T", "0x105", Datatype::Text, Some(Units::Ascii));
        text.charlength = Some(4);
        assert_eq!(field_to_value(0x100, &text, &raw).unwrap().value, Value::from("OK"));
    }

    #[test]
    fn test_bit_field_yields_string_flag() {
        let raw = [0b0000_0100, 0x80];
        let mut bit = field("RUN", "0x10", Datatype::Bit, None);
        bit.bit = Some(2);
        assert_eq!(field_to_value(0x10, &bit, &raw).unwrap().value, Value::from("1"));
        bit.bit = Some(3);
        assert_eq!(field_to_value(0x10, &bit, &raw).unwrap().value, Value::from("0"));
        bit.bit = Some(15);
        assert_eq!(field_to_value(0x10, &bit, &raw).unwrap().value, Value::from("1"));
    }

    #[test]
    fn test_field_to_value_is_deterministic() {
        let raw = [0x01, 0x02, 0x03, 0x04];
        let dword = field("DW", "0x0", Datatype::Dword, None);
        let a = field_to_value(0, &dword, &raw).unwrap();
        let b = field_to_value(0, &dword, &raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_slice_is_an_error() {
        let raw = [0x01, 0x02];
        let dword = field("DW", "0x0", Datatype::Dword, None);
        let err = field_to_value(0, &dword, &raw).unwrap_err();
        assert!(err.to_string().contains("block holds 2 bytes"));

        let before = field("W", "0x0", Datatype::Word, None);
        assert!(field_to_value(0x10, &before, &raw).is_err());
    }

    #[test]
    #[traced_test]
    fn test_invalid_character_code_decodes_as_replacement() {
        let raw = [0x00, 0xD8, 0x41, 0x00];
        let surrogate = field("W", "0x0", Datatype::Word, Some(Units::Ascii));
        let value = field_to_value(0, &surrogate, &raw).unwrap();
        assert_eq!(value.value, Value::Text(char::REPLACEMENT_CHARACTER.to_string()));
        assert!(logs_contain("Field 'W' holds 0xD800, not a character code"));

        let letter = field("L", "0x1", Datatype::Word, Some(Units::Ascii));
        assert_eq!(field_to_value(0, &letter, &raw).unwrap().value, Value::from("A"));
    }
}
