//! 3E frame assembly and response splitting

use bytes::{BufMut, BytesMut};

use super::codec::{
    decode_hex_bytes, decode_int_le, encode_hex, encode_int_le, hex_to_bytes, swap_byte_pairs,
};
use super::constants::*;
use super::types::{DataBlock, DataCode};
use crate::error::{MelsrvError, Result};

/// Build a batch-read request for one block
pub fn build_request(block: &DataBlock, code: DataCode) -> Result<Vec<u8>> {
    let device = block.device()?;
    let head = block.base_word_address()?;
    if head > device.max_head_device() {
        return Err(MelsrvError::config(format!(
            "Head device {}{} exceeds the addressable range",
            block.register, block.baseaddress
        )));
    }

    match code {
        DataCode::Ascii => Ok(build_ascii_request(block, device, head)),
        DataCode::Binary => Ok(build_binary_request(block, device, head)),
    }
}

fn build_ascii_request(block: &DataBlock, device: &DeviceCode, head: u32) -> Vec<u8> {
    let head_device = match device.addressing {
        AddressEncoding::Decimal => format!("{:0width$}", head, width = HEAD_DEVICE_DIGITS),
        AddressEncoding::Hexadecimal => encode_hex(u64::from(head), HEAD_DEVICE_DIGITS),
    };

    let command = format!(
        "{}{}{}{}{}{}",
        encode_hex(MONITOR_TIMER, 4),
        encode_hex(CMD_BATCH_READ, 4),
        encode_hex(SUBCMD_WORD_UNITS, 4),
        device.key,
        head_device,
        encode_hex(u64::from(block.wordlength), 4),
    );

    let mut frame = BytesMut::with_capacity(ASCII_HEADER_LEN + command.len());
    frame.put_slice(SUBHEADER_ASCII.as_bytes());
    frame.put_slice(encode_hex(NETWORK_NO, 2).as_bytes());
    frame.put_slice(encode_hex(PC_NO, 2).as_bytes());
    frame.put_slice(encode_hex(MODULE_IO, 4).as_bytes());
    frame.put_slice(encode_hex(MODULE_STATION, 2).as_bytes());
    frame.put_slice(encode_hex(command.len() as u64, 4).as_bytes());
    frame.put_slice(command.as_bytes());
    frame.to_vec()
}

fn build_binary_request(block: &DataBlock, device: &DeviceCode, head: u32) -> Vec<u8> {
    let mut command = BytesMut::with_capacity(12);
    command.put_slice(&encode_int_le(MONITOR_TIMER, 2));
    command.put_slice(&encode_int_le(CMD_BATCH_READ, 2));
    command.put_slice(&encode_int_le(SUBCMD_WORD_UNITS, 2));
    command.put_slice(&encode_int_le(u64::from(head), HEAD_DEVICE_BYTES));
    command.put_u8(device.octet);
    command.put_u16_le(block.wordlength);

    let mut frame = BytesMut::with_capacity(BINARY_HEADER_LEN + command.len());
    frame.put_slice(&SUBHEADER_BINARY);
    frame.put_slice(&encode_int_le(NETWORK_NO, 1));
    frame.put_slice(&encode_int_le(PC_NO, 1));
    frame.put_slice(&encode_int_le(MODULE_IO, 2));
    frame.put_slice(&encode_int_le(MODULE_STATION, 1));
    frame.put_slice(&encode_int_le(command.len() as u64, 2));
    frame.put_slice(&command);
    frame.to_vec()
}

/// Fixed response header size
pub fn header_len(code: DataCode) -> usize {
    match code {
        DataCode::Ascii => ASCII_HEADER_LEN,
        DataCode::Binary => BINARY_HEADER_LEN,
    }
}

/// Body length announced in a response header
pub fn body_length(header: &[u8], code: DataCode) -> Result<usize> {
    if header.len() < header_len(code) {
        return Err(MelsrvError::protocol(format!(
            "Response header too short: {} of {} bytes",
            header.len(),
            header_len(code)
        )));
    }
    let length = match code {
        DataCode::Ascii => decode_hex_bytes(&header[ASCII_LENGTH_FIELD])?,
        DataCode::Binary => decode_int_le(&header[BINARY_LENGTH_FIELD]),
    };
    Ok(length as usize)
}

/// Split a response body into end code and device-order payload
///
/// The payload is only decoded when the end code is zero; error responses
/// carry diagnostic bytes instead of device data.
pub fn parse_response(body: &[u8], code: DataCode) -> Result<(u16, Vec<u8>)> {
    let end_code_len = match code {
        DataCode::Ascii => ASCII_END_CODE_LEN,
        DataCode::Binary => BINARY_END_CODE_LEN,
    };
    if body.len() < end_code_len {
        return Err(MelsrvError::protocol(format!(
            "Response body of {} bytes has no end code",
            body.len()
        )));
    }

    let (end, rest) = body.split_at(end_code_len);
    let end_code = match code {
        DataCode::Ascii => decode_hex_bytes(end)?,
        DataCode::Binary => decode_int_le(end),
    } as u16;
    if end_code != 0 {
        return Ok((end_code, Vec::new()));
    }

    let payload = match code {
        DataCode::Ascii => {
            let mut bytes = hex_to_bytes(rest)?;
            swap_byte_pairs(&mut bytes)?;
            bytes
        },
        DataCode::Binary => rest.to_vec(),
    };
    Ok((end_code, payload))
}
