//! MELSEC MC protocol (3E frame) constants
//!
//! Frame layout values for the batch-read command, the device code table and
//! the end-code (error) table. Everything here is read-only and shared by all
//! connections.

use std::ops::Range;

// ============================================================================
// Frame constants
// ============================================================================

/// 3E request subheader, ASCII encoding
pub const SUBHEADER_ASCII: &str = "5000";
/// 3E request subheader, binary encoding
pub const SUBHEADER_BINARY: [u8; 2] = [0x50, 0x00];

/// Network number (host station)
pub const NETWORK_NO: u64 = 0x00;
/// PC number (own station)
pub const PC_NO: u64 = 0xFF;
/// Request destination module I/O number
pub const MODULE_IO: u64 = 0x03FF;
/// Request destination module station number
pub const MODULE_STATION: u64 = 0x00;
/// CPU monitoring timer in 250 ms units
pub const MONITOR_TIMER: u64 = 0x0010;

/// Batch read command
pub const CMD_BATCH_READ: u64 = 0x0401;
/// Subcommand: read in word units
pub const SUBCMD_WORD_UNITS: u64 = 0x0000;

/// Number of characters (ASCII) used for the head device number
pub const HEAD_DEVICE_DIGITS: usize = 6;
/// Number of bytes (binary) used for the head device number
pub const HEAD_DEVICE_BYTES: usize = 3;
/// Largest head device number representable in either encoding
pub const MAX_HEAD_DEVICE_HEX: u32 = 0xFF_FFFF;
pub const MAX_HEAD_DEVICE_DECIMAL: u32 = 999_999;

/// Response header sizes
pub const ASCII_HEADER_LEN: usize = 18;
pub const BINARY_HEADER_LEN: usize = 9;

/// Location of the response data length inside the header
pub const ASCII_LENGTH_FIELD: Range<usize> = 14..18;
pub const BINARY_LENGTH_FIELD: Range<usize> = 7..9;

/// Size of the end code at the start of the response body
pub const ASCII_END_CODE_LEN: usize = 4;
pub const BINARY_END_CODE_LEN: usize = 2;

/// Receive buffer chunk size
pub const RECV_CHUNK: usize = 4096;

// ============================================================================
// Device codes
// ============================================================================

/// How a device's head number is written on the wire in ASCII mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEncoding {
    Decimal,
    Hexadecimal,
}

/// One entry of the device code table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCode {
    /// Two-character device key, e.g. `D*`
    pub key: &'static str,
    /// Device code octet used in binary frames
    pub octet: u8,
    /// Head device number notation
    pub addressing: AddressEncoding,
}

impl DeviceCode {
    /// Largest head device number this device can carry in a request
    pub fn max_head_device(&self) -> u32 {
        match self.addressing {
            AddressEncoding::Decimal => MAX_HEAD_DEVICE_DECIMAL,
            AddressEncoding::Hexadecimal => MAX_HEAD_DEVICE_HEX,
        }
    }
}

const fn device(key: &'static str, octet: u8, addressing: AddressEncoding) -> DeviceCode {
    DeviceCode {
        key,
        octet,
        addressing,
    }
}

/// Supported devices (Q/L series, word-unit batch read)
pub const DEVICE_CODES: &[DeviceCode] = &[
    device("D*", 0xA8, AddressEncoding::Decimal),
    device("F*", 0x93, AddressEncoding::Decimal),
    device("W*", 0xB4, AddressEncoding::Hexadecimal),
    device("M*", 0x90, AddressEncoding::Decimal),
    device("SM", 0x91, AddressEncoding::Decimal),
    device("L*", 0x92, AddressEncoding::Decimal),
    device("X*", 0x9C, AddressEncoding::Hexadecimal),
    device("Y*", 0x9D, AddressEncoding::Hexadecimal),
    device("B*", 0xA0, AddressEncoding::Hexadecimal),
    device("SD", 0xA9, AddressEncoding::Decimal),
    device("R*", 0xAF, AddressEncoding::Decimal),
    device("TN", 0xC2, AddressEncoding::Decimal),
    device("CN", 0xC5, AddressEncoding::Decimal),
];

/// Look up a device by its two-character key
pub fn lookup_device(key: &str) -> Option<&'static DeviceCode> {
    DEVICE_CODES.iter().find(|d| d.key == key)
}

// ============================================================================
// End codes
// ============================================================================

/// Known end codes with an exact match
pub const END_CODES: &[(u16, &str)] = &[
    (
        0xC050,
        "ASCII data that cannot be converted to binary was received",
    ),
    (0xC056, "Read/write request exceeds the maximum address"),
    (
        0xC058,
        "Request data length after ASCII-to-binary conversion does not match the number of data",
    ),
    (0xC059, "Wrong Command/Sub-Command"),
    (
        0xC05B,
        "CPU module cannot read or write the specified device",
    ),
    (0xC05C, "Error in request contents"),
    (0xC05F, "Request cannot be executed on the target CPU module"),
    (0xC060, "Error in request contents (bit device data)"),
    (
        0xC061,
        "Request data length does not match the number of data in the character section",
    ),
    (
        0xC06F,
        "Communication data code mismatch (ASCII/binary setting)",
    ),
    (
        0xC070,
        "Device memory extension cannot be specified for the target station",
    ),
    (
        0xC0B5,
        "Data that cannot be handled by the CPU module was specified",
    ),
    (0xC200, "Remote password error"),
    (0xC201, "Communication port is locked by remote password"),
    (
        0xC204,
        "Remote password unlock was requested from a different device",
    ),
];

/// End codes reported by the CPU itself (vendor documents these as one bucket)
pub const CPU_DETECTION_RANGE: std::ops::RangeInclusive<u16> = 0x4000..=0x4FFF;
pub const CPU_DETECTION_MESSAGE: &str = "CPU Detection error";

/// End codes for an oversized block request
pub const TOO_MUCH_DATA_RANGE: std::ops::RangeInclusive<u16> = 0xC051..=0xC055;
pub const TOO_MUCH_DATA_MESSAGE: &str = "Tried to read too much data in one block";

/// Human readable text for a nonzero end code
pub fn describe_end_code(code: u16) -> String {
    let text = END_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
        .or_else(|| CPU_DETECTION_RANGE.contains(&code).then_some(CPU_DETECTION_MESSAGE))
        .or_else(|| TOO_MUCH_DATA_RANGE.contains(&code).then_some(TOO_MUCH_DATA_MESSAGE));

    match text {
        Some(text) => format!("PLC end code 0x{:04X}: {}", code, text),
        None => format!("PLC end code 0x{:04X}: unknown error code", code),
    }
}
