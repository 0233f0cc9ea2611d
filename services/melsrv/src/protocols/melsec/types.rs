//! MELSEC block and field definitions plus decoded values

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{lookup_device, DeviceCode};
use crate::error::{MelsrvError, Result};

/// Wire encoding negotiated with the Ethernet module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCode {
    Ascii,
    #[default]
    Binary,
}

impl fmt::Display for DataCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataCode::Ascii => write!(f, "ascii"),
            DataCode::Binary => write!(f, "binary"),
        }
    }
}

/// Field datatype
///
/// Unrecognized names are kept so that the validator can report them by name
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Datatype {
    Bit,
    Word,
    Dword,
    Char,
    Text,
    Other(String),
}

impl From<String> for Datatype {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "bit" => Datatype::Bit,
            "word" => Datatype::Word,
            "dword" => Datatype::Dword,
            "char" => Datatype::Char,
            "text" => Datatype::Text,
            _ => Datatype::Other(s),
        }
    }
}

impl From<Datatype> for String {
    fn from(d: Datatype) -> Self {
        d.to_string()
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Bit => write!(f, "bit"),
            Datatype::Word => write!(f, "word"),
            Datatype::Dword => write!(f, "dword"),
            Datatype::Char => write!(f, "char"),
            Datatype::Text => write!(f, "text"),
            Datatype::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Value interpretation of a field's bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Units {
    Binary,
    Bcd,
    Ascii,
    /// Engineering unit label (e.g. "mm"); decoded as a plain integer
    Other(String),
}

impl From<String> for Units {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BINARY" => Units::Binary,
            "BCD" => Units::Bcd,
            "ASCII" => Units::Ascii,
            _ => Units::Other(s),
        }
    }
}

impl From<Units> for String {
    fn from(u: Units) -> Self {
        u.to_string()
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Binary => write!(f, "BINARY"),
            Units::Bcd => write!(f, "BCD"),
            Units::Ascii => write!(f, "ASCII"),
            Units::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Byte of a word a `char` field lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharPos {
    High,
    Low,
}

/// One named value inside a data block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub name: String,
    /// Word address, hex
    pub address: String,
    pub datatype: Datatype,
    #[serde(default)]
    pub units: Option<Units>,
    /// Bit index for `bit` fields (0..=15)
    #[serde(default)]
    pub bit: Option<u8>,
    #[serde(default)]
    pub charpos: Option<CharPos>,
    /// Byte length for `text` fields
    #[serde(default)]
    pub charlength: Option<usize>,
}

impl DataField {
    pub fn word_address(&self) -> Result<u32> {
        parse_address(&self.address)
            .map_err(|e| MelsrvError::config(format!("Field '{}': {}", self.name, e)))
    }
}

/// One contiguous region read with a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    /// First word address, hex
    pub baseaddress: String,
    /// Device key, e.g. `D*`
    pub register: String,
    pub wordlength: u16,
    #[serde(default)]
    pub datafields: Vec<DataField>,
}

impl DataBlock {
    pub fn base_word_address(&self) -> Result<u32> {
        parse_address(&self.baseaddress).map_err(|e| {
            MelsrvError::config(format!("Block {}{}: {}", self.register, self.baseaddress, e))
        })
    }

    pub fn device(&self) -> Result<&'static DeviceCode> {
        lookup_device(&self.register)
            .ok_or_else(|| MelsrvError::config(format!("Unknown device code '{}'", self.register)))
    }

    /// Block size in bytes
    pub fn byte_length(&self) -> usize {
        usize::from(self.wordlength) * 2
    }
}

/// Parse a hex address with an optional `0x` prefix
pub fn parse_address(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16)
        .map_err(|_| MelsrvError::config(format!("Invalid hex address '{}'", text)))
}

/// Decoded field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view; integer text and float text parse
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Truthiness used for the `running` indicator
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => {
                let s = s.trim();
                s == "1" || s.eq_ignore_ascii_case("true")
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Value with its configured units label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Value,
    pub units: Option<String>,
}

impl FieldValue {
    pub fn new(value: impl Into<Value>, units: Option<String>) -> Self {
        Self {
            value: value.into(),
            units,
        }
    }
}

/// Field values keyed by field name
pub type FieldMap = BTreeMap<String, FieldValue>;
