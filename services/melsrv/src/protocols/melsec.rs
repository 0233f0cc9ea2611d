//! MELSEC-Q/L MC protocol, 3E frame
//!
//! Supports batch reads in word units over ASCII and binary data codes

pub mod client;
pub mod codec;
pub mod constants;
pub mod frame;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types
pub use client::MelsecClient;
pub use types::*;
pub use validate::validate_blocks;
