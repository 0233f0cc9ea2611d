//! Error handling for the MELSEC polling service
//!
//! Configuration errors are fatal at startup. Protocol and I/O errors are
//! per-request and drive the poller into its reconnect loop. Storage errors
//! mean a batch could not be persisted and are never masked.

use thiserror::Error;

/// MELSEC polling service error type
#[derive(Error, Debug)]
pub enum MelsrvError {
    /// Invalid or missing configuration values
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A data field uses a datatype the codec cannot size or decode
    #[error("Unknown datatype '{datatype}' for field '{field}'")]
    UnknownDatatype { field: String, datatype: String },

    /// One or more data fields lie outside their block's address range
    #[error("Data fields outside their block range: {}", .0.join(", "))]
    BlockValidation(Vec<String>),

    /// Malformed frame, length mismatch or nonzero PLC end code
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Transport-level socket errors, passed through unchanged
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch output could not be written
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Computed-field expression could not be evaluated
    #[error("Expression error: {0}")]
    ExpressionError(String),

    /// The reconnect policy gave up
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Poller task panicked or was aborted
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the MELSEC polling service
pub type Result<T> = std::result::Result<T, MelsrvError>;

impl MelsrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        MelsrvError::ConfigError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        MelsrvError::ProtocolError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        MelsrvError::StorageError(msg.into())
    }

    pub fn expression(msg: impl Into<String>) -> Self {
        MelsrvError::ExpressionError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        MelsrvError::ConnectionError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MelsrvError::InternalError(msg.into())
    }

    pub fn unknown_datatype(field: impl Into<String>, datatype: impl Into<String>) -> Self {
        MelsrvError::UnknownDatatype {
            field: field.into(),
            datatype: datatype.into(),
        }
    }

    /// Errors after which the poller should drop the socket and reconnect
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, MelsrvError::ProtocolError(_) | MelsrvError::Io(_))
    }
}

impl From<common::config_loader::ConfigLoadError> for MelsrvError {
    fn from(err: common::config_loader::ConfigLoadError) -> Self {
        MelsrvError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for MelsrvError {
    fn from(err: serde_json::Error) -> Self {
        MelsrvError::StorageError(format!("Serialization: {}", err))
    }
}
