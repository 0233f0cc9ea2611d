//! MELSEC-Q/L polling service
//!
//! Polls Mitsubishi MELSEC-Q/L PLCs over the MC protocol (3E frame, batch
//! read in word units) and writes the results as sslog batch files.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  MelsecClient │──►│ RecordBuilder │──►│ BatchAccum.   │──►│ BatchWriter  │
//! │ (3E requests) │   │ compute/split │   │ (time window) │   │ (.sm.json)   │
//! └───────────────┘   └───────────────┘   └───────────────┘   └──────────────┘
//!         ▲
//!         │ one task per connection
//! ┌───────────────┐
//! │    Poller     │ state machine + reconnect policy
//! └───────────────┘
//! ```
//!
//! - **`protocols::melsec`**: device tables, value codec, frames, validator, client
//! - **`records`**: sslog records, computed fields, prefix splitting
//! - **`runtime`**: connector seam, reconnect helper, batching, poller
//! - **`storage`**: atomic batch file output
//! - **`config`**: YAML + environment configuration

pub mod config;
pub mod error;
pub mod protocols;
pub mod records;
pub mod runtime;
pub mod storage;

pub use error::{MelsrvError, Result};

pub const SERVICE_NAME: &str = "melsrv";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
