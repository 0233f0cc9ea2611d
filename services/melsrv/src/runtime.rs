//! Runtime orchestration layer
//!
//! Connection handling, reconnection, batching and the per-connection poller

pub mod batch;
pub mod connector;
pub mod poller;
pub mod reconnect;

// Re-export common types
pub use batch::{Batch, BatchAccumulator};
pub use connector::{Connector, TcpConnector};
pub use poller::{spawn_poller, Poller, PollerHandle, PollerSettings, PollerState, PollerStatus};
pub use reconnect::{ReconnectError, ReconnectHelper, ReconnectPolicy};
