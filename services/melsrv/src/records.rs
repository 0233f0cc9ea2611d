//! Record construction: sslog records, computed fields and source splitting

pub mod builder;
pub mod compute;
pub mod split;
pub mod sslog;

pub use builder::{coerce_counter, RecordBuilder, RecordSettings};
pub use compute::{compute, evaluate, ComputedField};
pub use split::{split, PrefixCache, SplitTarget};
pub use sslog::SslogRecord;
