//! Protocol implementations

pub mod melsec;
