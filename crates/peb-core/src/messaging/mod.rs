//! Messaging port + cross-adapter message model.

pub mod port;
pub mod types;
