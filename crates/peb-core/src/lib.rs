//! Core domain + application logic for the premium-emoji channel bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and SQLite live
//! behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod forward;
pub mod logging;
pub mod messaging;
pub mod queue;
pub mod rewrite;
pub mod rules;
pub mod spans;
pub mod storage;
pub mod symbols;

pub use errors::{Error, Result};
