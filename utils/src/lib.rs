//! Shared utilities for pegledger.

pub mod format;

pub use format::{format_amount, format_duration};
