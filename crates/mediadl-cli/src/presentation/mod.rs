//! Shared CLI presentation utilities.
//!
//! Format-only: no engine calls happen here.

pub mod progress;
pub mod tables;

pub use progress::RunProgress;
pub use tables::{format_bytes, format_percent, print_separator, truncate_string};
