//! Utility functions for display formatting.

pub mod format;

pub use format::{format_date, format_expiry, truncate_string};
