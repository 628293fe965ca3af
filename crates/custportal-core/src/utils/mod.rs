//! Utility functions for formatting output.

pub mod format;

pub use format::{format_expiry, truncate_string};
