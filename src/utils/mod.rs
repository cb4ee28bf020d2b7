//! Utility modules for common functionality

pub mod error_helpers;

// Re-export commonly used helpers
pub use error_helpers::{
    parse_url_safe, resolve_endpoint, safe_mutex_lock, safe_read_lock, safe_write_lock,
};
