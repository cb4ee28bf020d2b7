//! Common test utilities
//!
//! Handler fixtures wired to deterministic ports from the `mock` module.

#![allow(dead_code)]

pub mod test_fixtures;

pub use test_fixtures::*;
