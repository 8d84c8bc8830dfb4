//! Common test utilities for rekey integration tests.

pub mod harness;

pub use harness::{CURRENT_PASSWORD, TestRepo};
