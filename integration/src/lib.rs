//! Integration tests for hindsight.
//!
//! This crate doesn't contain any actual functionality.
//! It's just a container for integration tests that run the `hindsight` binary
//! against a real Docker daemon.

// This function only exists to satisfy the compiler, as this crate doesn't have any real functionality
#[doc(hidden)]
pub fn _dummy() {}
