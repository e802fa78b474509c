//! Liveguard Core Module
//!
//! Shared error types and the daemon's numeric result codes.

pub mod error;

pub use error::{describe_code, LiveguardError, Result};
