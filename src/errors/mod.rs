//! Centralized error handling module
//!
//! The delivery pipeline reports every failure as a typed [`ApnsError`] rather
//! than an opaque error, so callers can tell a dead device token from an
//! exhausted retry budget.

pub mod types;

pub use types::{token_prefix, ApnsError, ApnsResult, FailureKind, TimeoutPhase};
