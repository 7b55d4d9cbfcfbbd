//! Error types for the ambient configuration boundary.
//!
//! The engine's hot path (`allocate`/`deallocate`) never returns a typed
//! error — exhaustion is `None`, contract violations panic (see the
//! `engine` module docs). The one place a recoverable `Result` makes
//! sense is parsing a policy name supplied by a caller (a config file, a
//! CLI flag, …) before any `Engine` exists.

use thiserror::Error;

/// Returned when a policy token does not match one of the closed set of
/// recognised names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown allocator policy {token:?}; expected one of FirstFit, NextFit, BestFit, WorstFit")]
pub struct PolicyParseError {
    pub token: String,
}
