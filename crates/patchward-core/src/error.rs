//! Engine error types.
//!
//! Only two families of failure abort a decision call: admission errors
//! (rate limiting) and contract errors (schema validation or an unreadable
//! schema file). Gating outcomes such as `Stop` or `HumanReview` are
//! first-class decision results, and sandbox failures are recorded as data,
//! so neither appears here.

use thiserror::Error;

/// Errors that can abort a decision call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The per-window request limit was reached before any state was touched.
    ///
    /// Callers must back off and retry later; no budget, cascade, or memory
    /// state was mutated.
    #[error("rate limit exceeded: {limit} requests per {window_secs}s window")]
    RateLimitExceeded {
        /// Maximum requests admitted per window.
        limit: u32,
        /// Window length in seconds.
        window_secs: u64,
    },

    /// The envelope schema contract file could not be read.
    #[error("schema contract unavailable at {path}: {source}")]
    SchemaUnavailable {
        /// Path to the schema file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The schema contract file is not a valid JSON Schema.
    #[error("schema contract failed to compile: {message}")]
    SchemaCompile {
        /// Compiler diagnostic from the schema library.
        message: String,
    },

    /// An envelope snapshot violated the schema contract.
    ///
    /// This indicates a bug in envelope construction, not a transient
    /// condition; the engine never returns data it cannot certify.
    #[error("envelope violates schema contract at '{path}': {message}")]
    SchemaValidation {
        /// JSON path to the violating value.
        path: String,
        /// Validator diagnostic.
        message: String,
    },

    /// Outcome-memory persistence failed.
    #[error("outcome persistence failed for {path}: {source}")]
    Persistence {
        /// Path of the history file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
