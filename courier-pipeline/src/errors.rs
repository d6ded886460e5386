//! Error types for courier-pipeline.
//!
//! Recoverable failures are absorbed at entry/peer granularity and surfaced
//! as display content or host system messages; nothing in this crate signals
//! errors by panicking. Completion callbacks always carry an explicit
//! success flag in the form of a `Result`.

use std::{fmt, io};

// ─── NetworkError ─────────────────────────────────────────────────────────────

/// A failure reported by the network-client collaborator.
#[derive(Debug)]
pub enum NetworkError {
    /// The server rejected the request.
    Rpc {
        /// HTTP-like status code.
        code: i32,
        /// Error name in SCREAMING_SNAKE_CASE.
        name: String,
    },
    /// Network / I/O failure.
    Io(io::Error),
    /// The request never completed (e.g. the client shut down mid-flight).
    Dropped,
    /// Anything else the client wants to surface verbatim.
    Other(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc { code, name } => write!(f, "RPC {code}: {name}"),
            Self::Io(e)              => write!(f, "I/O error: {e}"),
            Self::Dropped            => write!(f, "request dropped"),
            Self::Other(s)           => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<io::Error> for NetworkError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl NetworkError {
    /// `true` if this is the named RPC error.
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc { name, .. } => name == pattern,
            _                      => false,
        }
    }
}

// ─── SubmitError ──────────────────────────────────────────────────────────────

/// Synchronous rejection from [`crate::Pipeline::submit`].
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The composed text exceeds `max_chunk_size × max_chunk_count` code
    /// points. No partial chunks were queued.
    Oversized {
        /// Length of the converted text, in Unicode code points.
        length: usize,
        /// The configured hard limit.
        limit:  usize,
    },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized { length, limit } =>
                write!(f, "message too long: {length} code points (limit {limit})"),
        }
    }
}

impl std::error::Error for SubmitError {}
