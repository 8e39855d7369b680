//! Centralized error types for cuckoolyse.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the cuckoolyse library.
#[derive(Error, Debug)]
pub enum CuckooError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The input could not be parsed as an email message at all.
    #[error("Input is not a parseable email message: {0}")]
    InvalidEmail(String),

    /// The configuration file is unreadable or malformed.
    #[error("Invalid configuration '{path}': {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// A purported archive could not be unpacked.
    #[error("Unable to unpack '{filename}': {reason}")]
    Unpack { filename: String, reason: String },

    /// The sandbox could not be reached.
    #[error("Sandbox request failed: {0}")]
    Transport(String),

    /// The sandbox did not answer within the configured timeout.
    #[error("Sandbox request timed out after {0}s")]
    Timeout(u64),

    /// The sandbox answered with a body that is not the expected JSON.
    #[error("Malformed sandbox response: {0}")]
    MalformedResponse(String),

    /// The sandbox answered with a status code the protocol does not allow here.
    #[error("Unexpected sandbox response code {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The submission was accepted but no task was scheduled.
    #[error("No task ID from sandbox, assuming submission failure")]
    MissingTaskId,
}

/// Coarse classification of a per-attachment failure, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed input structure.
    Parse,
    /// Archive expansion failed.
    Unpack,
    /// Network, timeout or undecodable response body.
    Transport,
    /// The sandbox answered, but not in a way the protocol allows.
    Protocol,
    /// Local I/O or configuration.
    Local,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Unpack => "unpack",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience alias for `Result<T, CuckooError>`.
pub type Result<T> = std::result::Result<T, CuckooError>;

impl CuckooError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `Unpack` variant for the named archive.
    pub fn unpack(filename: &str, reason: impl std::fmt::Display) -> Self {
        Self::Unpack {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Which part of the failure taxonomy this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidEmail(_) => FailureKind::Parse,
            Self::Unpack { .. } => FailureKind::Unpack,
            Self::Transport(_) | Self::Timeout(_) | Self::MalformedResponse(_) => {
                FailureKind::Transport
            }
            Self::UnexpectedStatus { .. } | Self::MissingTaskId => FailureKind::Protocol,
            Self::Io { .. } | Self::InvalidConfig { .. } => FailureKind::Local,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `CuckooError`
/// when no path context is available (stdin, in-memory archives).
impl From<std::io::Error> for CuckooError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stdin>"),
            source,
        }
    }
}
