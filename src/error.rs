//! Error types for FTL stream operations
//!
//! Every fallible operation in this crate returns [`Result`]. The variants of
//! [`FtlError`] form the library's status taxonomy: caller-misuse errors
//! (`NonZeroPointer`, `ConfigError`, `NotActiveStream`) are detected
//! synchronously and have no side effects; network and protocol errors
//! (`DnsFailure`, `ConnectError`, `StreamRejected`, `InternalError`) are the
//! terminal result of an activation attempt.

use std::fmt;
use std::io;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, FtlError>;

/// Error type for FTL stream operations
#[derive(Debug)]
pub enum FtlError {
    /// A handle slot that must be zeroed (`None`) held a live value
    NonZeroPointer,

    /// Memory allocation failed
    ///
    /// Part of the public status taxonomy; Rust aborts on allocation
    /// failure, so no code path in this crate produces it.
    MallocFailure,

    /// The ingest location could not be resolved to any endpoint
    DnsFailure {
        /// Hostname or address that failed to resolve
        host: String,
    },

    /// Every resolved endpoint refused or timed out the connection
    ConnectError {
        /// Hostname or address the candidates were resolved from
        host: String,
        /// Number of endpoints attempted
        attempts: usize,
    },

    /// Inputs were valid but an internal I/O or protocol fault occurred
    InternalError(String),

    /// The configuration is invalid or incomplete for the requested operation
    ConfigError(&'static str),

    /// The ingest explicitly rejected the stream
    StreamRejected {
        /// Response code sent by the ingest
        code: u16,
    },

    /// The operation requires an active stream and the stream is not active
    NotActiveStream,
}

impl fmt::Display for FtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtlError::NonZeroPointer => {
                write!(f, "handle slot must be zeroed before use")
            }
            FtlError::MallocFailure => write!(f, "memory allocation failed"),
            FtlError::DnsFailure { host } => {
                write!(f, "failed to resolve ingest location: {}", host)
            }
            FtlError::ConnectError { host, attempts } => {
                write!(
                    f,
                    "failed to connect to ingest {} ({} endpoint{} tried)",
                    host,
                    attempts,
                    if *attempts == 1 { "" } else { "s" }
                )
            }
            FtlError::InternalError(msg) => write!(f, "internal error: {}", msg),
            FtlError::ConfigError(msg) => write!(f, "configuration error: {}", msg),
            FtlError::StreamRejected { code } => {
                write!(f, "ingest rejected the stream (code {})", code)
            }
            FtlError::NotActiveStream => write!(f, "stream is not active"),
        }
    }
}

impl std::error::Error for FtlError {}

impl From<io::Error> for FtlError {
    fn from(e: io::Error) -> Self {
        FtlError::InternalError(e.to_string())
    }
}

impl FtlError {
    /// Build an `InternalError` from any displayable fault
    pub(crate) fn internal(msg: impl fmt::Display) -> Self {
        FtlError::InternalError(msg.to_string())
    }

    /// Whether the error was detected before any network activity
    ///
    /// Caller-misuse errors never have side effects; the stream can be
    /// corrected and the operation retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            FtlError::NonZeroPointer | FtlError::ConfigError(_) | FtlError::NotActiveStream
        )
    }
}
