// Copyright 2021 Joyent, Inc.

//! Error types shared by every component of the crate.
//!
//! Failures are distinguished by kind, not by message text:
//!
//! * `Infrastructure`: any coordinator or storage-node reachability,
//!   framing, or protocol-status failure. Callers may retry these across
//!   replicas or endpoints.
//! * `NotFound`: the target path does not exist.
//! * `CallerStream`: an error raised by a caller-supplied source or sink,
//!   not by the file system. Tagged at the point the I/O happens and never
//!   reclassified as an infrastructure failure (or vice versa).
//! * `InvalidArgument`: malformed path, empty required input, bad endpoint.
//!   Raised synchronously before any network work.

use std::error::Error;
use std::fmt;
use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DfsError>;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum DfsError {
    /// A coordinator or storage-node failure: unreachable endpoint, framing
    /// error, or a non-success protocol status. The message carries the
    /// remote exception class and text when the server reported one.
    Infrastructure {
        message: String,
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// The target path does not exist.
    NotFound(String),
    /// An error from a caller-supplied byte source or sink, propagated
    /// verbatim.
    CallerStream(io::Error),
    /// A malformed argument, rejected at the API boundary.
    InvalidArgument(String),
}

impl DfsError {
    /// Creates an infrastructure error with no underlying cause.
    pub fn infrastructure<S: Into<String>>(message: S) -> DfsError {
        DfsError::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an infrastructure error wrapping an underlying cause.
    pub fn infrastructure_with<S, E>(message: S, cause: E) -> DfsError
    where
        S: Into<String>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        DfsError::Infrastructure {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    /// True if this error means the target path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DfsError::NotFound(_))
    }

    /// True if this error originated in a caller-supplied stream.
    pub fn is_caller_stream(&self) -> bool {
        matches!(self, DfsError::CallerStream(_))
    }

    /// True if this error is an infrastructure failure.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, DfsError::Infrastructure { .. })
    }

    /// True if this error is an invalid-argument rejection.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DfsError::InvalidArgument(_))
    }
}

impl fmt::Display for DfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfsError::Infrastructure { message, source } => match source {
                Some(cause) => write!(f, "{}: {}", message, cause),
                None => write!(f, "{}", message),
            },
            DfsError::NotFound(path) => write!(f, "path not found: {}", path),
            DfsError::CallerStream(e) => write!(f, "caller stream error: {}", e),
            DfsError::InvalidArgument(message) => {
                write!(f, "invalid argument: {}", message)
            }
        }
    }
}

impl Error for DfsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DfsError::Infrastructure { source, .. } => {
                source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
            }
            DfsError::CallerStream(e) => Some(e),
            _ => None,
        }
    }
}
