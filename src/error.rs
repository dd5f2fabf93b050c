//! Central error type for the server core.

use std::fmt;
use std::io;

/// Per-request errors that the request task (§4.4) converts into a response
/// and/or a connection-close decision, plus the infrastructure-level errors
/// that can surface while setting a worker up.
#[derive(Debug)]
pub enum CoreError {
    /// Malformed request line, unsupported method token, empty header name,
    /// empty query parameter name, or a protocol line that isn't exactly
    /// `HTTP/1.1`. Carries the message written back to the client.
    BadRequest(&'static str),
    /// Path resolved in the router but no handler for the method, or no
    /// match at all.
    NotFound,
    /// Handler panicked/failed, or an unexpected error occurred while
    /// framing the response.
    Internal(String),
    /// The reader saw EOF before any byte of a new request. Internal
    /// sentinel only, never written to the wire.
    ClientClosed,
    /// Underlying I/O error from the OS (socket setup, submit failure).
    Io(io::Error),
    /// A slab (connection registry or reactor operation table) is full.
    SlabFull,
}

impl CoreError {
    /// Status code this error maps to when framed as a response (spec.md §7).
    /// `ClientClosed` has no status; callers must check for it first.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::BadRequest(_) => 400,
            CoreError::NotFound => 404,
            CoreError::Internal(_) => 500,
            CoreError::ClientClosed => unreachable!("ClientClosed is never framed"),
            CoreError::Io(_) | CoreError::SlabFull => 500,
        }
    }

    /// Body text written back to the client for this error.
    pub fn message(&self) -> String {
        match self {
            CoreError::BadRequest(m) => m.to_string(),
            CoreError::NotFound => "Not found".to_string(),
            CoreError::Internal(m) => m.clone(),
            CoreError::ClientClosed => unreachable!("ClientClosed is never framed"),
            CoreError::Io(e) => e.to_string(),
            CoreError::SlabFull => "Connection slab is full".to_string(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::BadRequest(m) => write!(f, "bad request: {m}"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Internal(m) => write!(f, "internal error: {m}"),
            CoreError::ClientClosed => write!(f, "client closed connection"),
            CoreError::Io(e) => write!(f, "I/O error: {e}"),
            CoreError::SlabFull => write!(f, "connection slab is full"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(e: io::Error) -> Self {
        CoreError::Io(e)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
