//! Per-connection error taxonomy.
//!
//! Every failure here is scoped to a single client connection. None of them
//! stop the accept loop.

use std::io;

use thiserror::Error;
use tracing::Level;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Body sent with the 400 response when the request line cannot be read.
pub const READ_FAILURE_MESSAGE: &str = "Failed to read request line";

/// Body sent with the 400 response when the request line has too few tokens.
pub const INVALID_LINE_MESSAGE: &str = "Invalid request line";

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The client went away before a full request line arrived.
    #[error("connection closed by client before request line was read ({bytes_read} bytes buffered)")]
    ConnectionClosedEarly { bytes_read: usize },

    #[error("failed to read request line: {0}")]
    ReadFailure(#[source] io::Error),

    #[error("request line exceeds {limit} bytes")]
    RequestLineTooLong { limit: usize },

    #[error("invalid request line {line:?}: expected at least method and target")]
    MalformedRequestLine { line: String },

    #[error("unable to connect to upstream {authority}: {source}")]
    UpstreamUnreachable {
        authority: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// Body of the 400 response owed to the client, if any.
    ///
    /// Early closes and upstream failures get no response at all.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            ProxyError::ReadFailure(_) | ProxyError::RequestLineTooLong { .. } => {
                Some(READ_FAILURE_MESSAGE)
            }
            ProxyError::MalformedRequestLine { .. } => Some(INVALID_LINE_MESSAGE),
            ProxyError::ConnectionClosedEarly { .. }
            | ProxyError::UpstreamUnreachable { .. }
            | ProxyError::Io(_) => None,
        }
    }

    /// Severity this error is logged at. Purely informational.
    pub fn severity(&self) -> Level {
        match self {
            ProxyError::ConnectionClosedEarly { .. } => Level::DEBUG,
            ProxyError::MalformedRequestLine { .. } | ProxyError::RequestLineTooLong { .. } => {
                Level::WARN
            }
            ProxyError::ReadFailure(_) | ProxyError::UpstreamUnreachable { .. } => Level::ERROR,
            ProxyError::Io(_) => Level::DEBUG,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::ConnectionClosedEarly { .. } => "closed_early",
            ProxyError::ReadFailure(_) => "read_failure",
            ProxyError::RequestLineTooLong { .. } => "line_too_long",
            ProxyError::MalformedRequestLine { .. } => "malformed",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::Io(_) => "io",
        }
    }
}
