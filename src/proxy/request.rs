//! Request line reading and classification.
//!
//! # Responsibilities
//! - Read exactly one `\n`-terminated line from the client
//! - Split it into method and target
//! - Decide whether the request is local, a plain HTTP proxy request, or a tunnel
//!
//! # Design Decisions
//! - Only the request line is parsed; headers stay opaque bytes
//! - The raw line is kept so it can be forwarded upstream unmodified
//! - Classification is a pure function of `(method, target)`

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{ProxyError, Result};

/// Method token that opens a tunnel.
pub const CONNECT_METHOD: &str = "CONNECT";

/// How a request is routed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Addressed to the proxy itself (origin-form target).
    Local,
    /// Plain HTTP forwarding.
    Http,
    /// CONNECT tunnel.
    Tunnel,
}

impl RequestKind {
    /// Classify a request by method and target.
    pub fn classify(method: &str, target: &str) -> Self {
        if target.starts_with('/') {
            RequestKind::Local
        } else if method == CONNECT_METHOD {
            RequestKind::Tunnel
        } else {
            RequestKind::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Local => "local",
            RequestKind::Http => "http",
            RequestKind::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First line of a client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequestLine {
    pub method: String,
    pub target: String,
    /// The line exactly as received, terminator included.
    raw: Vec<u8>,
}

impl ParsedRequestLine {
    /// Parse a line that was read off the wire.
    ///
    /// The trailing `\n` and an optional `\r` before it are ignored for tokenizing
    /// but kept in [`ParsedRequestLine::raw`].
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8_lossy(&raw);
        let line = text.strip_suffix('\n').unwrap_or(&text);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let mut tokens = line.split_whitespace();
        let (method, target) = match (tokens.next(), tokens.next()) {
            (Some(method), Some(target)) => (method.to_string(), target.to_string()),
            _ => {
                return Err(ProxyError::MalformedRequestLine {
                    line: line.to_string(),
                })
            }
        };

        Ok(Self { method, target, raw })
    }

    pub fn kind(&self) -> RequestKind {
        RequestKind::classify(&self.method, &self.target)
    }

    /// The unmodified request line bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Read and parse the request line from a buffered client stream.
///
/// Reads at most `max_len` bytes. Whatever the reader buffered beyond the line
/// stays in `reader` for the relay to forward.
pub async fn read_request_line<R>(reader: &mut R, max_len: usize) -> Result<ParsedRequestLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(256);
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX);
    let n = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut raw)
        .await
        .map_err(ProxyError::ReadFailure)?;

    if raw.last() != Some(&b'\n') {
        if n >= max_len {
            return Err(ProxyError::RequestLineTooLong { limit: max_len });
        }
        return Err(ProxyError::ConnectionClosedEarly { bytes_read: n });
    }

    ParsedRequestLine::parse(raw)
}
