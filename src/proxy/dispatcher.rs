//! Per-connection dispatcher.
//!
//! Reads the request line, picks a handler and drives the connection to
//! `Closed`. Every failure stays inside the connection it happened on.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::Level;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result, INVALID_LINE_MESSAGE, READ_FAILURE_MESSAGE};
use crate::net::{ConnectionGuard, ConnectionState};
use crate::observability::metrics;
use crate::proxy::authority::{TargetAuthority, TargetMode};
use crate::proxy::relay;
use crate::proxy::request::{read_request_line, RequestKind};
use crate::proxy::response;
use crate::proxy::upstream::UpstreamConnector;

/// Routes one client connection to the local responder, HTTP relay or tunnel.
///
/// Built once from config and shared by all connections; it holds no
/// per-connection state.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    connector: UpstreamConnector,
    max_request_line_bytes: usize,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            connector: UpstreamConnector::new(&config.upstream),
            max_request_line_bytes: config.limits.max_request_line_bytes,
        }
    }

    /// Serve `stream` until it is closed.
    ///
    /// Returns how the request was classified, or the error that ended it.
    /// The error has already been logged and, where owed, answered.
    pub async fn dispatch<S>(&self, stream: S, mut guard: ConnectionGuard) -> Result<RequestKind>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let result = self.serve(stream, &mut guard).await;

        if let Err(e) = &result {
            log_failure(e, guard.state());
            metrics::record_error(e.kind());
            guard.transition(ConnectionState::ErrorClosed);
        }
        guard.transition(ConnectionState::Closed);

        result
    }

    async fn serve<S>(&self, stream: S, guard: &mut ConnectionGuard) -> Result<RequestKind>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        guard.transition(ConnectionState::ReadingRequestLine);
        let mut reader = BufReader::new(stream);

        let line = match read_request_line(&mut reader, self.max_request_line_bytes).await {
            Ok(line) => line,
            Err(e) => {
                if let Some(message) = e.client_message() {
                    response::send_bad_request(reader.get_mut(), message).await;
                }
                return Err(e);
            }
        };

        let kind = line.kind();
        metrics::record_request(kind);

        match kind {
            RequestKind::Local => {
                guard.transition(ConnectionState::LocalResponse);
                response::send_not_found(reader.get_mut()).await;
                tracing::debug!(method = %line.method, request_target = %line.target, "Returned 404 for local request");
            }
            RequestKind::Http => {
                let authority = TargetAuthority::from_target(&line.target, TargetMode::Http);
                tracing::debug!(method = %line.method, request_target = %line.target, %authority, "New HTTP connection");

                let upstream = self.connect(&authority, kind).await?;
                guard.transition(ConnectionState::HttpRelay);

                let stats = relay::http_relay(reader, upstream, line.raw()).await?;
                tracing::debug!(
                    %authority,
                    bytes_up = stats.client_to_upstream,
                    bytes_down = stats.upstream_to_client,
                    "HTTP relay finished"
                );
            }
            RequestKind::Tunnel => {
                let authority = TargetAuthority::from_target(&line.target, TargetMode::Tunnel);
                tracing::debug!(request_target = %line.target, %authority, "New HTTPS connection");

                let upstream = self.connect(&authority, kind).await?;
                guard.transition(ConnectionState::TunnelRelay);

                let stats = relay::tunnel_relay(reader, upstream).await?;
                tracing::debug!(
                    %authority,
                    bytes_up = stats.client_to_upstream,
                    bytes_down = stats.upstream_to_client,
                    "Tunnel closed"
                );
            }
        }

        Ok(kind)
    }

    async fn connect(
        &self,
        authority: &TargetAuthority,
        kind: RequestKind,
    ) -> Result<tokio::net::TcpStream> {
        self.connector.connect(authority).await.inspect_err(|_| {
            metrics::record_upstream_failure(kind);
        })
    }
}

fn log_failure(e: &ProxyError, state: ConnectionState) {
    let message = match e {
        ProxyError::ConnectionClosedEarly { .. } => {
            "Connection closed by client before request line was read"
        }
        ProxyError::ReadFailure(_) | ProxyError::RequestLineTooLong { .. } => READ_FAILURE_MESSAGE,
        ProxyError::MalformedRequestLine { .. } => INVALID_LINE_MESSAGE,
        ProxyError::UpstreamUnreachable { .. } => "Unable to connect to remote server",
        ProxyError::Io(_) => "Relay ended with error",
    };

    let level = e.severity();
    if level == Level::ERROR {
        tracing::error!(error = %e, %state, "{}", message);
    } else if level == Level::WARN {
        tracing::warn!(error = %e, %state, "{}", message);
    } else {
        tracing::debug!(error = %e, %state, "{}", message);
    }
}
