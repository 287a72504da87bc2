//! Outbound TCP connections to upstream targets.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use crate::proxy::authority::TargetAuthority;

/// Opens one TCP connection per proxied request. No pooling, no retries.
#[derive(Debug, Clone, Default)]
pub struct UpstreamConnector {
    connect_timeout: Option<Duration>,
}

impl UpstreamConnector {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Resolve and connect to `authority`.
    ///
    /// Without a configured timeout this waits as long as the OS does.
    pub async fn connect(&self, authority: &TargetAuthority) -> Result<TcpStream> {
        let addr = authority.to_string();
        let connecting = TcpStream::connect(addr.as_str());

        let result = match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connecting).await {
                Ok(result) => result,
                Err(elapsed) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, elapsed)),
            },
            None => connecting.await,
        };

        let stream = result.map_err(|source| ProxyError::UpstreamUnreachable {
            authority: addr.clone(),
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(authority = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(authority = %addr, "Upstream connected");
        Ok(stream)
    }
}
