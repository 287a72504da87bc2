//! Accept loop for the forward proxy.
//!
//! # Responsibilities
//! - Accept client connections and spawn one task per connection
//! - Keep accepting regardless of individual accept or connection failures
//! - Stop accepting on shutdown and drain in-flight connections

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::net::{ConnectionTracker, Listener};
use crate::proxy::Dispatcher;

/// Forward proxy server.
pub struct ProxyServer {
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl ProxyServer {
    /// Create a new server with the given configuration.
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(config)),
            tracker: ConnectionTracker::new(),
            drain_timeout: Duration::from_secs(config.lifecycle.drain_timeout_secs),
        }
    }

    /// Tracker counting this server's live connections.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run the accept loop until `shutdown` fires.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "TCP proxy listening"),
            Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => tracing::error!(error = %e, "Unable to accept connection"),
                },
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, timeout = ?self.drain_timeout, "Draining connections");
            if !self.tracker.wait_for_drain(self.drain_timeout).await {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Drain timeout elapsed, abandoning connections"
                );
            }
        }

        tracing::info!("Proxy server stopped");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: std::net::SocketAddr) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", connection_id = %guard.id(), peer_addr = %peer);
        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(
            async move {
                // Outcome is logged inside the dispatcher.
                let _ = dispatcher.dispatch(stream, guard).await;
            }
            .instrument(span),
        );
    }
}
