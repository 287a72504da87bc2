//! Forward proxy protocol handling.
//!
//! # Data Flow
//! ```text
//! accepted TCP connection
//!     → dispatcher.rs (per-connection lifecycle)
//!     → request.rs (read + classify the request line)
//!     → response.rs             (local: 404, malformed: 400)
//!     → authority.rs + upstream.rs (http / tunnel: derive host:port, dial)
//!     → relay.rs (request line + residual bytes, then bidirectional copy)
//!     → teardown (both sockets closed)
//! ```
//!
//! # Design Decisions
//! - Only the request line is interpreted; everything after it is opaque
//! - One upstream connection per client connection, never reused
//! - CONNECT upstream failures close the client without a response

pub mod authority;
pub mod dispatcher;
pub mod relay;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use authority::{TargetAuthority, TargetMode};
pub use dispatcher::Dispatcher;
pub use relay::RelayStats;
pub use request::{ParsedRequestLine, RequestKind};
pub use server::ProxyServer;
pub use upstream::UpstreamConnector;
