//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (ID, state machine, drain tracking)
//!     → Hand off to the proxy dispatcher
//!
//! Connection States:
//!     Accepted → ReadingRequestLine → LocalResponse | HttpRelay | TunnelRelay | ErrorClosed → Closed
//! ```
//!
//! # Design Decisions
//! - No admission control: every accepted connection is served immediately
//! - Each connection tracked so shutdown can drain in-flight relays

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker};
pub use listener::{Listener, ListenerError};
