//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / relay / listener produce:
//!     → logging.rs (structured log events, per-connection fields)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Verbosity is read from config once, when the subscriber is built
//! - Metric updates are no-ops until an exporter is installed
//! - Tunnelled payloads are never logged, only byte counts

pub mod logging;
pub mod metrics;
