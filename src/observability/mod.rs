//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate, policy store, rate limiter produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, text or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Only a missing policy snapshot logs at error level on the request path;
//!   denials and rate limits are routine and log at debug
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
