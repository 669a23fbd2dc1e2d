//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload the policy tables from the config file
//! ```
//!
//! # Design Decisions
//! - Background tasks (sweeper, servers) all subscribe to one broadcast
//! - SIGHUP never stops the server; a bad file keeps the current policy

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, SignalEvent};
