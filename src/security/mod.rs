//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Classified request:
//!     → access.rs (role check, then network check)
//!     → rate_limit.rs (resolve ceiling, consume from origin+category counter)
//!     → Allowed / Denied / Limited
//! ```
//!
//! # Design Decisions
//! - Role failures are reported before network failures
//! - Counters are process memory only; a restart clears them
//! - Contention is confined to one counter shard, never a global lock

pub mod access;
pub mod clock;
pub mod rate_limit;

pub use access::{decide, Decision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{resolve_ceiling, Ceiling, CeilingSource, RateDecision, RateLimiter};
