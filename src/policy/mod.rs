//! Policy subsystem.
//!
//! # Data Flow
//! ```text
//! PolicySource (file, memory, external store)
//!     → types.rs (raw records: ranges, rules, rate limits, overrides)
//!     → snapshot.rs (validate + compile into an immutable PolicySnapshot)
//!     → store.rs (atomic swap; readers get Arc<PolicySnapshot>)
//!     → gate reads one snapshot per request
//! ```
//!
//! # Design Decisions
//! - Snapshots are never mutated; a change means a new snapshot
//! - No endpoint-specific logic lives in code, only the (path, method) table
//! - Missing rule resolves to internal-only access

pub mod snapshot;
pub mod source;
pub mod store;
pub mod types;

pub use snapshot::{normalize_path, PolicyError, PolicySnapshot, RuleMatch};
pub use source::{follow_changes, FileSource, MemorySource, PolicySource, SourceError};
pub use store::{PolicyStore, ReloadError};
pub use types::{AccessRule, AddressRange, OriginOverride, PolicyConfig, RateLimitPolicy, DEFAULT_CATEGORY};
