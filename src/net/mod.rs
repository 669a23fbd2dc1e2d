//! Network origin subsystem.
//!
//! # Data Flow
//! ```text
//! Transport peer address + forwarded header chain
//!     → classifier.rs (pick claimed address, parse, normalize)
//!     → membership test against snapshot ranges
//!     → Classification { origin, is_internal }
//! ```
//!
//! # Design Decisions
//! - Fail secure: unparseable origins are external
//! - IPv4-mapped IPv6 is folded to IPv4 before any matching

pub mod classifier;

pub use classifier::{AddressClassifier, AddressSource, Classification, OriginKey};
