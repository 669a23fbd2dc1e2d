//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, policy compilation)
//!     → GateConfig (validated, immutable)
//!
//! On change (file watcher, SIGHUP, admin reload):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → PolicyStore swaps in a new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener and observability settings are read at startup only; only the
//!   `[policy]` tables are hot-reloaded

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_settings, parse_config, parse_settings, ConfigError};
pub use schema::{AdminConfig, GateConfig, GateSettings, ListenerConfig, LogFormat, ObservabilityConfig};
