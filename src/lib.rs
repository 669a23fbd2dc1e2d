//! Network-based access control and adaptive rate limiting for HTTP APIs.
//!
//! Every request passes one gate: its origin is classified as internal or
//! external, the (route, method) rule decides whether that origin and the
//! caller's roles may proceed, and a per-origin counter enforces the
//! resolved ceiling.

pub mod admin;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policy;
pub mod security;

pub use config::schema::GateConfig;
pub use error::GateError;
pub use gate::{Admission, CallerIdentity, GateRequest, Rejection, RequestGate};
pub use http::GateServer;
pub use lifecycle::Shutdown;
pub use policy::{PolicySnapshot, PolicyStore};
