//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, ambient layers, connect info)
//!     → gate middleware (classify, decide, rate limit)
//!     → protected application router
//!
//! On rejection:
//!     → response.rs (status, JSON body, rate-limit headers)
//! ```

pub mod response;
pub mod server;

pub use response::RejectionBody;
pub use server::{AppState, GateServer};
