//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, metrics)
//!     → RouterManager → RouteTable → admission
//!     → forward.rs (upstream round-trip, hop-by-hop header handling)
//!     → Send to client
//! ```

pub mod forward;
pub mod server;

pub use forward::{Forward, ForwardError, HttpForwarder};
pub use server::HttpServer;
