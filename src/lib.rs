//! hotgate: a configuration-driven HTTP reverse proxy with hot-reloadable
//! routes and per-client admission control.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown, StartupError};
