//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig
//!
//! On change:
//!     watcher.rs (debounced notify events) / SIGHUP / admin API
//!     → reload.rs (load → compile → swap)
//!     → RouterManager publishes the new RouteTable
//! ```
//!
//! # Design Decisions
//! - Only `[[routes]]` hot-reload; other sections are read once at startup
//! - All fields have defaults to allow minimal configs
//! - A config that fails to load never replaces the live route table

pub mod loader;
pub mod reload;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, save_config, ConfigError};
pub use reload::{ReloadSummary, Reloader};
pub use schema::{GatewayConfig, Route};
pub use watcher::{ConfigWatcher, Debouncer};
