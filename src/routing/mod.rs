//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (startup and every reload):
//!     Route[]
//!     → upstream.rs (validate base URLs)
//!     → matcher.rs (parse exact / subtree patterns)
//!     → table.rs (wrap in admission, sort by specificity)
//!     → manager.rs (atomic publish)
//!
//! Incoming Request:
//!     → manager.rs (load current table)
//!     → table.rs (longest matching pattern)
//!     → handler.rs chain: Admitted → ProxyTo → Forward
//! ```
//!
//! # Design Decisions
//! - Tables are immutable once compiled; reload builds a new one
//! - No regex in hot path (exact or prefix comparison only)
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod manager;
pub mod matcher;
pub mod table;
pub mod upstream;

pub use handler::{BoxHandler, Handler};
pub use manager::RouterManager;
pub use matcher::PathPattern;
pub use table::{RouteCompiler, RouteTable};
pub use upstream::Upstream;
