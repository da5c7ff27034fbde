//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Matched route:
//!     → rate_limit.rs (per-client token bucket, 429 on exhaustion)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-For)
//!     → Forward upstream
//! ```
//!
//! # Design Decisions
//! - Client identity is the peer address; forwarded headers are not trusted
//! - Idle buckets are swept so the client map stays bounded

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{AdmissionController, Admitted, TokenBucket};
