//! Assignment resolution.
//!
//! Turns a DOM snapshot into per-call ownership for the bound deal:
//! - `context` - per-pass identity used for logging and stale-pass checks
//! - `cache` - fingerprint-keyed TTL cache of oracle answers
//! - `resolver` - batching, deduplication, merge and ownership decisions

pub mod cache;
pub mod context;
pub mod resolver;

pub use cache::*;
pub use context::*;
pub use resolver::*;
