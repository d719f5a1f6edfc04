//! Host document access.
//!
//! The engine never touches a browser API directly. It reads and decorates
//! the host page through the `HostDocument` trait:
//! - `document` - node handles, mutation records and the trait itself
//! - `memory` - arena-backed in-memory document and a call markup builder

pub mod document;
pub mod memory;

pub use document::*;
pub use memory::*;
