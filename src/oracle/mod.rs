//! Remote assignment oracle.
//!
//! The backend is the source of truth for call-to-deal assignments:
//! - `wire` - request and response bodies
//! - `client` - the `AssignmentOracle` trait and its HTTP implementation

pub mod client;
pub mod wire;

pub use client::*;
pub use wire::*;
