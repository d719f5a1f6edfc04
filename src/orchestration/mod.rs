//! Mutation-driven orchestration.
//!
//! - `filter` - the per-deal state machine and the public entry points
//! - `debounce` - trailing-edge coalescing of mutation bursts
//! - `context_poll` - host page polling that binds and unbinds deals

pub mod context_poll;
pub mod debounce;
pub mod filter;

pub use context_poll::*;
pub use debounce::*;
pub use filter::*;
