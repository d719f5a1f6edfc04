//! Data model shared by the extraction, resolution and decoration stages.
//!
//! - `call` - call records scraped from the activity feed
//! - `assignment` - backend call-to-deal assignments

pub mod assignment;
pub mod call;

pub use assignment::*;
pub use call::*;
