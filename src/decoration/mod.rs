//! Visibility decoration.
//!
//! Hides calls that belong to another deal behind a placeholder and restores
//! them on demand. The host page is left pristine after `show_all`.

pub mod decorator;

pub use decorator::*;
