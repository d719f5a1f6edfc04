//! Call fingerprints.
//!
//! A fingerprint is the SHA-256 hex digest of a call's permanent link and is
//! the only key used for caching and for the remote lookup.

pub mod digest;

pub use digest::*;
