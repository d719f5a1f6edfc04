//! Structured logging with deal and pass context.
//!
//! Provides logging macros and utilities that include the bound deal and the
//! resolution pass id in every log message for easy correlation.

pub mod structured;

pub use structured::*;
