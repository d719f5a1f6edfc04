//! Call extraction module.
//!
//! Scrapes call records out of the host activity feed. Extraction is
//! best-effort per entry: missing markup degrades to defaults and never
//! aborts the scan.

pub mod call_parser;

pub use call_parser::*;
