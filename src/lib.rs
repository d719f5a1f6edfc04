//! amocalls core - call-visibility correlation engine
//!
//! Hides calls in a CRM deal's activity feed that belong to another deal and
//! keeps doing so while the host page re-renders. The implementation
//! prioritizes:
//!
//! 1. **Fail-static** - an oracle failure never hides anything
//! 2. **Logging** - every decision point logged with deal and pass context
//! 3. **Few round trips** - one batched, cached, deduplicated lookup per pass
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `dom` - host document contract and an in-memory document
//! - `extraction` - call records scraped from the activity feed
//! - `fingerprint` - SHA-256 fingerprints of permanent links
//! - `oracle` - remote assignment store client
//! - `resolution` - assignment cache and ownership resolution
//! - `decoration` - non-destructive hide/show of call entries
//! - `store` - shared filter state
//! - `orchestration` - deal lifecycle, mutation debounce, context polling
//! - `config` - filter configuration
//! - `error` - error taxonomy
//! - `logging` - structured logging with deal and pass context

pub mod config;
pub mod decoration;
pub mod dom;
pub mod error;
pub mod extraction;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod orchestration;
pub mod resolution;
pub mod store;

pub use config::FilterConfig;
pub use dom::{HostDocument, MemoryDocument, MutationRecord, NodeId};
pub use error::{FilterError, OracleError};
pub use fingerprint::{Fingerprint, Fingerprinter, Sha256Fingerprinter};
pub use models::{Assignment, CallDirection, CallRecord};
pub use oracle::{AssignmentOracle, HttpAssignmentOracle};
pub use orchestration::{
    CallVisibilityFilter, ContextPoller, HostContext, HostContextSource, PassOutcome, PassReport,
    SkipReason,
};
pub use resolution::UnassignedCall;

/// Initialize the process-wide logger. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
