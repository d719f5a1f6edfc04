//! Error taxonomy.
//!
//! Extraction never fails (malformed nodes degrade to defaults), so there is
//! no extraction error type. Everything else is one of:
//! - `DomError` - a decoration target vanished or the tree changed under us
//! - `FingerprintError` - a single link could not be digested
//! - `OracleError` - the remote assignment store failed
//! - `FilterError` - what a public entry point reports to its caller

use thiserror::Error;

use crate::dom::NodeId;

/// Errors raised by host document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("node {0} does not exist")]
    NodeMissing(NodeId),

    #[error("node {0} is not attached to the document")]
    Detached(NodeId),

    #[error("node {0} has no parent")]
    NoParent(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

/// Errors raised while fingerprinting a permanent link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("permanent link is empty")]
    EmptyLink,

    #[error("digest failed: {0}")]
    Digest(String),
}

/// Errors raised by the remote assignment oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("oracle returned HTTP {0}")]
    Status(u16),

    #[error("failed to decode oracle response: {0}")]
    Decode(String),

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error("operation not supported by this oracle: {0}")]
    Unsupported(&'static str),
}

/// Errors reported by the visibility filter's entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("assignment oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("no deal is bound")]
    NoDeal,

    #[error("call {0} is not present in the document")]
    CallNotFound(String),

    #[error("call {0} has no permanent link")]
    MissingLink(String),

    #[error("invalid numeric id: {0}")]
    InvalidId(String),

    /// The bound deal changed while the pass was suspended.
    #[error("deal context changed while the pass was in flight")]
    StalePass,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_error_converts_into_filter_error() {
        let err: FilterError = OracleError::Status(502).into();
        assert_eq!(err, FilterError::Oracle(OracleError::Status(502)));
        assert_eq!(
            err.to_string(),
            "assignment oracle failed: oracle returned HTTP 502"
        );
    }

    #[test]
    fn test_dom_error_display() {
        let err = DomError::NotAChild {
            parent: NodeId(1),
            child: NodeId(7),
        };
        assert_eq!(err.to_string(), "node #7 is not a child of #1");
    }
}
