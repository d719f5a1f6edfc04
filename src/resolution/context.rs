//! Resolution pass context.
//!
//! Provides the pass identity used for logging and for detecting passes that
//! outlived their deal context.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Identity of one extract -> fingerprint -> resolve -> decorate cycle.
#[derive(Debug, Clone)]
pub struct PassContext {
    pub pass_id: String,
    pub deal_id: String,
    /// Store epoch captured when the pass started.
    pub epoch: u64,
    pub started_at: DateTime<Utc>,
}

impl PassContext {
    pub fn new(deal_id: &str, epoch: u64) -> Self {
        let pass_id = format!("pass-{}", &Uuid::new_v4().simple().to_string()[..8]);

        Self {
            pass_id,
            deal_id: deal_id.to_string(),
            epoch,
            started_at: Utc::now(),
        }
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.deal_id).with_pass(&self.pass_id)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
