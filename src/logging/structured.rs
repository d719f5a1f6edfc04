//! Structured logging utilities.
//!
//! Provides context-aware logging with deal_id, pass_id and call_id included
//! in every log message.

use std::fmt;

/// Logging context for one resolution pass (or one decorated call).
#[derive(Debug, Clone)]
pub struct LogContext {
    pub deal_id: Option<String>,
    pub pass_id: Option<String>,
    pub call_id: Option<String>,
}

impl LogContext {
    pub fn new(deal_id: &str) -> Self {
        Self {
            deal_id: Some(deal_id.to_string()),
            pass_id: None,
            call_id: None,
        }
    }

    /// Context for work that is not tied to a bound deal.
    pub fn unbound() -> Self {
        Self {
            deal_id: None,
            pass_id: None,
            call_id: None,
        }
    }

    pub fn with_pass(&self, pass_id: &str) -> Self {
        Self {
            pass_id: Some(pass_id.to_string()),
            ..self.clone()
        }
    }

    pub fn with_call(&self, call_id: &str) -> Self {
        Self {
            call_id: Some(call_id.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[deal={}]", self.deal_id.as_deref().unwrap_or("none"))?;
        if let Some(pid) = &self.pass_id {
            write!(f, " [pass={}]", pid)?;
        }
        if let Some(cid) = &self.call_id {
            write!(f, " [call={}]", cid)?;
        }
        Ok(())
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            concat!("{} {}" $(, " ", stringify!($key), "={:?}")*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            concat!("{} {}" $(, " ", stringify!($key), "={:?}")*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            concat!("{} {}" $(, " ", stringify!($key), "={:?}")*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            concat!("{} {}" $(, " ", stringify!($key), "={:?}")*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}
