//! Call records extracted from the host activity feed.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `HH:MM:SS` or `MM:SS`
    static ref DURATION_PATTERN: Regex = Regex::new(
        r"^\s*(\d+):(\d{1,2})(?::(\d{1,2}))?\s*$"
    ).unwrap();
}

/// Direction of a call relative to the CRM account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }

    /// Note type understood by the assignment backend.
    pub fn note_type(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "call_in",
            CallDirection::Outbound => "call_out",
        }
    }
}

/// A call as rendered in the activity feed.
///
/// `id` is assigned by the host and only identifies the DOM entry within the
/// current page. Correlation with the backend always goes through the
/// fingerprint of `permanent_link`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub permanent_link: Option<String>,
    pub direction: CallDirection,
    pub date_text: String,
    pub duration_text: String,
    pub phone: Option<String>,
    pub operator_id: String,
    pub operator_name: String,
    pub status_text: String,
    pub provider_tag: Option<String>,
}

impl CallRecord {
    /// A record with only an id; every other field at its extraction default.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            permanent_link: None,
            direction: CallDirection::Inbound,
            date_text: String::new(),
            duration_text: "00:00:00".to_string(),
            phone: None,
            operator_id: String::new(),
            operator_name: String::new(),
            status_text: String::new(),
            provider_tag: None,
        }
    }

    pub fn with_link(mut self, link: &str) -> Self {
        self.permanent_link = Some(link.to_string());
        self
    }

    pub fn has_link(&self) -> bool {
        self.permanent_link.is_some()
    }

    /// Parse `duration_text` into seconds.
    pub fn duration_seconds(&self) -> Option<u64> {
        parse_duration_secs(&self.duration_text)
    }
}

/// Parse `HH:MM:SS` or `MM:SS` into seconds.
pub fn parse_duration_secs(text: &str) -> Option<u64> {
    let caps = DURATION_PATTERN.captures(text)?;
    let first: u64 = caps.get(1)?.as_str().parse().ok()?;
    let second: u64 = caps.get(2)?.as_str().parse().ok()?;

    // Host text is untrusted; an absurd hour field yields `None`.
    match caps.get(3) {
        Some(third) => {
            let seconds: u64 = third.as_str().parse().ok()?;
            first
                .checked_mul(3600)?
                .checked_add(second.checked_mul(60)?)?
                .checked_add(seconds)
        }
        None => first.checked_mul(60)?.checked_add(second),
    }
}
