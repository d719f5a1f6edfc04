//! Oracle wire format.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FilterError;
use crate::fingerprint::Fingerprint;
use crate::models::assignment::{deserialize_id, deserialize_optional_id};
use crate::models::{Assignment, CallRecord};

/// Body of `POST /api/v1/calls/batch/deal-assignment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchAssignmentRequest {
    pub amo_call_ids: Vec<String>,
}

impl BatchAssignmentRequest {
    pub fn new(fingerprints: &[Fingerprint]) -> Self {
        Self {
            amo_call_ids: fingerprints.iter().map(|f| f.as_str().to_string()).collect(),
        }
    }
}

/// Response of the batch lookup.
///
/// A key mapped to `null` is a confirmed "no assignment". A missing key means
/// the backend does not know the call yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchAssignmentResponse {
    #[serde(default)]
    pub result: HashMap<String, Option<Assignment>>,
}

impl BatchAssignmentResponse {
    pub fn into_assignments(self) -> HashMap<Fingerprint, Option<Assignment>> {
        self.result
            .into_iter()
            .map(|(hash, assignment)| (Fingerprint::from_hex(hash), assignment))
            .collect()
    }
}

/// Body of `POST /api/v1/calls/assign-by-hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignByHashRequest {
    pub amo_id: String,
    pub contact_id: i64,
    pub deal_id: i64,
    pub note_type: String,
    pub phone: Option<String>,
    pub duration_seconds: Option<u64>,
    pub link: Option<String>,
    pub source: Option<String>,
    pub reason: Option<String>,
}

impl AssignByHashRequest {
    /// Build a manual assignment of `call` to `deal_id`.
    pub fn for_call(
        fingerprint: &Fingerprint,
        contact_id: &str,
        deal_id: &str,
        call: &CallRecord,
        reason: &str,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            amo_id: fingerprint.as_str().to_string(),
            contact_id: parse_numeric_id(contact_id)?,
            deal_id: parse_numeric_id(deal_id)?,
            note_type: call.direction.note_type().to_string(),
            phone: call.phone.clone(),
            duration_seconds: call.duration_seconds(),
            link: call.permanent_link.clone(),
            source: call.provider_tag.clone(),
            reason: Some(reason.to_string()),
        })
    }
}

/// Body of `POST /api/v1/calls/{id}/assign`. A null deal detaches the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignCallRequest {
    pub deal_id: Option<String>,
}

impl AssignCallRequest {
    pub fn to_deal(deal_id: &str) -> Self {
        Self {
            deal_id: Some(deal_id.to_string()),
        }
    }

    pub fn unassign() -> Self {
        Self { deal_id: None }
    }
}

/// A call as the backend stores it.
///
/// Older backends send camelCase keys for the user, contact and deal
/// fields; both spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendCall {
    /// The call's `amo_id`, which is the fingerprint for calls assigned by hash.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub call_type: String,
    /// `HH:MM:SS`.
    pub duration: String,
    pub phone: Option<String>,
    #[serde(alias = "userId", deserialize_with = "deserialize_optional_id")]
    pub user_id: Option<String>,
    #[serde(alias = "userName")]
    pub user_name: Option<String>,
    #[serde(alias = "recordingUrl")]
    pub recording_url: Option<String>,
    pub status: String,
    pub provider: Option<String>,
    #[serde(alias = "contactId", deserialize_with = "deserialize_optional_id")]
    pub contact_id: Option<String>,
    #[serde(alias = "dealId", deserialize_with = "deserialize_optional_id")]
    pub deal_id: Option<String>,
    pub link: Option<String>,
}

/// Page size used when the caller does not pick one.
pub const DEFAULT_UNASSIGNED_PAGE_LIMIT: u32 = 20;

/// Response of `GET /api/v1/contacts/{id}/unassigned-calls`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnassignedCallsPage {
    pub items: Vec<BackendCall>,
    pub page: u32,
    pub total: u64,
    #[serde(alias = "hasMore")]
    pub has_more: Option<bool>,
}

impl UnassignedCallsPage {
    /// Whether a page after this one exists. Falls back to counting when the
    /// backend omits the flag.
    pub fn has_more_pages(&self, limit: u32) -> bool {
        self.has_more
            .unwrap_or_else(|| u64::from(self.page) * u64::from(limit) < self.total)
    }
}

/// Body of `POST /api/v1/calls/attach-next`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachNextRequest {
    pub contact_id: String,
    pub deal_id: String,
    pub ttl_seconds: u64,
}

/// Default lifetime of attach-next mode.
pub const DEFAULT_ATTACH_NEXT_TTL_SECS: u64 = 600;

/// Response of attach-next activation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachNextActivation {
    pub status: String,
    /// Unix timestamp in milliseconds.
    pub expires_at: i64,
    pub ttl_seconds: u64,
}

/// Response of attach-next cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CancelAttachNextResponse {
    pub status: String,
}

/// Current attach-next state of a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachNextStatus {
    pub is_active: bool,
    pub deal_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawAttachNextStatus {
    #[serde(default)]
    is_active: bool,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    deal_id: Option<String>,
    #[serde(default)]
    expires_at: Option<Value>,
    #[serde(default)]
    ttl_seconds: Option<u64>,
}

impl AttachNextStatus {
    /// Parse the status body. `expires_at` is either epoch milliseconds or an
    /// RFC 3339 string depending on the backend version.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let raw: RawAttachNextStatus = serde_json::from_str(body)?;
        Ok(Self {
            is_active: raw.is_active,
            deal_id: raw.deal_id,
            expires_at: raw.expires_at.as_ref().and_then(parse_expires_at),
            ttl_seconds: raw.ttl_seconds,
        })
    }
}

fn parse_expires_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        _ => None,
    }
}

fn parse_numeric_id(raw: &str) -> Result<i64, FilterError> {
    raw.trim()
        .parse()
        .map_err(|_| FilterError::InvalidId(raw.to_string()))
}
