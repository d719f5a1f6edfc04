//! HTTP client for the widget backend.
//!
//! Every request runs on the blocking pool through `spawn_blocking`, since
//! `ureq` is synchronous. The request timeout comes from
//! `FilterConfig::request_timeout_ms`; a timed-out request fails the pass
//! like any other transport error. Query values go through ureq's `query`
//! so ids taken from the host page are percent-encoded.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::error::OracleError;
use crate::fingerprint::Fingerprint;
use crate::models::Assignment;

use super::wire::{
    AssignByHashRequest, AssignCallRequest, AttachNextActivation, AttachNextRequest,
    AttachNextStatus, BackendCall, BatchAssignmentRequest, BatchAssignmentResponse,
    CancelAttachNextResponse, UnassignedCallsPage,
};

pub const BATCH_ASSIGNMENT_PATH: &str = "/api/v1/calls/batch/deal-assignment";
pub const ASSIGN_BY_HASH_PATH: &str = "/api/v1/calls/assign-by-hash";
pub const ATTACH_NEXT_PATH: &str = "/api/v1/calls/attach-next";

/// The remote source of truth for call-to-deal assignments.
///
/// Only the batch lookup is required; the write operations default to
/// `OracleError::Unsupported` so read-only oracles stay small.
#[async_trait]
pub trait AssignmentOracle: Send + Sync {
    /// Look up assignments for a batch of fingerprints.
    ///
    /// The returned map may cover only a subset of the request.
    async fn batch_deal_assignment(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError>;

    async fn assign_by_hash(&self, _request: &AssignByHashRequest) -> Result<(), OracleError> {
        Err(OracleError::Unsupported("assign_by_hash"))
    }

    async fn activate_attach_next(
        &self,
        _request: &AttachNextRequest,
    ) -> Result<AttachNextActivation, OracleError> {
        Err(OracleError::Unsupported("activate_attach_next"))
    }

    async fn cancel_attach_next(
        &self,
        _contact_id: &str,
    ) -> Result<CancelAttachNextResponse, OracleError> {
        Err(OracleError::Unsupported("cancel_attach_next"))
    }

    async fn attach_next_status(&self, _contact_id: &str) -> Result<AttachNextStatus, OracleError> {
        Err(OracleError::Unsupported("attach_next_status"))
    }

    /// Move a backend call (by `amo_id`) to `deal_id`.
    async fn assign_call_to_deal(
        &self,
        _call_id: &str,
        _deal_id: &str,
    ) -> Result<BackendCall, OracleError> {
        Err(OracleError::Unsupported("assign_call_to_deal"))
    }

    /// Detach a backend call (by `amo_id`) from its deal.
    async fn unassign_call(&self, _call_id: &str) -> Result<BackendCall, OracleError> {
        Err(OracleError::Unsupported("unassign_call"))
    }

    /// One page of the calls the backend holds for a contact with no deal.
    /// Pages start at 1.
    async fn unassigned_calls_page(
        &self,
        _contact_id: &str,
        _page: u32,
        _limit: u32,
    ) -> Result<UnassignedCallsPage, OracleError> {
        Err(OracleError::Unsupported("unassigned_calls_page"))
    }
}

type Query = Vec<(&'static str, String)>;

/// HTTP oracle backed by the widget backend.
#[derive(Debug, Clone)]
pub struct HttpAssignmentOracle {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpAssignmentOracle {
    pub fn new(config: &FilterConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout()))
            .build()
            .into();

        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            agent,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Option<String> {
        self.auth_token.as_ref().map(|t| format!("Bearer {}", t))
    }

    async fn post<B>(&self, path: &str, body: B) -> Result<String, OracleError>
    where
        B: Serialize + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.url(path);
        let bearer = self.bearer();

        run_blocking(move || {
            let mut request = agent.post(&url);
            if let Some(value) = bearer {
                request = request.header("Authorization", value);
            }
            let response = request.send_json(&body).map_err(map_ureq_error)?;
            response
                .into_body()
                .read_to_string()
                .map_err(|e| OracleError::Decode(e.to_string()))
        })
        .await
    }

    async fn get(&self, path: &str, query: Query) -> Result<String, OracleError> {
        let agent = self.agent.clone();
        let url = self.url(path);
        let bearer = self.bearer();

        run_blocking(move || {
            let mut request = agent.get(&url);
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(value) = bearer {
                request = request.header("Authorization", value);
            }
            let response = request.call().map_err(map_ureq_error)?;
            response
                .into_body()
                .read_to_string()
                .map_err(|e| OracleError::Decode(e.to_string()))
        })
        .await
    }

    async fn delete(&self, path: &str, query: Query) -> Result<String, OracleError> {
        let agent = self.agent.clone();
        let url = self.url(path);
        let bearer = self.bearer();

        run_blocking(move || {
            let mut request = agent.delete(&url);
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(value) = bearer {
                request = request.header("Authorization", value);
            }
            let response = request.call().map_err(map_ureq_error)?;
            response
                .into_body()
                .read_to_string()
                .map_err(|e| OracleError::Decode(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl AssignmentOracle for HttpAssignmentOracle {
    async fn batch_deal_assignment(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError> {
        log::debug!(
            "ORACLE_BATCH_REQUEST url={} count={}",
            self.url(BATCH_ASSIGNMENT_PATH),
            fingerprints.len()
        );

        let body = self
            .post(BATCH_ASSIGNMENT_PATH, BatchAssignmentRequest::new(fingerprints))
            .await?;
        let response: BatchAssignmentResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))?;
        Ok(response.into_assignments())
    }

    async fn assign_by_hash(&self, request: &AssignByHashRequest) -> Result<(), OracleError> {
        self.post(ASSIGN_BY_HASH_PATH, request.clone()).await?;
        Ok(())
    }

    async fn activate_attach_next(
        &self,
        request: &AttachNextRequest,
    ) -> Result<AttachNextActivation, OracleError> {
        let body = self.post(ATTACH_NEXT_PATH, request.clone()).await?;
        serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }

    async fn cancel_attach_next(
        &self,
        contact_id: &str,
    ) -> Result<CancelAttachNextResponse, OracleError> {
        let body = self
            .delete(ATTACH_NEXT_PATH, vec![("contact_id", contact_id.to_string())])
            .await?;
        serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }

    async fn attach_next_status(&self, contact_id: &str) -> Result<AttachNextStatus, OracleError> {
        let body = self.get(&attach_next_status_path(contact_id), Vec::new()).await?;
        AttachNextStatus::from_json(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }

    async fn assign_call_to_deal(
        &self,
        call_id: &str,
        deal_id: &str,
    ) -> Result<BackendCall, OracleError> {
        let body = self
            .post(&call_assign_path(call_id), AssignCallRequest::to_deal(deal_id))
            .await?;
        serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }

    async fn unassign_call(&self, call_id: &str) -> Result<BackendCall, OracleError> {
        let body = self
            .post(&call_assign_path(call_id), AssignCallRequest::unassign())
            .await?;
        serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }

    async fn unassigned_calls_page(
        &self,
        contact_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<UnassignedCallsPage, OracleError> {
        let query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        let body = self.get(&unassigned_calls_path(contact_id), query).await?;
        serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))
    }
}

pub fn attach_next_status_path(contact_id: &str) -> String {
    format!("/api/v1/contacts/{}/next-call-deal", contact_id)
}

pub fn call_assign_path(call_id: &str) -> String {
    format!("/api/v1/calls/{}/assign", call_id)
}

pub fn unassigned_calls_path(contact_id: &str) -> String {
    format!("/api/v1/contacts/{}/unassigned-calls", contact_id)
}

async fn run_blocking<T, F>(op: F) -> Result<T, OracleError>
where
    F: FnOnce() -> Result<T, OracleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| OracleError::Join(e.to_string()))?
}

fn map_ureq_error(err: ureq::Error) -> OracleError {
    match err {
        ureq::Error::StatusCode(status) => OracleError::Status(status),
        ureq::Error::Timeout(_) => OracleError::Timeout,
        other => OracleError::Transport(other.to_string()),
    }
}
