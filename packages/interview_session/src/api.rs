//! REST collaborator client: patient catalogue, registration, session
//! restore, and historical logs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::protocol::normalize_text;
use crate::transport::Endpoint;
use crate::types::{ChatMessage, PatientInfo, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error! status: {status}, text: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ApiError {
    /// The server could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ApiError::Network(e) if e.is_connect())
    }
}

/// `POST /v1` body. Serializes with `msg_type: "RegistrationRequest"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename = "RegistrationRequest")]
pub struct RegistrationRequest {
    pub user_name: String,
    pub user_role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_patient_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub msg_type: String,
}

/// Server-held state of an existing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRestoreResponse {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_date: Option<String>,
    /// Fields this client does not model (prompt version stamps and the like).
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// One row of `GET /v1/logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: String,
    pub user_role: String,
    pub user_name: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub started_at: String,
}

/// One utterance of `GET /v1/logs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLog {
    pub id: i64,
    pub sender: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_role: Option<String>,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct PatientListResponse {
    #[serde(default)]
    patient_ids: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Every request gives up after `timeout`.
    pub fn with_timeout(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: reqwest::Client, endpoint: &Endpoint) -> Self {
        Self {
            http,
            base_url: endpoint.base_url(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ids of every selectable patient. Numeric ids come back as strings.
    pub async fn patient_ids(&self) -> Result<Vec<String>, ApiError> {
        let list: PatientListResponse = self.get("/v1/patients").await?;
        Ok(list.patient_ids.iter().map(normalize_text).collect())
    }

    pub async fn patient_details(&self, patient_id: &str) -> Result<PatientInfo, ApiError> {
        self.get(&format!("/v1/patient/{patient_id}")).await
    }

    pub async fn restore_session(&self, session_id: &str) -> Result<SessionRestoreResponse, ApiError> {
        self.get(&format!("/v1/session/{session_id}")).await
    }

    pub async fn register_user(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, ApiError> {
        let url = format!("{}/v1", self.base_url);
        debug!("POST {}", url);
        let resp = self.http.post(&url).json(request).send().await?;
        Self::decode(resp).await
    }

    pub async fn session_logs(&self) -> Result<Vec<SessionLog>, ApiError> {
        self.get("/v1/logs").await
    }

    pub async fn session_log_detail(&self, session_id: &str) -> Result<Vec<ChatLog>, ApiError> {
        self.get(&format!("/v1/logs/{session_id}")).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = self.http.get(&url).send().await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}
