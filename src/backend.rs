//! Backend collaborator
//!
//! Trait over the REST service the pipelines run against, plus the
//! production `reqwest` implementation. Everything the core sends or
//! receives on the wire goes through here.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::AgentWire;
use crate::credentials::StoredKey;
use crate::error::{RunPhase, StrandError};
use crate::pipeline::ServicePayload;

/// Fixed bound on every network call
pub const CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default backend address when `STRAND_BACKEND_URL` is unset
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// A file selected for a run, loaded into memory up front so the
/// dispatched request works on a snapshot
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileInput {
    pub fn read(path: &Path) -> Result<Self, StrandError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Ok(Self { name, bytes })
    }

    /// Lowercased extension with the leading dot, or empty
    pub fn extension(&self) -> String {
        match self.name.rfind('.') {
            Some(idx) => self.name[idx..].to_lowercase(),
            None => String::new(),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }
}

/// JSON body of a run invoke (plain, query-only, or phase 2 of a
/// two-phase upload)
#[derive(Debug, Clone, Serialize)]
pub struct InvokeBody {
    pub input: String,
    pub api_keys: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One multipart run request for the legacy direct path
#[derive(Debug, Clone)]
pub struct MultipartRequest {
    pub agent_type: String,
    pub file_field: String,
    pub file: FileInput,
    pub text: Option<String>,
    pub fields: Vec<(String, String)>,
}

/// The REST collaborator behind the core
///
/// Implementations report failures as [`StrandError::Upstream`] for
/// non-success responses and [`StrandError::Network`]/
/// [`StrandError::Timeout`] for transport problems, tagged with the
/// phase the caller passes or the endpoint implies.
#[async_trait]
pub trait Backend: Send + Sync {
    /// GET the agent catalog
    async fn fetch_agents(&self) -> Result<Vec<AgentWire>, StrandError>;

    /// GET the stored API keys
    async fn fetch_api_keys(&self) -> Result<Vec<StoredKey>, StrandError>;

    /// POST the persisted pipeline; returns the created record
    async fn create_service(&self, payload: &ServicePayload) -> Result<Value, StrandError>;

    /// DELETE a persisted pipeline
    async fn delete_service(&self, service_id: &str) -> Result<(), StrandError>;

    /// POST a JSON run request; `phase` tags errors (Invoke for single
    /// request strategies, Process for phase 2 of an upload)
    async fn invoke(
        &self,
        service_id: &str,
        phase: RunPhase,
        body: &InvokeBody,
    ) -> Result<Value, StrandError>;

    /// Multipart POST of the raw file; returns the storage handle
    async fn upload(&self, field: &str, file: &FileInput) -> Result<String, StrandError>;

    /// Single multipart POST straight to the agent endpoint (legacy)
    async fn invoke_multipart(&self, request: &MultipartRequest) -> Result<Value, StrandError>;
}

// ============================================================================
// HTTP IMPLEMENTATION
// ============================================================================

/// Production backend over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("strand-cli/0.1")
            .build()
            .expect("Failed to build HTTP client");
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL from `STRAND_BACKEND_URL`, falling back to localhost
    pub fn from_env() -> Self {
        let base =
            std::env::var("STRAND_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn transport(phase: RunPhase, err: reqwest::Error) -> StrandError {
        if err.is_timeout() {
            StrandError::Timeout {
                phase,
                seconds: CALL_TIMEOUT.as_secs(),
            }
        } else {
            StrandError::Network {
                phase,
                message: err.to_string(),
            }
        }
    }

    /// Turn a non-success response into an Upstream error, preferring
    /// the structured `detail` field over raw status text
    async fn check(
        phase: RunPhase,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StrandError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        tracing::error!(%status, phase = %phase, detail = %detail, "Backend request rejected");
        Err(StrandError::Upstream {
            phase,
            status: status.as_u16(),
            detail,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, StrandError> {
        let phase = RunPhase::Catalog;
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        Self::check(phase, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport(phase, e))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_agents(&self) -> Result<Vec<AgentWire>, StrandError> {
        tracing::debug!(base = %self.base_url, "Fetching agent catalog");
        self.get_json("agents").await
    }

    async fn fetch_api_keys(&self) -> Result<Vec<StoredKey>, StrandError> {
        tracing::debug!(base = %self.base_url, "Fetching stored API keys");
        self.get_json("api-keys").await
    }

    async fn create_service(&self, payload: &ServicePayload) -> Result<Value, StrandError> {
        let phase = RunPhase::Catalog;
        tracing::debug!(name = %payload.name, "Creating service");
        let response = self
            .client
            .post(self.url("services"))
            .json(payload)
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        Self::check(phase, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport(phase, e))
    }

    async fn delete_service(&self, service_id: &str) -> Result<(), StrandError> {
        let phase = RunPhase::Catalog;
        tracing::debug!(service_id, "Deleting service");
        let response = self
            .client
            .delete(self.url(&format!("services/{service_id}")))
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        Self::check(phase, response).await?;
        Ok(())
    }

    async fn invoke(
        &self,
        service_id: &str,
        phase: RunPhase,
        body: &InvokeBody,
    ) -> Result<Value, StrandError> {
        tracing::debug!(service_id, phase = %phase, "Invoking service");
        let response = self
            .client
            .post(self.url(&format!("services/{service_id}/run")))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        Self::check(phase, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport(phase, e))
    }

    async fn upload(&self, field: &str, file: &FileInput) -> Result<String, StrandError> {
        let phase = RunPhase::Upload;
        tracing::debug!(field, file = %file.name, size_mb = file.size_mb(), "Uploading file");
        let part = reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);
        let response = self
            .client
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        let value: Value = Self::check(phase, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        value
            .get("saved_as")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| StrandError::Network {
                phase,
                message: "upload response missing 'saved_as'".to_string(),
            })
    }

    async fn invoke_multipart(&self, request: &MultipartRequest) -> Result<Value, StrandError> {
        let phase = RunPhase::Invoke;
        tracing::debug!(agent_type = %request.agent_type, "Direct multipart invoke");
        let part = reqwest::multipart::Part::bytes(request.file.bytes.clone())
            .file_name(request.file.name.clone());
        let mut form =
            reqwest::multipart::Form::new().part(request.file_field.clone(), part);
        if let Some(text) = &request.text {
            form = form.text("input", text.clone());
        }
        for (name, value) in &request.fields {
            form = form.text(name.clone(), value.clone());
        }
        let response = self
            .client
            .post(self.url(&format!("agents/{}/run", request.agent_type)))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::transport(phase, e))?;
        Self::check(phase, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport(phase, e))
    }
}
