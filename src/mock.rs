//! Mock backend for testing
//!
//! Returns configurable responses without touching the network and
//! records every call so tests can assert on exactly which requests a
//! dispatch produced (and which it never made).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{Backend, FileInput, InvokeBody, MultipartRequest};
use crate::catalog::AgentWire;
use crate::credentials::StoredKey;
use crate::error::{RunPhase, StrandError};
use crate::pipeline::ServicePayload;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    FetchAgents,
    FetchApiKeys,
    CreateService {
        name: String,
    },
    DeleteService {
        service_id: String,
    },
    Invoke {
        service_id: String,
        phase: RunPhase,
        body: Value,
    },
    Upload {
        field: String,
        file_name: String,
    },
    InvokeMultipart {
        agent_type: String,
        file_name: String,
        text: Option<String>,
        fields: Vec<(String, String)>,
    },
}

/// Failure injected for one endpoint: status + detail
type Rejection = (u16, String);

/// Mock backend with configurable responses and call recording
#[derive(Clone, Default)]
pub struct MockBackend {
    agents: Arc<Mutex<Vec<AgentWire>>>,
    keys: Arc<Mutex<Vec<StoredKey>>>,
    /// Queue of invoke responses (FIFO); default when empty
    invoke_responses: Arc<Mutex<Vec<Value>>>,
    upload_handle: Arc<Mutex<String>>,
    reject_upload: Arc<Mutex<Option<Rejection>>>,
    reject_invoke: Arc<Mutex<Option<Rejection>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.upload_handle.lock().unwrap() = "stored/upload-1".to_string();
        mock
    }

    pub fn with_agents(self, agents: Vec<AgentWire>) -> Self {
        *self.agents.lock().unwrap() = agents;
        self
    }

    pub fn with_keys(self, keys: Vec<StoredKey>) -> Self {
        *self.keys.lock().unwrap() = keys;
        self
    }

    /// Queue an invoke response
    pub fn queue_invoke_response(&self, response: Value) {
        self.invoke_responses.lock().unwrap().push(response);
    }

    pub fn set_upload_handle(&self, handle: impl Into<String>) {
        *self.upload_handle.lock().unwrap() = handle.into();
    }

    /// Make the next uploads fail with the given status
    pub fn reject_uploads(&self, status: u16, detail: impl Into<String>) {
        *self.reject_upload.lock().unwrap() = Some((status, detail.into()));
    }

    /// Make the next invokes fail with the given status
    pub fn reject_invokes(&self, status: u16, detail: impl Into<String>) {
        *self.reject_invoke.lock().unwrap() = Some((status, detail.into()));
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_invoke_response(&self) -> Value {
        let mut queue = self.invoke_responses.lock().unwrap();
        if queue.is_empty() {
            json!({ "output": "mock output", "process_id": "proc-1" })
        } else {
            queue.remove(0)
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch_agents(&self) -> Result<Vec<AgentWire>, StrandError> {
        self.record(RecordedCall::FetchAgents);
        Ok(self.agents.lock().unwrap().clone())
    }

    async fn fetch_api_keys(&self) -> Result<Vec<StoredKey>, StrandError> {
        self.record(RecordedCall::FetchApiKeys);
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn create_service(&self, payload: &ServicePayload) -> Result<Value, StrandError> {
        self.record(RecordedCall::CreateService {
            name: payload.name.clone(),
        });
        Ok(json!({ "id": "svc-1", "name": payload.name }))
    }

    async fn delete_service(&self, service_id: &str) -> Result<(), StrandError> {
        self.record(RecordedCall::DeleteService {
            service_id: service_id.to_string(),
        });
        Ok(())
    }

    async fn invoke(
        &self,
        service_id: &str,
        phase: RunPhase,
        body: &InvokeBody,
    ) -> Result<Value, StrandError> {
        self.record(RecordedCall::Invoke {
            service_id: service_id.to_string(),
            phase,
            body: serde_json::to_value(body).expect("invoke body serializes"),
        });
        if let Some((status, detail)) = self.reject_invoke.lock().unwrap().clone() {
            return Err(StrandError::Upstream {
                phase,
                status,
                detail,
            });
        }
        Ok(self.next_invoke_response())
    }

    async fn upload(&self, field: &str, file: &FileInput) -> Result<String, StrandError> {
        self.record(RecordedCall::Upload {
            field: field.to_string(),
            file_name: file.name.clone(),
        });
        if let Some((status, detail)) = self.reject_upload.lock().unwrap().clone() {
            return Err(StrandError::Upstream {
                phase: RunPhase::Upload,
                status,
                detail,
            });
        }
        Ok(self.upload_handle.lock().unwrap().clone())
    }

    async fn invoke_multipart(&self, request: &MultipartRequest) -> Result<Value, StrandError> {
        self.record(RecordedCall::InvokeMultipart {
            agent_type: request.agent_type.clone(),
            file_name: request.file.name.clone(),
            text: request.text.clone(),
            fields: request.fields.clone(),
        });
        if let Some((status, detail)) = self.reject_invoke.lock().unwrap().clone() {
            return Err(StrandError::Upstream {
                phase: RunPhase::Invoke,
                status,
                detail,
            });
        }
        Ok(self.next_invoke_response())
    }
}
