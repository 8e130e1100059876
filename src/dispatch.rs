//! Execution dispatch
//!
//! Turns an assembled pipeline plus user input into one of the four
//! request protocols and drives it against the backend: resolve the
//! ordered sequence, pick the strategy from the first capability-tagged
//! step, validate locally, execute, classify the outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{Backend, FileInput, InvokeBody, MultipartRequest};
use crate::capability::{Capability, RunOptions, Strategy};
use crate::catalog::{Agent, AgentCatalog, DataType};
use crate::credentials::{ApiKeyCatalog, CredentialBinder};
use crate::error::{RunPhase, StrandError};
use crate::pipeline::Pipeline;

/// User-supplied material for one run
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub text: Option<String>,
    pub file: Option<FileInput>,
    pub options: RunOptions,
}

impl RunInput {
    fn text_trimmed(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// How the result should be presented, chosen from the pipeline's
/// declared output type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    PlainText,
    ImagePreview,
    AudioPlayer,
    DocumentLink,
}

impl From<DataType> for DisplayKind {
    fn from(dt: DataType) -> Self {
        match dt {
            DataType::Text => DisplayKind::PlainText,
            DataType::Image => DisplayKind::ImagePreview,
            DataType::Sound => DisplayKind::AudioPlayer,
            DataType::Document => DisplayKind::DocumentLink,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub strategy: Strategy,
    /// First of `output` / `final_output` / `answer` in the response
    pub text: String,
    pub process_id: Option<String>,
    pub display: DisplayKind,
    pub raw: Value,
}

/// Resets the in-flight flag when a run resolves or fails
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives runs for one pipeline instance
///
/// A single in-flight flag blocks re-invocation until the current run
/// resolves; edits made while a run is pending don't affect it because
/// the run works on a snapshot taken at dispatch time.
pub struct Dispatcher<B: Backend> {
    backend: B,
    in_flight: AtomicBool,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Execute one run of the pipeline
    pub async fn run(
        &self,
        service_id: &str,
        pipeline: &Pipeline,
        catalog: &AgentCatalog,
        binder: &CredentialBinder,
        keys: &ApiKeyCatalog,
        input: RunInput,
    ) -> Result<RunOutcome, StrandError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StrandError::RunInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        // Snapshot the sequence and strategy before any validation so
        // concurrent edits can't shift what this run sends.
        let agents = Self::resolve_agents(pipeline, catalog)?;
        let cap = Self::select_capability(&agents);
        let strategy = cap.map(|c| c.strategy).unwrap_or(Strategy::PlainInvoke);
        debug!(strategy = %strategy, steps = agents.len(), "Dispatch resolved");

        Self::validate(cap, strategy, &input)?;
        let api_keys = binder.resolve_all(pipeline, catalog, keys)?;

        let display = DisplayKind::from(pipeline.output_type().unwrap_or(DataType::Text));
        let raw = match strategy {
            Strategy::PlainInvoke | Strategy::QueryOnlyInvoke => {
                let body = InvokeBody {
                    input: input.text_trimmed().unwrap_or_default().to_string(),
                    api_keys,
                    extra: serde_json::Map::new(),
                };
                self.backend
                    .invoke(service_id, RunPhase::Invoke, &body)
                    .await?
            }
            Strategy::TwoPhaseUpload => {
                let cap = cap.expect("strategy implies a capability entry");
                let file = input.file.as_ref().expect("validated above");
                let handle = self.backend.upload(cap.file_field, file).await?;
                info!(handle = %handle, "Upload complete, starting processing");

                let mut extra = serde_json::Map::new();
                for (name, value) in (cap.dynamic_fields)(&input.options) {
                    extra.insert(name.to_string(), value);
                }
                let body = InvokeBody {
                    input: handle,
                    api_keys,
                    extra,
                };
                self.backend
                    .invoke(service_id, RunPhase::Process, &body)
                    .await?
            }
            Strategy::DirectMultipartInvoke => {
                let cap = cap.expect("strategy implies a capability entry");
                let file = input.file.clone().expect("validated above");
                let fields = (cap.dynamic_fields)(&input.options)
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), field_text(value)))
                    .collect();
                let request = MultipartRequest {
                    agent_type: cap.tag.to_string(),
                    file_field: cap.file_field.to_string(),
                    file,
                    text: input.text_trimmed().map(String::from),
                    fields,
                };
                self.backend.invoke_multipart(&request).await?
            }
        };

        let outcome = Self::classify(strategy, display, raw);
        info!(strategy = %strategy, process_id = ?outcome.process_id, "Run complete");
        Ok(outcome)
    }

    /// Resolve every step's agent from the catalog, in chain order
    fn resolve_agents<'a>(
        pipeline: &Pipeline,
        catalog: &'a AgentCatalog,
    ) -> Result<Vec<&'a Agent>, StrandError> {
        pipeline
            .ordered()?
            .into_iter()
            .map(|step| {
                catalog.get(&step.agent_id).ok_or_else(|| StrandError::UnknownAgent {
                    agent_id: step.agent_id.clone(),
                })
            })
            .collect()
    }

    /// First capability-tagged step fixes the strategy for the run
    ///
    /// Only one file/credential-consuming step is supported per
    /// pipeline; later tagged steps are intentionally ignored.
    fn select_capability(agents: &[&Agent]) -> Option<&'static Capability> {
        agents.iter().find_map(|a| a.capability)
    }

    /// Strategy-specific local gates; failing any aborts before any
    /// network call
    fn validate(
        cap: Option<&Capability>,
        strategy: Strategy,
        input: &RunInput,
    ) -> Result<(), StrandError> {
        match strategy {
            Strategy::PlainInvoke | Strategy::QueryOnlyInvoke => {
                if input.text_trimmed().is_none() {
                    return Err(StrandError::EmptyInput);
                }
            }
            Strategy::TwoPhaseUpload | Strategy::DirectMultipartInvoke => {
                let cap = cap.expect("strategy implies a capability entry");
                let file = input.file.as_ref().ok_or(StrandError::MissingFile)?;
                let extension = file.extension();
                if !cap
                    .accepted_extensions
                    .iter()
                    .any(|accepted| *accepted == extension)
                {
                    return Err(StrandError::UnsupportedExtension {
                        extension,
                        allowed: cap.accepted_list(),
                    });
                }
                let actual_mb = file.size_mb();
                if actual_mb > cap.max_file_size_mb as f64 {
                    return Err(StrandError::FileTooLarge {
                        actual_mb,
                        limit_mb: cap.max_file_size_mb,
                    });
                }
            }
        }
        Ok(())
    }

    /// Pull the displayable text and process id out of the response
    fn classify(strategy: Strategy, display: DisplayKind, raw: Value) -> RunOutcome {
        let text = ["output", "final_output", "answer"]
            .into_iter()
            .find_map(|key| raw.get(key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let process_id = raw
            .get("process_id")
            .and_then(|v| v.as_str())
            .map(String::from);
        RunOutcome {
            strategy,
            text,
            process_id,
            display,
            raw,
        }
    }
}

fn field_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
