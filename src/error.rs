//! Error types with fix suggestions
//!
//! One enum for the whole crate, split into bands:
//! STRAND-01x validation, STRAND-02x chain integrity,
//! STRAND-03x upstream/transport.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Which request of a run an upstream/transport failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Catalog / key-vault / service CRUD traffic
    Catalog,
    /// Phase 1 of a two-phase upload
    Upload,
    /// Phase 2 of a two-phase upload (processing the stored file)
    Process,
    /// Single-request invoke (plain, query-only, direct multipart)
    Invoke,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Catalog => write!(f, "catalog"),
            RunPhase::Upload => write!(f, "upload"),
            RunPhase::Process => write!(f, "processing"),
            RunPhase::Invoke => write!(f, "invoke"),
        }
    }
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum StrandError {
    // ─────────────────────────────────────────────────────────────
    // Validation errors (STRAND-010 to STRAND-019)
    // Detected locally; dispatch is never attempted.
    // ─────────────────────────────────────────────────────────────
    #[error("STRAND-010: input text is required for this pipeline")]
    EmptyInput,

    #[error("STRAND-011: this pipeline needs a file to run")]
    MissingFile,

    #[error("STRAND-012: file type '{extension}' is not accepted (allowed: {allowed})")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("STRAND-013: file is {actual_mb:.1} MB, the limit for this agent is {limit_mb} MB")]
    FileTooLarge { actual_mb: f64, limit_mb: u32 },

    #[error("STRAND-014: step '{step_id}' requires an API key but none is bound")]
    MissingCredential { step_id: String },

    #[error("STRAND-015: stored key '{key_id}' was not found in the key vault")]
    UnknownStoredKey { key_id: String },

    #[error("STRAND-016: a run is already in flight for this pipeline")]
    RunInFlight,

    #[error("STRAND-017: invalid service name '{name}'")]
    InvalidName { name: String },

    #[error(
        "STRAND-018: type break: step '{producer}' outputs {produces} but step '{consumer}' expects {expects}"
    )]
    TypeBreak {
        producer: String,
        produces: String,
        consumer: String,
        expects: String,
    },

    #[error("STRAND-019: step '{step_id}' not found in the pipeline")]
    UnknownStep { step_id: String },

    #[error("unknown data type '{value}' (expected text, image, sound or document)")]
    InvalidDataType { value: String },

    #[error("the pipeline is empty - nothing to deploy")]
    EmptyPipeline,

    #[error("this draft has not been deployed yet")]
    NotDeployed,

    // ─────────────────────────────────────────────────────────────
    // Chain integrity errors (STRAND-020 to STRAND-024)
    // Defects in the edit operations, never user-recoverable.
    // ─────────────────────────────────────────────────────────────
    #[error("STRAND-020: chain corrupt: expected exactly one head step, found {found}")]
    AmbiguousHead { found: usize },

    #[error("STRAND-021: chain corrupt: cycle detected at step '{step_id}'")]
    CycleDetected { step_id: String },

    #[error("STRAND-022: chain corrupt: {unreached} step(s) unreachable from the head")]
    DetachedSteps { unreached: usize },

    #[error("STRAND-023: chain corrupt: step '{step_id}' links to missing step '{next}'")]
    DanglingLink { step_id: String, next: String },

    #[error("STRAND-024: agent '{agent_id}' not found in the catalog")]
    UnknownAgent { agent_id: String },

    // ─────────────────────────────────────────────────────────────
    // Upstream / transport errors (STRAND-030 to STRAND-032)
    // Classified by the run phase that produced them.
    // ─────────────────────────────────────────────────────────────
    #[error("STRAND-030: backend rejected the {phase} request ({status}): {detail}")]
    Upstream {
        phase: RunPhase,
        status: u16,
        detail: String,
    },

    #[error("STRAND-031: network failure during the {phase} request: {message}")]
    Network { phase: RunPhase, message: String },

    #[error("STRAND-032: the {phase} request exceeded the {seconds}s timeout")]
    Timeout { phase: RunPhase, seconds: u64 },

    // ─────────────────────────────────────────────────────────────
    // Local draft-file plumbing
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrandError {
    /// True for errors caught before any network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StrandError::EmptyInput
                | StrandError::MissingFile
                | StrandError::UnsupportedExtension { .. }
                | StrandError::FileTooLarge { .. }
                | StrandError::MissingCredential { .. }
                | StrandError::UnknownStoredKey { .. }
                | StrandError::RunInFlight
                | StrandError::InvalidName { .. }
                | StrandError::TypeBreak { .. }
                | StrandError::UnknownStep { .. }
                | StrandError::InvalidDataType { .. }
                | StrandError::EmptyPipeline
                | StrandError::NotDeployed
        )
    }

    /// True for chain-integrity defects
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            StrandError::AmbiguousHead { .. }
                | StrandError::CycleDetected { .. }
                | StrandError::DetachedSteps { .. }
                | StrandError::DanglingLink { .. }
        )
    }

    /// The run phase a transport/upstream error belongs to
    pub fn phase(&self) -> Option<RunPhase> {
        match self {
            StrandError::Upstream { phase, .. }
            | StrandError::Network { phase, .. }
            | StrandError::Timeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl FixSuggestion for StrandError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StrandError::EmptyInput => Some("Pass --input with a non-empty text"),
            StrandError::MissingFile => Some("Pass --file with a path to the file to process"),
            StrandError::UnsupportedExtension { .. } => {
                Some("Convert the file to one of the accepted formats")
            }
            StrandError::FileTooLarge { .. } => Some("Use a smaller file or split it"),
            StrandError::MissingCredential { .. } => {
                Some("Bind a key with 'strand bind <step-id> --key-id <id>' or --literal")
            }
            StrandError::UnknownStoredKey { .. } => {
                Some("Run 'strand keys' to list the stored keys, then re-bind")
            }
            StrandError::RunInFlight => Some("Wait for the current run to finish"),
            StrandError::InvalidName { .. } => {
                Some("Use letters, digits, spaces, '-' or '_' (max 64 chars)")
            }
            StrandError::TypeBreak { .. } => {
                Some("Reorder or remove steps until each output feeds a matching input")
            }
            StrandError::UnknownStep { .. } => Some("Run 'strand show' to list step ids"),
            StrandError::InvalidDataType { .. } => {
                Some("Valid types are: text, image, sound, document")
            }
            StrandError::EmptyPipeline => Some("Add at least one step with 'strand add <agent-id>'"),
            StrandError::NotDeployed => Some("Deploy the draft first with 'strand save'"),
            StrandError::AmbiguousHead { .. }
            | StrandError::CycleDetected { .. }
            | StrandError::DetachedSteps { .. }
            | StrandError::DanglingLink { .. } => {
                Some("This is a bug in the edit operations - please report it")
            }
            StrandError::UnknownAgent { .. } => {
                Some("Run 'strand agents' to list the available agents")
            }
            StrandError::Upstream { .. } => Some("Check the backend logs for details"),
            StrandError::Network { .. } => {
                Some("Check STRAND_BACKEND_URL and that the backend is reachable")
            }
            StrandError::Timeout { .. } => Some("Re-trigger the run; long inputs may need longer"),
            StrandError::Io(_) => Some("Check file path and permissions"),
            StrandError::Json(_) => {
                Some("The draft file may be corrupt; recreate it with 'strand new'")
            }
        }
    }
}
