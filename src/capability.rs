//! Capability table
//!
//! Static mapping from an agent-type tag to the execution-strategy
//! descriptor the dispatcher uses. Tags are free-form strings on the
//! wire; here they resolve once into a closed set of strategies.

use serde_json::Value;

/// The four request protocols a run can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One JSON POST with the user text
    PlainInvoke,
    /// Same shape as PlainInvoke, but a query against pre-existing
    /// state; no file is ever sent
    QueryOnlyInvoke,
    /// Multipart upload first, then a JSON POST with the storage handle
    TwoPhaseUpload,
    /// Single multipart POST straight to the agent endpoint (legacy)
    DirectMultipartInvoke,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::PlainInvoke => write!(f, "plain-invoke"),
            Strategy::QueryOnlyInvoke => write!(f, "query-only-invoke"),
            Strategy::TwoPhaseUpload => write!(f, "two-phase-upload"),
            Strategy::DirectMultipartInvoke => write!(f, "direct-multipart"),
        }
    }
}

/// User-tunable options consumed by the dynamic field builders
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ask transcription agents to include word timestamps
    pub timestamps: bool,
    /// Source-language hint for transcription agents
    pub language: Option<String>,
}

/// Builder for request fields derived at dispatch time
pub type FieldBuilder = fn(&RunOptions) -> Vec<(&'static str, Value)>;

/// Execution descriptor for one agent type
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    /// Normalized agent-type tag this entry covers
    pub tag: &'static str,
    pub strategy: Strategy,
    /// Multipart field name the backend expects the file under
    pub file_field: &'static str,
    /// Accepted file extensions, lowercase with leading dot
    pub accepted_extensions: &'static [&'static str],
    pub max_file_size_mb: u32,
    pub requires_api_key: bool,
    /// The agent answers queries against pre-existing state
    pub query_only: bool,
    pub dynamic_fields: FieldBuilder,
}

impl Capability {
    /// True when the strategy consumes a file
    pub fn needs_file(&self) -> bool {
        matches!(
            self.strategy,
            Strategy::TwoPhaseUpload | Strategy::DirectMultipartInvoke
        )
    }

    pub fn accepted_list(&self) -> String {
        self.accepted_extensions.join(", ")
    }
}

fn no_fields(_opts: &RunOptions) -> Vec<(&'static str, Value)> {
    Vec::new()
}

fn transcribe_fields(opts: &RunOptions) -> Vec<(&'static str, Value)> {
    let mut fields = Vec::new();
    if opts.timestamps {
        fields.push(("timestamps", Value::Bool(true)));
    }
    if let Some(lang) = &opts.language {
        fields.push(("language", Value::String(lang.clone())));
    }
    fields
}

/// The full table. Order is irrelevant; tags are unique.
const TABLE: &[Capability] = &[
    Capability {
        tag: "transcribe",
        strategy: Strategy::TwoPhaseUpload,
        file_field: "file",
        accepted_extensions: &[".mp3", ".wav", ".m4a", ".ogg", ".flac"],
        max_file_size_mb: 25,
        requires_api_key: true,
        query_only: false,
        dynamic_fields: transcribe_fields,
    },
    Capability {
        tag: "doc-qa",
        strategy: Strategy::TwoPhaseUpload,
        file_field: "file",
        accepted_extensions: &[".pdf", ".txt", ".md", ".docx"],
        max_file_size_mb: 10,
        requires_api_key: true,
        query_only: false,
        dynamic_fields: no_fields,
    },
    Capability {
        tag: "rag",
        strategy: Strategy::QueryOnlyInvoke,
        file_field: "",
        accepted_extensions: &[],
        max_file_size_mb: 0,
        requires_api_key: true,
        query_only: true,
        dynamic_fields: no_fields,
    },
    Capability {
        tag: "ocr",
        strategy: Strategy::DirectMultipartInvoke,
        file_field: "image",
        accepted_extensions: &[".png", ".jpg", ".jpeg"],
        max_file_size_mb: 5,
        requires_api_key: false,
        query_only: false,
        dynamic_fields: no_fields,
    },
];

/// Look up the capability entry for an agent-type tag
///
/// Tags compare case-insensitively after trimming. Types without an
/// entry fall back to PlainInvoke at dispatch time.
pub fn lookup(agent_type: &str) -> Option<&'static Capability> {
    let normalized = agent_type.trim().to_lowercase();
    TABLE.iter().find(|c| c.tag == normalized)
}

/// Whether this agent type is in the credential-requiring set
pub fn requires_api_key(agent_type: &str) -> bool {
    lookup(agent_type).map(|c| c.requires_api_key).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_tags() {
        assert_eq!(lookup("transcribe").unwrap().strategy, Strategy::TwoPhaseUpload);
        assert_eq!(lookup("rag").unwrap().strategy, Strategy::QueryOnlyInvoke);
        assert_eq!(lookup("ocr").unwrap().strategy, Strategy::DirectMultipartInvoke);
    }

    #[test]
    fn test_lookup_normalizes() {
        assert!(lookup(" Transcribe ").is_some());
        assert!(lookup("RAG").is_some());
    }

    #[test]
    fn test_unknown_tag_has_no_entry() {
        assert!(lookup("chat").is_none());
        assert!(!requires_api_key("chat"));
    }

    #[test]
    fn test_credential_requiring_set() {
        assert!(requires_api_key("transcribe"));
        assert!(requires_api_key("rag"));
        assert!(!requires_api_key("ocr"));
    }

    #[test]
    fn test_needs_file() {
        assert!(lookup("transcribe").unwrap().needs_file());
        assert!(lookup("ocr").unwrap().needs_file());
        assert!(!lookup("rag").unwrap().needs_file());
    }

    #[test]
    fn test_transcribe_dynamic_fields() {
        let cap = lookup("transcribe").unwrap();

        let none = (cap.dynamic_fields)(&RunOptions::default());
        assert!(none.is_empty());

        let opts = RunOptions {
            timestamps: true,
            language: Some("fr".to_string()),
        };
        let fields = (cap.dynamic_fields)(&opts);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "timestamps");
        assert_eq!(fields[1].1, Value::String("fr".to_string()));
    }

    #[test]
    fn test_query_only_flag() {
        assert!(lookup("rag").unwrap().query_only);
        assert!(!lookup("doc-qa").unwrap().query_only);
    }
}
