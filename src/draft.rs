//! Draft persistence
//!
//! The working pipeline and its credential bindings live in a local
//! JSON file between CLI invocations. Secrets bound as literals are
//! stored as typed; stored-key bindings only keep the vault id.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialBinder;
use crate::error::StrandError;
use crate::pipeline::Pipeline;

/// Everything the CLI keeps between invocations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Draft {
    pub pipeline: Pipeline,
    #[serde(default)]
    pub bindings: CredentialBinder,
}

impl Draft {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            bindings: CredentialBinder::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StrandError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn store(&self, path: &Path) -> Result<(), StrandError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}
