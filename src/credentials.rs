//! Credential binding
//!
//! Tracks, per step that needs one, which stored or literal secret is
//! forwarded at run time. Secrets are opaque here: the binder never
//! inspects or persists the values it resolves.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::catalog::AgentCatalog;
use crate::error::StrandError;
use crate::pipeline::Pipeline;

/// Where a step's secret comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Reference into the backend key vault
    Stored { id: String },
    /// Value typed in directly, forwarded as-is
    Literal { value: String },
}

/// Stored key entry as the backend serves it
///
/// `key` carries the literal value only where the client needs to
/// forward it; it is never written to disk by this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredKey {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub key: Option<String>,
}

/// Snapshot of the backend key vault
#[derive(Debug, Clone, Default)]
pub struct ApiKeyCatalog {
    keys: Vec<StoredKey>,
}

impl ApiKeyCatalog {
    pub fn new(keys: Vec<StoredKey>) -> Self {
        Self { keys }
    }

    pub fn get(&self, key_id: &str) -> Option<&StoredKey> {
        self.keys.iter().find(|k| k.id == key_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredKey> {
        self.keys.iter()
    }
}

/// Per-step credential bindings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialBinder {
    bindings: BTreeMap<String, CredentialSource>,
}

impl CredentialBinder {
    pub fn bind(&mut self, step_id: impl Into<String>, source: CredentialSource) {
        self.bindings.insert(step_id.into(), source);
    }

    /// Drop the binding for a removed step (or one whose agent no
    /// longer needs a credential)
    pub fn unbind(&mut self, step_id: &str) {
        self.bindings.remove(step_id);
    }

    pub fn binding(&self, step_id: &str) -> Option<&CredentialSource> {
        self.bindings.get(step_id)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolve every required binding into a literal secret map
    ///
    /// The map is keyed by agent id, which is what the run endpoints
    /// consume. Fails on the first credential-requiring step with no
    /// binding, and on stored references the vault no longer knows.
    pub fn resolve_all(
        &self,
        pipeline: &Pipeline,
        catalog: &AgentCatalog,
        keys: &ApiKeyCatalog,
    ) -> Result<HashMap<String, String>, StrandError> {
        let mut resolved = HashMap::new();
        for step in pipeline.ordered()? {
            let agent = catalog
                .get(&step.agent_id)
                .ok_or_else(|| StrandError::UnknownAgent {
                    agent_id: step.agent_id.clone(),
                })?;
            let required = agent.requires_api_key;

            let source = match self.bindings.get(&step.id) {
                Some(source) => source,
                None if required => {
                    return Err(StrandError::MissingCredential {
                        step_id: step.id.clone(),
                    })
                }
                None => continue,
            };

            let secret = match source {
                CredentialSource::Literal { value } => value.clone(),
                CredentialSource::Stored { id } => keys
                    .get(id)
                    .and_then(|k| k.key.clone())
                    .ok_or_else(|| StrandError::UnknownStoredKey { key_id: id.clone() })?,
            };
            resolved.insert(step.agent_id.clone(), secret);
        }
        Ok(resolved)
    }

    /// True iff every credential-requiring step resolves successfully
    pub fn all_required_bound(
        &self,
        pipeline: &Pipeline,
        catalog: &AgentCatalog,
        keys: &ApiKeyCatalog,
    ) -> bool {
        self.resolve_all(pipeline, catalog, keys).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Agent, DataType};

    fn agent(id: &str, agent_type: &str, requires: bool) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            input_type: DataType::Text,
            output_type: DataType::Text,
            agent_type: agent_type.to_string(),
            requires_api_key: requires,
            capability: None,
        }
    }

    fn fixtures() -> (AgentCatalog, ApiKeyCatalog) {
        let catalog = AgentCatalog::from_agents(vec![
            agent("whisper", "transcribe", true),
            agent("chat", "chat", false),
        ]);
        let keys = ApiKeyCatalog::new(vec![StoredKey {
            id: "k1".to_string(),
            provider: "openai".to_string(),
            key: Some("sk-stored".to_string()),
        }]);
        (catalog, keys)
    }

    #[test]
    fn test_unbound_required_step_fails() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        pipeline.add_step(&catalog, "whisper").unwrap();

        let binder = CredentialBinder::default();
        assert!(!binder.all_required_bound(&pipeline, &catalog, &keys));
        assert!(matches!(
            binder.resolve_all(&pipeline, &catalog, &keys),
            Err(StrandError::MissingCredential { .. })
        ));
    }

    #[test]
    fn test_literal_binding_resolves() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        let step = pipeline.add_step(&catalog, "whisper").unwrap();

        let mut binder = CredentialBinder::default();
        binder.bind(
            &step,
            CredentialSource::Literal {
                value: "sk-literal".to_string(),
            },
        );

        let resolved = binder.resolve_all(&pipeline, &catalog, &keys).unwrap();
        assert_eq!(resolved["whisper"], "sk-literal");
    }

    #[test]
    fn test_stored_binding_resolves_via_vault() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        let step = pipeline.add_step(&catalog, "whisper").unwrap();

        let mut binder = CredentialBinder::default();
        binder.bind(&step, CredentialSource::Stored { id: "k1".to_string() });

        let resolved = binder.resolve_all(&pipeline, &catalog, &keys).unwrap();
        assert_eq!(resolved["whisper"], "sk-stored");
    }

    #[test]
    fn test_dangling_stored_reference_fails() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        let step = pipeline.add_step(&catalog, "whisper").unwrap();

        let mut binder = CredentialBinder::default();
        binder.bind(&step, CredentialSource::Stored { id: "gone".to_string() });

        assert!(matches!(
            binder.resolve_all(&pipeline, &catalog, &keys),
            Err(StrandError::UnknownStoredKey { .. })
        ));
    }

    #[test]
    fn test_steps_without_requirement_pass_unbound() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        pipeline.add_step(&catalog, "chat").unwrap();

        let binder = CredentialBinder::default();
        let resolved = binder.resolve_all(&pipeline, &catalog, &keys).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_unbind_clears_removed_step() {
        let (catalog, keys) = fixtures();
        let mut pipeline = Pipeline::new("svc").unwrap();
        let step = pipeline.add_step(&catalog, "whisper").unwrap();

        let mut binder = CredentialBinder::default();
        binder.bind(
            &step,
            CredentialSource::Literal {
                value: "sk".to_string(),
            },
        );
        pipeline.remove_step(&catalog, &step).unwrap();
        binder.unbind(&step);

        assert!(binder.is_empty());
        assert!(binder.all_required_bound(&pipeline, &catalog, &keys));
    }
}
