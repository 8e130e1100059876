//! Pipeline assembly
//!
//! The ordered pipeline is a singly linked chain of steps kept in an
//! arena keyed by stable step id. Head and tail are derived, never
//! stored, so edits can't leave a stale pointer behind. Every edit
//! computes its full next state before it becomes observable.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{AgentCatalog, DataType};
use crate::error::StrandError;

/// Service names: start alphanumeric, then letters/digits/space/-/_, max 64
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _-]{0,63}$").expect("valid regex"));

/// One position in the chain
///
/// `settings` is an opaque key/value map handed through to the backend
/// untouched. `next` links to the following step by id, `None` marks
/// the tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    pub next: Option<String>,
}

/// An adjacent pair whose types don't line up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBreak {
    pub producer: String,
    pub produces: DataType,
    pub consumer: String,
    pub expects: DataType,
}

impl TypeBreak {
    pub fn into_error(self) -> StrandError {
        StrandError::TypeBreak {
            producer: self.producer,
            produces: self.produces.to_string(),
            consumer: self.consumer,
            expects: self.expects.to_string(),
        }
    }
}

/// The mutable pipeline draft
///
/// Declared input/output types are derived from the head and tail
/// agents and recomputed on every edit; `None` means unset (empty
/// pipeline).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    /// Backend id once the draft has been deployed
    #[serde(default)]
    pub service_id: Option<String>,
    steps: HashMap<String, Step>,
    input_type: Option<DataType>,
    output_type: Option<DataType>,
    next_id: u64,
}

impl Pipeline {
    /// Create an empty pipeline with a validated service name
    pub fn new(name: impl Into<String>) -> Result<Self, StrandError> {
        let name = name.into();
        if !NAME_RE.is_match(&name) {
            return Err(StrandError::InvalidName { name });
        }
        Ok(Self {
            name,
            ..Self::default()
        })
    }

    pub fn input_type(&self) -> Option<DataType> {
        self.input_type
    }

    pub fn output_type(&self) -> Option<DataType> {
        self.output_type
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, step_id: &str) -> Option<&Step> {
        self.steps.get(step_id)
    }

    /// Append a step for the given agent at the tail
    ///
    /// First step fixes both declared types; later steps only move the
    /// declared output type. Returns the new step's id.
    pub fn add_step(
        &mut self,
        catalog: &AgentCatalog,
        agent_id: &str,
    ) -> Result<String, StrandError> {
        let agent = catalog.get(agent_id).ok_or_else(|| StrandError::UnknownAgent {
            agent_id: agent_id.to_string(),
        })?;

        let tail_id = self.ordered()?.last().map(|s| s.id.clone());

        self.next_id += 1;
        let id = format!("s{}", self.next_id);
        let step = Step {
            id: id.clone(),
            agent_id: agent.id.clone(),
            settings: BTreeMap::new(),
            next: None,
        };

        match tail_id {
            None => {
                self.input_type = Some(agent.input_type);
                self.output_type = Some(agent.output_type);
            }
            Some(tail_id) => {
                self.steps
                    .get_mut(&tail_id)
                    .expect("tail came from ordered()")
                    .next = Some(id.clone());
                self.output_type = Some(agent.output_type);
            }
        }
        self.steps.insert(id.clone(), step);
        Ok(id)
    }

    /// Remove a step and re-link its predecessor to its successor
    ///
    /// Removing the head implicitly promotes the successor; removing the
    /// sole step resets both declared types to unset.
    pub fn remove_step(
        &mut self,
        catalog: &AgentCatalog,
        step_id: &str,
    ) -> Result<(), StrandError> {
        // Stage the whole next version, then commit.
        let mut staged = self.clone();
        let removed = staged
            .steps
            .remove(step_id)
            .ok_or_else(|| StrandError::UnknownStep {
                step_id: step_id.to_string(),
            })?;
        if let Some(pred) = staged
            .steps
            .values_mut()
            .find(|s| s.next.as_deref() == Some(step_id))
        {
            pred.next = removed.next.clone();
        }
        staged.refresh_types(catalog)?;

        *self = staged;
        Ok(())
    }

    /// Swap a step with the one before it; no-op at the head
    ///
    /// Rewrites exactly the three affected links: the step before the
    /// pair, the pair itself, and the link out of the pair.
    pub fn move_up(
        &mut self,
        catalog: &AgentCatalog,
        step_id: &str,
    ) -> Result<bool, StrandError> {
        let order: Vec<String> = self.ordered()?.iter().map(|s| s.id.clone()).collect();
        let idx = order
            .iter()
            .position(|id| id == step_id)
            .ok_or_else(|| StrandError::UnknownStep {
                step_id: step_id.to_string(),
            })?;
        if idx == 0 {
            return Ok(false);
        }

        let above = order[idx - 1].clone();
        let before = idx.checked_sub(2).map(|i| order[i].clone());

        // Stage the three link rewrites, then commit.
        let mut staged = self.clone();
        let after = staged.steps[step_id].next.clone();
        if let Some(before) = before {
            staged.steps.get_mut(&before).expect("from ordered()").next =
                Some(step_id.to_string());
        }
        staged.steps.get_mut(step_id).expect("from ordered()").next = Some(above.clone());
        staged.steps.get_mut(&above).expect("from ordered()").next = after;
        staged.refresh_types(catalog)?;

        *self = staged;
        Ok(true)
    }

    /// Swap a step with the one after it; no-op at the tail
    pub fn move_down(
        &mut self,
        catalog: &AgentCatalog,
        step_id: &str,
    ) -> Result<bool, StrandError> {
        let successor = match self.steps.get(step_id) {
            Some(step) => step.next.clone(),
            None => {
                return Err(StrandError::UnknownStep {
                    step_id: step_id.to_string(),
                })
            }
        };
        match successor {
            Some(successor) => self.move_up(catalog, &successor),
            None => Ok(false),
        }
    }

    /// Resolve the chain into its ordered sequence
    ///
    /// The head is the one id no `next` references. Anything else
    /// (zero or several head candidates, a link to a missing step, a
    /// revisited id, steps the walk never reached) is corruption and
    /// reported as an integrity error, never silently patched.
    pub fn ordered(&self) -> Result<Vec<&Step>, StrandError> {
        if self.steps.is_empty() {
            return Ok(Vec::new());
        }

        let targets: HashSet<&str> = self
            .steps
            .values()
            .filter_map(|s| s.next.as_deref())
            .collect();
        let mut heads = self.steps.keys().filter(|id| !targets.contains(id.as_str()));
        let head = match (heads.next(), heads.next()) {
            (Some(head), None) => head,
            (None, _) => return Err(StrandError::AmbiguousHead { found: 0 }),
            (Some(_), Some(_)) => {
                let found = self
                    .steps
                    .keys()
                    .filter(|id| !targets.contains(id.as_str()))
                    .count();
                return Err(StrandError::AmbiguousHead { found });
            }
        };

        let mut seq = Vec::with_capacity(self.steps.len());
        let mut visited: HashSet<&str> = HashSet::with_capacity(self.steps.len());
        let mut current = self.steps.get(head).expect("head is a key");
        loop {
            if !visited.insert(current.id.as_str()) {
                return Err(StrandError::CycleDetected {
                    step_id: current.id.clone(),
                });
            }
            seq.push(current);
            match current.next.as_deref() {
                None => break,
                Some(next) => {
                    current = self.steps.get(next).ok_or_else(|| StrandError::DanglingLink {
                        step_id: current.id.clone(),
                        next: next.to_string(),
                    })?;
                }
            }
        }

        if seq.len() != self.steps.len() {
            return Err(StrandError::DetachedSteps {
                unreached: self.steps.len() - seq.len(),
            });
        }
        Ok(seq)
    }

    /// Every adjacent pair whose output/input types mismatch
    ///
    /// Reordering is allowed to create breaks; they are surfaced here
    /// and enforced when the pipeline is deployed.
    pub fn type_breaks(&self, catalog: &AgentCatalog) -> Result<Vec<TypeBreak>, StrandError> {
        let seq = self.ordered()?;
        let mut breaks = Vec::new();
        for pair in seq.windows(2) {
            let producer = Self::agent_of(catalog, pair[0])?;
            let consumer = Self::agent_of(catalog, pair[1])?;
            if producer.output_type != consumer.input_type {
                breaks.push(TypeBreak {
                    producer: pair[0].id.clone(),
                    produces: producer.output_type,
                    consumer: pair[1].id.clone(),
                    expects: consumer.input_type,
                });
            }
        }
        Ok(breaks)
    }

    /// Dense persistence payload: ordered steps re-indexed to "0".."n-1"
    /// with `next` rewritten to match
    pub fn to_service_payload(&self) -> Result<ServicePayload, StrandError> {
        let seq = self.ordered()?;
        let count = seq.len();
        let nodes = seq
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let node = ServiceNode {
                    agent_id: step.agent_id.clone(),
                    settings: step.settings.clone(),
                    next: (i + 1 < count).then(|| (i + 1).to_string()),
                };
                (i.to_string(), node)
            })
            .collect();
        Ok(ServicePayload {
            name: self.name.clone(),
            input_type: self.input_type,
            output_type: self.output_type,
            workflow: ServiceWorkflow { nodes },
        })
    }

    /// Re-derive declared types from the resolved head and tail
    fn refresh_types(&mut self, catalog: &AgentCatalog) -> Result<(), StrandError> {
        let endpoints = {
            let seq = self.ordered()?;
            match (seq.first(), seq.last()) {
                (Some(head), Some(tail)) => Some((
                    Self::agent_of(catalog, head)?.input_type,
                    Self::agent_of(catalog, tail)?.output_type,
                )),
                _ => None,
            }
        };
        match endpoints {
            Some((input, output)) => {
                self.input_type = Some(input);
                self.output_type = Some(output);
            }
            None => {
                self.input_type = None;
                self.output_type = None;
            }
        }
        Ok(())
    }

    fn agent_of<'a>(
        catalog: &'a AgentCatalog,
        step: &Step,
    ) -> Result<&'a crate::catalog::Agent, StrandError> {
        catalog.get(&step.agent_id).ok_or_else(|| StrandError::UnknownAgent {
            agent_id: step.agent_id.clone(),
        })
    }
}

// ============================================================================
// PERSISTENCE PAYLOAD (wire format of POST /services)
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ServicePayload {
    pub name: String,
    pub input_type: Option<DataType>,
    pub output_type: Option<DataType>,
    pub workflow: ServiceWorkflow,
}

#[derive(Debug, Serialize)]
pub struct ServiceWorkflow {
    pub nodes: BTreeMap<String, ServiceNode>,
}

#[derive(Debug, Serialize)]
pub struct ServiceNode {
    pub agent_id: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Value>,
    pub next: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
