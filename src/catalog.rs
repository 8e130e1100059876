//! Agent catalog
//!
//! Read-only snapshot of the agents the backend offers. Fetched as a
//! whole and replaced as a whole on refresh; never mutated in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::{self, Capability};

/// The four data types an agent can consume or produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Image,
    Sound,
    Document,
}

impl DataType {
    /// All variants, for CLI filter parsing
    pub const ALL: [DataType; 4] = [
        DataType::Text,
        DataType::Image,
        DataType::Sound,
        DataType::Document,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(DataType::Text),
            "image" => Some(DataType::Image),
            "sound" => Some(DataType::Sound),
            "document" => Some(DataType::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Text => write!(f, "text"),
            DataType::Image => write!(f, "image"),
            DataType::Sound => write!(f, "sound"),
            DataType::Document => write!(f, "document"),
        }
    }
}

/// Agent entry as the backend serves it
#[derive(Debug, Clone, Deserialize)]
pub struct AgentWire {
    pub id: String,
    pub name: String,
    pub input_type: DataType,
    pub output_type: DataType,
    pub agent_type: String,
}

/// A catalog entry, immutable once fetched
///
/// The capability descriptor and `requires_api_key` are resolved from
/// the capability table when the catalog loads, so dispatch never
/// re-derives them by string lookup.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub input_type: DataType,
    pub output_type: DataType,
    pub agent_type: String,
    pub requires_api_key: bool,
    pub capability: Option<&'static Capability>,
}

impl Agent {
    fn from_wire(wire: AgentWire) -> Self {
        let capability = capability::lookup(&wire.agent_type);
        Self {
            id: wire.id,
            name: wire.name,
            input_type: wire.input_type,
            output_type: wire.output_type,
            agent_type: wire.agent_type,
            requires_api_key: capability.map(|c| c.requires_api_key).unwrap_or(false),
            capability,
        }
    }
}

/// Read-only agent snapshot with id lookup
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
}

impl AgentCatalog {
    /// Build a catalog from the backend's wire format
    pub fn from_wire(agents: Vec<AgentWire>) -> Self {
        let agents: Vec<Agent> = agents.into_iter().map(Agent::from_wire).collect();
        let index = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self { agents, index }
    }

    /// Build a catalog from already-resolved agents (tests)
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        let index = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self { agents, index }
    }

    #[inline]
    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.index.get(agent_id).map(|&i| &self.agents[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(id: &str, agent_type: &str) -> AgentWire {
        AgentWire {
            id: id.to_string(),
            name: format!("Agent {id}"),
            input_type: DataType::Text,
            output_type: DataType::Text,
            agent_type: agent_type.to_string(),
        }
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("text"), Some(DataType::Text));
        assert_eq!(DataType::parse(" Image "), Some(DataType::Image));
        assert_eq!(DataType::parse("video"), None);
    }

    #[test]
    fn test_data_type_wire_names() {
        let json = serde_json::to_string(&DataType::Document).unwrap();
        assert_eq!(json, "\"document\"");
        let back: DataType = serde_json::from_str("\"sound\"").unwrap();
        assert_eq!(back, DataType::Sound);
    }

    #[test]
    fn test_capability_resolved_on_load() {
        let catalog = AgentCatalog::from_wire(vec![wire("a1", "transcribe"), wire("a2", "chat")]);

        let tagged = catalog.get("a1").unwrap();
        assert!(tagged.requires_api_key);
        assert_eq!(tagged.capability.unwrap().tag, "transcribe");

        let untagged = catalog.get("a2").unwrap();
        assert!(!untagged.requires_api_key);
        assert!(untagged.capability.is_none());
    }

    #[test]
    fn test_lookup_by_id() {
        let catalog = AgentCatalog::from_wire(vec![wire("a1", "chat")]);
        assert!(catalog.get("a1").is_some());
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
