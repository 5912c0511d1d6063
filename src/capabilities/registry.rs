//! Capability Registry: the set of agents the router may dispatch to.
//!
//! The registry loads from:
//! 1. Built-in declarations for the four engine adapters
//! 2. A YAML file `{agentRegistryVersion, agents: [...]}`
//! 3. Programmatic registration
//!
//! Resolution is by exact agent name.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::capability::AgentCapability;

pub const VECTOR_AGENT: &str = "vector-dynamics-agent";
pub const SIMULATOR_AGENT: &str = "family-system-agent";
pub const INSIGHT_AGENT: &str = "analyst-agent";
pub const SCHEMA_AGENT: &str = "schema-integration-agent";

pub const BUILTIN_REGISTRY_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// On-disk registry layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    agent_registry_version: String,
    #[serde(default)]
    agents: Vec<AgentCapability>,
}

/// Declared agents indexed by name.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    version: String,
    agents: HashMap<String, AgentCapability>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four engine adapters with their default contracts.
    pub fn builtin() -> Self {
        let mut reg = Self {
            version: BUILTIN_REGISTRY_VERSION.to_string(),
            agents: HashMap::new(),
        };
        reg.register(
            AgentCapability::new(VECTOR_AGENT, "vector")
                .inputs(&["input", "lineage", "members", "astrology", "intensity"])
                .outputs(&["vector", "archetypeWeights", "primaryArchetype", "flags", "message"])
                .timeout(5_000),
        );
        reg.register(
            AgentCapability::new(SIMULATOR_AGENT, "simulation")
                .inputs(&["action", "size", "iterations", "fieldStrength", "seed"])
                .outputs(&["stats", "cosmicState", "nodes"])
                .timeout(5_000),
        );
        reg.register(
            AgentCapability::new(INSIGHT_AGENT, "insight")
                .inputs(&["simState", "members", "tier"])
                .outputs(&["insights", "passLevel", "entropy"])
                .forbid(&["rawPrompt"])
                .timeout(45_000),
        );
        reg.register(
            AgentCapability::new(SCHEMA_AGENT, "schema")
                .inputs(&["schema"])
                .outputs(&["schema", "coherenceScore"])
                .timeout(5_000),
        );
        reg
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        let mut reg = Self {
            version: file.agent_registry_version,
            agents: HashMap::new(),
        };
        for agent in file.agents {
            if reg.agents.contains_key(&agent.name) {
                log::warn!("Duplicate agent '{}' in registry; keeping the last entry", agent.name);
            }
            reg.register(agent);
        }
        Ok(reg)
    }

    /// Load a registry file.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reg = Self::from_yaml_str(&content)?;
        log::info!(
            "Loaded agent registry v{} from {} ({} agents)",
            reg.version,
            path.display(),
            reg.len()
        );
        Ok(reg)
    }

    /// Register an agent, replacing any previous declaration of the same name.
    pub fn register(&mut self, capability: AgentCapability) {
        self.agents.insert(capability.name.clone(), capability);
    }

    pub fn resolve(&self, name: &str) -> Option<&AgentCapability> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// All declared agents, sorted by name.
    pub fn list(&self) -> Vec<&AgentCapability> {
        let mut agents: Vec<_> = self.agents.values().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
