//! Agent capability record: what a dispatch target is declared to accept
//! and produce.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One declared agent.
///
/// Example YAML:
/// ```yaml
/// name: analyst-agent
/// domain: insight
/// allowedInputs: [simState, members]
/// allowedOutputs: [insights]
/// forbiddenOutputs: [rawPrompt]
/// timeoutMs: 45000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapability {
    /// Dispatch name, matched against `targetAgent`.
    pub name: String,

    pub domain: String,

    #[serde(default)]
    pub allowed_inputs: Vec<String>,

    #[serde(default)]
    pub allowed_outputs: Vec<String>,

    /// Top-level result keys stripped before the reply leaves the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_outputs: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_targets: Option<Vec<String>>,

    /// Upper bound on one adapter call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            allowed_inputs: Vec::new(),
            allowed_outputs: Vec::new(),
            forbidden_outputs: None,
            escalation_targets: None,
            timeout_ms: None,
        }
    }

    pub fn inputs(mut self, inputs: &[&str]) -> Self {
        self.allowed_inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn outputs(mut self, outputs: &[&str]) -> Self {
        self.allowed_outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn forbid(mut self, outputs: &[&str]) -> Self {
        self.forbidden_outputs = Some(outputs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Whether `key` may appear at the top level of this agent's result.
    pub fn forbids(&self, key: &str) -> bool {
        self.forbidden_outputs
            .as_ref()
            .map(|keys| keys.iter().any(|k| k == key))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_uses_camel_case() {
        let yaml = r#"
name: analyst-agent
domain: insight
allowedInputs: [simState]
allowedOutputs: [insights]
forbiddenOutputs: [rawPrompt]
timeoutMs: 1500
"#;
        let cap: AgentCapability = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cap.allowed_inputs, vec!["simState"]);
        assert!(cap.forbids("rawPrompt"));
        assert!(!cap.forbids("insights"));
        assert_eq!(cap.timeout_duration(), Some(Duration::from_millis(1500)));
        assert!(cap.escalation_targets.is_none());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let value = serde_json::to_value(AgentCapability::new("a", "b")).unwrap();
        assert!(value.get("timeoutMs").is_none());
        assert!(value.get("forbiddenOutputs").is_none());
        assert_eq!(value["allowedInputs"], serde_json::json!([]));
    }
}
