//! Tone-safety gate: whole-word, case-insensitive term substitution followed
//! by redaction of banned terms.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{load_yaml, PolicyError};

pub const DEFAULT_REDACTION: &str = "[REDACTED]";

const DEFAULT_REPLACEMENTS: [(&str, &str); 11] = [
    ("trauma", "legacy load"),
    ("healing", "integration"),
    ("anxiety", "high-frequency resonance"),
    ("depression", "low-velocity state"),
    ("chakra", "energy center"),
    ("aura", "field projection"),
    ("spirit", "animating force"),
    ("soul", "core metrics"),
    ("karma", "causal sequence"),
    ("happy", "optimal flow"),
    ("sad", "signal dampening"),
];

const DEFAULT_BANNED: [&str; 7] = ["cure", "heal", "treat", "diagnose", "doctor", "physician", "prescription"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneRule {
    pub term: String,
    pub replacement: String,
}

/// Serializable tone table. Replacements apply in order, before redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneConfig {
    #[serde(default)]
    pub replacements: Vec<ToneRule>,
    #[serde(default)]
    pub banned: Vec<String>,
    #[serde(default = "default_redaction")]
    pub redaction: String,
}

fn default_redaction() -> String {
    DEFAULT_REDACTION.to_string()
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            replacements: DEFAULT_REPLACEMENTS
                .iter()
                .map(|(term, replacement)| ToneRule {
                    term: term.to_string(),
                    replacement: replacement.to_string(),
                })
                .collect(),
            banned: DEFAULT_BANNED.iter().map(|s| s.to_string()).collect(),
            redaction: default_redaction(),
        }
    }
}

impl ToneConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let config: Self = load_yaml(path)?;
        log::info!(
            "loaded tone table from {} ({} replacements, {} banned)",
            path.display(),
            config.replacements.len(),
            config.banned.len()
        );
        Ok(config)
    }
}

fn word_pattern(term: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
}

/// Compiled tone table.
#[derive(Debug, Clone)]
pub struct ToneGate {
    replacements: Vec<(Regex, String)>,
    banned: Vec<Regex>,
    redaction: String,
}

impl ToneGate {
    pub fn new(config: &ToneConfig) -> Result<Self, PolicyError> {
        let replacements = config
            .replacements
            .iter()
            .map(|r| Ok((word_pattern(&r.term)?, r.replacement.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let banned = config
            .banned
            .iter()
            .map(|t| word_pattern(t))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            replacements,
            banned,
            redaction: config.redaction.clone(),
        })
    }

    /// Gate compiled from the built-in table.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::new(&ToneConfig::default())
    }

    /// Rewrite one string.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (pattern, replacement) in &self.replacements {
            out = pattern.replace_all(&out, regex::NoExpand(replacement)).into_owned();
        }
        for pattern in &self.banned {
            out = pattern.replace_all(&out, regex::NoExpand(&self.redaction)).into_owned();
        }
        out
    }

    /// Rewrite the textual fields of a dispatch result in place.
    ///
    /// Covers a top-level `message` string and each entry of `insights`:
    /// plain strings, or the `title` and `description` of insight objects.
    pub fn filter_result(&self, result: &mut Value) {
        if let Some(Value::String(message)) = result.get_mut("message") {
            *message = self.apply(message);
        }
        if let Some(Value::Array(insights)) = result.get_mut("insights") {
            for entry in insights.iter_mut() {
                match entry {
                    Value::String(text) => *text = self.apply(text),
                    Value::Object(fields) => {
                        for key in ["title", "description"] {
                            if let Some(Value::String(text)) = fields.get_mut(key) {
                                *text = self.apply(text);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> ToneGate {
        ToneGate::builtin().unwrap()
    }

    #[test]
    fn test_replacements_are_whole_word_and_case_insensitive() {
        let g = gate();
        assert_eq!(g.apply("Trauma and ANXIETY"), "legacy load and high-frequency resonance");
        assert_eq!(g.apply("saddle soulful"), "saddle soulful");
        assert_eq!(g.apply("I feel sad."), "I feel signal dampening.");
    }

    #[test]
    fn test_banned_terms_are_redacted() {
        let g = gate();
        assert_eq!(g.apply("Ask your Doctor to treat it"), "Ask your [REDACTED] to [REDACTED] it");
        // "healing" is replaced before redaction runs, and "heal" only matches whole words.
        assert_eq!(g.apply("healing will heal"), "integration will [REDACTED]");
        assert_eq!(g.apply("treatment"), "treatment");
    }

    #[test]
    fn test_filter_result_targets_message_and_insights() {
        let g = gate();
        let mut result = json!({
            "message": "pure karma",
            "insights": ["a happy soul", 3, { "title": "aura check", "description": "see a physician", "id": "trauma-1" }],
            "notes": "trauma stays"
        });
        g.filter_result(&mut result);
        assert_eq!(result["message"], "pure causal sequence");
        assert_eq!(result["insights"][0], "a optimal flow core metrics");
        assert_eq!(result["insights"][1], 3);
        assert_eq!(result["insights"][2]["title"], "field projection check");
        assert_eq!(result["insights"][2]["description"], "see a [REDACTED]");
        assert_eq!(result["insights"][2]["id"], "trauma-1");
        assert_eq!(result["notes"], "trauma stays");
    }

    #[test]
    fn test_custom_table_from_yaml() {
        let config = ToneConfig::from_yaml_str(
            "replacements:\n  - term: grief\n    replacement: signal loss\nbanned: [therapy]\nredaction: '***'\n",
        )
        .unwrap();
        let g = ToneGate::new(&config).unwrap();
        assert_eq!(g.apply("grief therapy trauma"), "signal loss *** trauma");
    }

    #[test]
    fn test_terms_are_escaped() {
        let config = ToneConfig {
            replacements: vec![ToneRule {
                term: "a.b".into(),
                replacement: "$1".into(),
            }],
            banned: vec![],
            redaction: default_redaction(),
        };
        let g = ToneGate::new(&config).unwrap();
        assert_eq!(g.apply("a.b axb"), "$1 axb");
    }
}
