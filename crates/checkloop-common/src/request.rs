use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::seq;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Loop policy for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_auto_stop")]
    pub auto_stop_on_pass: bool,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_auto_stop() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            auto_stop_on_pass: default_auto_stop(),
        }
    }
}

impl RunConfig {
    /// Check the policy bounds, returning a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations < 1 {
            return Err("maxIterations must be at least 1".to_string());
        }
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(format!(
                "confidenceThreshold must be between 0 and 1, got {}",
                self.confidence_threshold
            ));
        }
        Ok(())
    }
}

/// Immutable per-run input, created once at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub generation_prompt: String,
    pub review_prompt: String,
    #[serde(default)]
    pub guidelines: String,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub inputs: Vec<Artifact>,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub references: Vec<Artifact>,
    #[serde(default)]
    pub config: RunConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults_when_omitted() {
        let req: RunRequest = serde_json::from_value(json!({
            "generationPrompt": "make slides",
            "reviewPrompt": "check slides",
        }))
        .unwrap();
        assert_eq!(req.config, RunConfig::default());
        assert!(req.inputs.is_empty());
        assert_eq!(req.guidelines, "");
    }

    #[test]
    fn test_config_validate_bounds() {
        assert!(RunConfig::default().validate().is_ok());
        let zero = RunConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(zero.validate().unwrap_err().contains("maxIterations"));
        let high = RunConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(high.validate().is_err());
        let nan = RunConfig {
            confidence_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_inputs_accept_numeric_keyed_object() {
        let req: RunRequest = serde_json::from_value(json!({
            "generationPrompt": "g",
            "reviewPrompt": "r",
            "inputs": {
                "1": {"name": "b.pdf", "url": "https://x/b.pdf"},
                "0": {"name": "a.pdf", "url": "https://x/a.pdf"}
            }
        }))
        .unwrap();
        let names: Vec<_> = req.inputs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }
}
