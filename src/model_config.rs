use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Training schema the active artifact expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub input_features: Vec<String>,
    pub scoreline_classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawModelConfig {
    #[serde(default)]
    input_features: Option<Vec<String>>,
    #[serde(default)]
    scoreline_classes: Option<Vec<String>>,
}

impl ModelConfig {
    pub fn new(input_features: Vec<String>, scoreline_classes: Vec<String>) -> Result<Self> {
        if input_features.is_empty() {
            return Err(EngineError::Config(
                "model config is missing a valid 'input_features' list".to_string(),
            ));
        }
        Ok(Self {
            input_features,
            scoreline_classes,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Required file not found: {} ({e})", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parses YAML; JSON documents are accepted as a YAML subset.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)
            .map_err(|e| EngineError::Config(format!("model config is not valid YAML: {e}")))?;
        if !value.is_mapping() {
            return Err(EngineError::Config(
                "model config must contain a dictionary".to_string(),
            ));
        }
        let parsed: RawModelConfig = serde_yaml::from_value(value).map_err(|e| {
            EngineError::Config(format!(
                "'input_features' and 'scoreline_classes' must be lists of strings: {e}"
            ))
        })?;
        let features = parsed.input_features.unwrap_or_default();
        Self::new(features, parsed.scoreline_classes.unwrap_or_default())
    }
}
