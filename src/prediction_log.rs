use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::normalize::ProbabilityDistribution;

const LOG_FILE: &str = "prediction_events.jsonl";

#[derive(Debug, Clone, Serialize)]
pub struct PredictionEvent {
    pub timestamp: String,
    pub prediction_id: String,
    pub team_a: Option<String>,
    pub team_b: Option<String>,
    pub predicted_result: String,
    pub probability: f64,
    pub payload: BTreeMap<String, Value>,
    pub probabilities: ProbabilityDistribution,
}

impl PredictionEvent {
    pub fn new(
        prediction_id: &str,
        predicted_result: &str,
        probability: f64,
        payload: &Map<String, Value>,
        probabilities: &ProbabilityDistribution,
        context: &Map<String, Value>,
    ) -> Self {
        // Only the team names are kept from the caller's context.
        let ctx = |key: &str| {
            context.get(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            prediction_id: prediction_id.to_string(),
            team_a: ctx("team_a"),
            team_b: ctx("team_b"),
            predicted_result: predicted_result.to_string(),
            probability,
            payload: payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            probabilities: probabilities.clone(),
        }
    }
}

/// Best-effort destination for prediction events.
pub trait PredictionSink: Send + Sync {
    fn record(&self, event: &PredictionEvent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl PredictionSink for NoopSink {
    fn record(&self, _event: &PredictionEvent) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to `<dir>/prediction_events.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlPredictionLog {
    path: PathBuf,
}

impl JsonlPredictionLog {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(LOG_FILE),
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PredictionSink for JsonlPredictionLog {
    fn record(&self, event: &PredictionEvent) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
        }
        let mut line = serde_json::to_string(event).context("serialize prediction event")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}
