use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{EngineError, Result};

/// Emits a probability-like score vector per input row.
pub trait DistributionEmitter {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Emits a single predicted class label per input row.
pub trait LabelEmitter {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<String>>;
}

/// A deserialized model. Implementors expose whichever capabilities they support.
pub trait ScorelineModel: Send + Sync {
    fn classes(&self) -> Option<&[String]>;

    fn as_distribution_emitter(&self) -> Option<&dyn DistributionEmitter> {
        None
    }

    fn as_label_emitter(&self) -> Option<&dyn LabelEmitter> {
        None
    }
}

pub enum ModelCapability<'a> {
    DistributionEmitter(&'a dyn DistributionEmitter),
    LabelEmitter(&'a dyn LabelEmitter),
}

impl<'a> ModelCapability<'a> {
    /// Distribution output is preferred over single labels.
    pub fn of(model: &'a dyn ScorelineModel) -> Option<Self> {
        if let Some(d) = model.as_distribution_emitter() {
            return Some(ModelCapability::DistributionEmitter(d));
        }
        model.as_label_emitter().map(ModelCapability::LabelEmitter)
    }
}

/// Turns an artifact file into a model.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn ScorelineModel>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifactLoader;

impl ArtifactLoader for JsonArtifactLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn ScorelineModel>> {
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::ModelInterface(format!("failed reading {}: {e}", path.display()))
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| {
            EngineError::ModelInterface(format!(
                "{} is not a recognised model artifact: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), kind = artifact.kind_name(), "artifact deserialized");
        artifact.into_model()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    BaselineScoreline(BaselineScorelineModel),
    LinearSoftmax(LinearSoftmaxModel),
    NearestCentroid(NearestCentroidModel),
}

impl ModelArtifact {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ModelArtifact::BaselineScoreline(_) => "baseline_scoreline",
            ModelArtifact::LinearSoftmax(_) => "linear_softmax",
            ModelArtifact::NearestCentroid(_) => "nearest_centroid",
        }
    }

    pub fn into_model(self) -> Result<Arc<dyn ScorelineModel>> {
        Ok(match self {
            ModelArtifact::BaselineScoreline(m) => Arc::new(m),
            ModelArtifact::LinearSoftmax(m) => {
                m.check_shape()?;
                Arc::new(m)
            }
            ModelArtifact::NearestCentroid(m) => {
                m.check_shape()?;
                Arc::new(m)
            }
        })
    }
}

/// Small deterministic scoreline model, handy for smoke tests and demos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineScorelineModel {
    #[serde(default = "baseline_classes")]
    pub classes: Vec<String>,
}

fn baseline_classes() -> Vec<String> {
    ["0-0", "1-0", "0-1", "2-1", "1-2", "2-0", "0-2", "Other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BaselineScorelineModel {
    fn default() -> Self {
        Self {
            classes: baseline_classes(),
        }
    }
}

impl BaselineScorelineModel {
    fn score(row: &[f64], class_index: usize) -> f64 {
        let weight = (class_index + 1) as f64 * 0.17;
        let rotational = if row.is_empty() {
            0.0
        } else {
            row[class_index % row.len()] * 0.03
        };
        let magnitude = row.iter().map(|v| v.abs()).sum::<f64>() + 1.0;
        (weight + rotational + magnitude * 0.01 * (class_index + 1) as f64).abs()
    }
}

impl DistributionEmitter for BaselineScorelineModel {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let n = self.classes.len();
        let out = rows
            .iter()
            .map(|row| {
                let scores: Vec<f64> = (0..n).map(|i| Self::score(row, i)).collect();
                let total: f64 = scores.iter().sum();
                if total == 0.0 {
                    vec![1.0 / n as f64; n]
                } else {
                    scores.iter().map(|s| s / total).collect()
                }
            })
            .collect();
        Ok(out)
    }
}

impl ScorelineModel for BaselineScorelineModel {
    fn classes(&self) -> Option<&[String]> {
        Some(&self.classes)
    }

    fn as_distribution_emitter(&self) -> Option<&dyn DistributionEmitter> {
        Some(self)
    }
}

/// Multinomial linear model emitting raw logits (`weights · x + bias`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSoftmaxModel {
    #[serde(default)]
    pub classes: Vec<String>,
    pub weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub bias: Vec<f64>,
}

impl LinearSoftmaxModel {
    fn check_shape(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(EngineError::ModelInterface(
                "linear_softmax artifact has no weight rows".to_string(),
            ));
        }
        if !self.bias.is_empty() && self.bias.len() != self.weights.len() {
            return Err(EngineError::ModelInterface(format!(
                "linear_softmax bias has {} entries for {} weight rows",
                self.bias.len(),
                self.weights.len()
            )));
        }
        Ok(())
    }
}

impl DistributionEmitter for LinearSoftmaxModel {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut logits = Vec::with_capacity(self.weights.len());
            for (k, w) in self.weights.iter().enumerate() {
                if w.len() != row.len() {
                    return Err(EngineError::ModelInterface(format!(
                        "weight row {k} expects {} features, got {}",
                        w.len(),
                        row.len()
                    )));
                }
                let dot: f64 = w.iter().zip(row).map(|(a, b)| a * b).sum();
                logits.push(dot + self.bias.get(k).copied().unwrap_or(0.0));
            }
            out.push(logits);
        }
        Ok(out)
    }
}

impl ScorelineModel for LinearSoftmaxModel {
    fn classes(&self) -> Option<&[String]> {
        if self.classes.is_empty() {
            None
        } else {
            Some(&self.classes)
        }
    }

    fn as_distribution_emitter(&self) -> Option<&dyn DistributionEmitter> {
        Some(self)
    }
}

/// Label-only model: predicts the class whose centroid is closest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestCentroidModel {
    pub classes: Vec<String>,
    pub centroids: Vec<Vec<f64>>,
}

impl NearestCentroidModel {
    fn check_shape(&self) -> Result<()> {
        if self.classes.is_empty() || self.classes.len() != self.centroids.len() {
            return Err(EngineError::ModelInterface(format!(
                "nearest_centroid artifact has {} classes for {} centroids",
                self.classes.len(),
                self.centroids.len()
            )));
        }
        Ok(())
    }
}

impl LabelEmitter for NearestCentroidModel {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut best: Option<(usize, f64)> = None;
            for (idx, c) in self.centroids.iter().enumerate() {
                if c.len() != row.len() {
                    return Err(EngineError::ModelInterface(format!(
                        "centroid {idx} has {} dims, row has {}",
                        c.len(),
                        row.len()
                    )));
                }
                let d: f64 = c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum();
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((idx, d));
                }
            }
            let (idx, _) = best.ok_or_else(|| {
                EngineError::ModelInterface("nearest_centroid has no centroids".to_string())
            })?;
            out.push(self.classes[idx].clone());
        }
        Ok(out)
    }
}

impl ScorelineModel for NearestCentroidModel {
    fn classes(&self) -> Option<&[String]> {
        Some(&self.classes)
    }

    fn as_label_emitter(&self) -> Option<&dyn LabelEmitter> {
        Some(self)
    }
}

/// Lowercase hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        EngineError::Registry(format!("failed hashing {}: {e}", path.display()))
    })?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
