use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::artifact::{ModelCapability, ScorelineModel};
use crate::error::{EngineError, Result};

pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// Ordered label → probability mapping. Serializes as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbabilityDistribution {
    entries: Vec<(String, f64)>,
}

impl ProbabilityDistribution {
    pub fn from_entries(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    /// First label holding the maximal probability.
    pub fn argmax(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (label, p) in &self.entries {
            if best.is_none_or(|(_, bp)| *p > bp) {
                best = Some((label.as_str(), *p));
            }
        }
        best
    }

    /// Pushes floating-point residue into the last bucket.
    pub(crate) fn absorb_residual(&mut self) {
        let residual = 1.0 - self.total();
        if residual.abs() <= DISTRIBUTION_TOLERANCE {
            return;
        }
        let values: Vec<f64> = self.entries.iter().map(|(_, p)| *p).collect();
        if let Some(idx) = residual_target(&values, residual)
            && let Some((_, p)) = self.entries.get_mut(idx)
        {
            *p += residual;
        }
    }
}

impl Serialize for ProbabilityDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, p) in &self.entries {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

pub fn synthetic_label(idx: usize) -> String {
    format!("class_{idx}")
}

/// Model classes aligned to `n` scores: padded with `class_{i}` or truncated.
pub fn model_class_labels(model: &dyn ScorelineModel, n: usize) -> Vec<String> {
    let mut classes: Vec<String> = model
        .classes()
        .map(|c| c.to_vec())
        .unwrap_or_default();
    if classes.len() < n {
        let start = classes.len();
        classes.extend((start..n).map(synthetic_label));
    } else {
        classes.truncate(n);
    }
    classes
}

/// Raw score row and parallel labels for a single feature vector.
pub fn raw_scores(model: &dyn ScorelineModel, features: &[f64]) -> Result<(Vec<f64>, Vec<String>)> {
    let rows = [features.to_vec()];
    match ModelCapability::of(model) {
        Some(ModelCapability::DistributionEmitter(emitter)) => {
            let scores = emitter.predict_proba(&rows)?.into_iter().next().unwrap_or_default();
            if scores.is_empty() {
                return Err(EngineError::ModelInterface(
                    "Model returned no probability values".to_string(),
                ));
            }
            let classes = model_class_labels(model, scores.len());
            Ok((scores, classes))
        }
        Some(ModelCapability::LabelEmitter(emitter)) => {
            let predicted = emitter.predict(&rows)?.into_iter().next().ok_or_else(|| {
                EngineError::ModelInterface("Model returned no prediction".to_string())
            })?;
            let mut classes: Vec<String> = model.classes().map(|c| c.to_vec()).unwrap_or_default();
            if !classes.contains(&predicted) {
                classes.push(predicted.clone());
            }
            let scores = classes
                .iter()
                .map(|c| if *c == predicted { 1.0 } else { 0.0 })
                .collect();
            Ok((scores, classes))
        }
        None => Err(EngineError::ModelInterface(
            "Model must provide predict_proba or predict".to_string(),
        )),
    }
}

/// Numerically stable softmax. A degenerate total yields a uniform vector.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return vec![1.0 / values.len() as f64; values.len()];
    }
    exp.iter().map(|v| v / total).collect()
}

/// Turns raw scores into a distribution that sums to 1.0.
pub fn normalize_scores(raw: &[f64]) -> Result<Vec<f64>> {
    if raw.is_empty() {
        return Err(EngineError::ModelInterface(
            "Model returned no probability values".to_string(),
        ));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::ModelInterface(
            "Model returned non-finite scores".to_string(),
        ));
    }
    if raw.len() == 1 {
        return Ok(vec![1.0]);
    }

    let already_valid = raw.iter().all(|v| *v >= 0.0)
        && (raw.iter().sum::<f64>() - 1.0).abs() <= DISTRIBUTION_TOLERANCE;
    let mut probs = if already_valid {
        raw.to_vec()
    } else {
        softmax(raw)
    };

    let residual = 1.0 - probs.iter().sum::<f64>();
    if let Some(idx) = residual_target(&probs, residual) {
        probs[idx] += residual;
    }
    Ok(probs)
}

/// Index that receives a rounding residual: the last element, unless a
/// negative residual would push it below zero, in which case the first
/// largest element takes it.
fn residual_target(values: &[f64], residual: f64) -> Option<usize> {
    let last = values.len().checked_sub(1)?;
    if values[last] + residual >= 0.0 {
        return Some(last);
    }
    let mut best = 0;
    for (idx, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = idx;
        }
    }
    Some(best)
}
