use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactLoader, JsonArtifactLoader};
use crate::ensemble::Outcome;
use crate::error::{EngineError, Result};
use crate::features;
use crate::model_cache::{ModelCache, ModelMetadata, RegistrySource};
use crate::model_config::ModelConfig;
use crate::normalize::{self, ProbabilityDistribution};
use crate::prediction_log::{JsonlPredictionLog, PredictionEvent, PredictionSink};
use crate::rebucket;
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub prediction_id: Uuid,
    pub model: ModelMetadata,
    pub ordered_features: Vec<String>,
    pub feature_vector: Vec<f64>,
    pub probabilities: ProbabilityDistribution,
    pub predicted_result: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

/// Validation → cached model → raw scores → normalize → rebucket.
pub struct PredictionEngine {
    config: ModelConfig,
    source: RegistrySource,
    cache: Arc<ModelCache>,
    loader: Arc<dyn ArtifactLoader>,
    sink: Arc<dyn PredictionSink>,
}

impl PredictionEngine {
    pub fn new(
        config: ModelConfig,
        source: RegistrySource,
        cache: Arc<ModelCache>,
        loader: Arc<dyn ArtifactLoader>,
        sink: Arc<dyn PredictionSink>,
    ) -> Self {
        Self {
            config,
            source,
            cache,
            loader,
            sink,
        }
    }

    /// Reads `model_config.yaml`, logs to JSONL, and loads JSON artifacts into `cache`.
    pub fn from_settings(settings: &Settings, cache: Arc<ModelCache>) -> Result<Self> {
        let config = ModelConfig::load(&settings.config_path)?;
        info!(
            features = config.input_features.len(),
            scorelines = config.scoreline_classes.len(),
            config = %settings.config_path.display(),
            "model config loaded"
        );
        Ok(Self::new(
            config,
            RegistrySource::from_settings(settings),
            cache,
            Arc::new(JsonArtifactLoader),
            Arc::new(JsonlPredictionLog::in_dir(&settings.log_dir)),
        ))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn predict(
        &self,
        payload: &Value,
        context: Option<&Map<String, Value>>,
    ) -> Result<PredictionResponse> {
        let Some(payload) = payload.as_object() else {
            return Err(EngineError::Validation(
                "Payload must be a dictionary".to_string(),
            ));
        };

        let required = &self.config.input_features;
        let feature_vector = features::build_feature_vector(payload, required)?;

        let model = self.cache.get_or_load(&self.source, self.loader.as_ref())?;
        let (raw, classes) = normalize::raw_scores(model.artifact.as_ref(), &feature_vector)?;
        let probs = normalize::normalize_scores(&raw)?;
        let preferred = if self.config.scoreline_classes.is_empty() {
            &classes
        } else {
            &self.config.scoreline_classes
        };
        let probabilities = rebucket::rebucket(&probs, &classes, preferred);

        let (predicted_result, confidence) = probabilities
            .argmax()
            .map(|(label, p)| (label.to_string(), p))
            .ok_or_else(|| {
                EngineError::ModelInterface("Model produced an empty distribution".to_string())
            })?;

        let context = context.filter(|c| !c.is_empty()).cloned();
        let response = PredictionResponse {
            prediction_id: Uuid::new_v4(),
            model: model.metadata.clone(),
            ordered_features: required.clone(),
            feature_vector,
            probabilities,
            predicted_result,
            confidence,
            context,
        };

        info!(
            prediction_id = %response.prediction_id,
            predicted_result = %response.predicted_result,
            confidence = response.confidence,
            model = %response.model.name,
            "prediction"
        );
        self.log_prediction(payload, &response);
        Ok(response)
    }

    /// Runs independent predictions in parallel. The model still loads once.
    pub fn predict_batch(&self, payloads: &[Value]) -> Vec<Result<PredictionResponse>> {
        payloads
            .par_iter()
            .map(|payload| self.predict(payload, None))
            .collect()
    }

    fn log_prediction(&self, payload: &Map<String, Value>, response: &PredictionResponse) {
        let empty = Map::new();
        let event = PredictionEvent::new(
            &response.prediction_id.to_string(),
            &response.predicted_result,
            response.confidence,
            payload,
            &response.probabilities,
            response.context.as_ref().unwrap_or(&empty),
        );
        if let Err(err) = self.sink.record(&event) {
            warn!(
                prediction_id = %response.prediction_id,
                error = ?err,
                "failed to log prediction event"
            );
        }
    }
}

/// Collapses `home-away` scoreline labels into a three-way outcome vote.
///
/// Returns the outcome with the most probability mass and that mass, so the
/// result can be fed to the ensemble as a sub-model opinion. Labels that are
/// not scorelines (such as `Other`) are ignored.
pub fn outcome_vote(probabilities: &ProbabilityDistribution) -> Option<(Outcome, f64)> {
    let mut mass = [0.0_f64; 3];
    let mut seen = false;
    for (label, p) in probabilities.entries() {
        let Some((home, away)) = parse_scoreline(label) else {
            continue;
        };
        seen = true;
        let idx = if home > away {
            0
        } else if home == away {
            1
        } else {
            2
        };
        mass[idx] += p;
    }
    if !seen {
        return None;
    }

    let mut best = 0;
    for idx in 1..3 {
        if mass[idx] > mass[best] {
            best = idx;
        }
    }
    Some((Outcome::ALL[best], mass[best].clamp(0.0, 1.0)))
}

fn parse_scoreline(label: &str) -> Option<(u32, u32)> {
    let (h, a) = label.trim().split_once('-')?;
    Some((h.trim().parse().ok()?, a.trim().parse().ok()?))
}
