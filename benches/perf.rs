use std::fs;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;

use scoreline_engine::engine::PredictionEngine;
use scoreline_engine::ensemble::{EnsembleRequest, EnsembleVoter};
use scoreline_engine::model_cache::ModelCache;
use scoreline_engine::normalize::normalize_scores;
use scoreline_engine::rebucket::rebucket;
use scoreline_engine::settings::Settings;

const CONFIG_YAML: &str = "input_features: [home_form, away_form, goal_diff]\n\
scoreline_classes: ['1-0', '0-0', '0-1', '2-1', '1-2']\n";
const REGISTRY_JSON: &str =
    r#"{"models": [{"name": "baseline", "version": "bench", "status": "active", "path": "models/baseline.json"}]}"#;

fn scoreline_labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}-{}", i % 6, i / 6)).collect()
}

fn bench_normalize(c: &mut Criterion) {
    let logits: Vec<f64> = (0..36).map(|i| (i as f64 * 0.37).sin() * 3.0).collect();
    c.bench_function("normalize_scores_36_logits", |b| {
        b.iter(|| normalize_scores(black_box(&logits)))
    });
}

fn bench_rebucket(c: &mut Criterion) {
    let classes = scoreline_labels(36);
    let probs = normalize_scores(&vec![1.0; 36]).unwrap_or_default();
    let preferred: Vec<String> = classes.iter().take(8).cloned().collect();
    c.bench_function("rebucket_36_into_8", |b| {
        b.iter(|| rebucket(black_box(&probs), black_box(&classes), black_box(&preferred)))
    });
}

fn bench_ensemble(c: &mut Criterion) {
    let voter = EnsembleVoter::default();
    let request = EnsembleRequest::default()
        .with_full_time("HOME", 0.8)
        .with_half_time("DRAW", 0.7)
        .with_pattern("AWAY", 0.6);
    c.bench_function("ensemble_vote_three_models", |b| {
        b.iter(|| voter.vote(black_box(&request)))
    });
}

fn bench_engine_predict(c: &mut Criterion) {
    let Ok(tmp) = tempfile::tempdir() else {
        return;
    };
    let base = tmp.path();
    let prepared = fs::create_dir_all(base.join("models"))
        .and_then(|_| fs::write(base.join("model_config.yaml"), CONFIG_YAML))
        .and_then(|_| fs::write(base.join("models/model_registry.json"), REGISTRY_JSON))
        .and_then(|_| {
            fs::write(
                base.join("models/baseline.json"),
                r#"{"kind": "baseline_scoreline"}"#,
            )
        });
    if prepared.is_err() {
        return;
    }

    let settings = Settings::with_base_dir(base);
    let Ok(engine) = PredictionEngine::from_settings(&settings, Arc::new(ModelCache::new())) else {
        return;
    };
    let payload = json!({"home_form": 0.6, "away_form": 0.4, "goal_diff": 1.0});
    c.bench_function("engine_predict_cached_baseline", |b| {
        b.iter(|| engine.predict(black_box(&payload), None))
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_rebucket,
    bench_ensemble,
    bench_engine_predict
);
criterion_main!(benches);
