use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};

pub const CONFLICT_THRESHOLD: f64 = 0.10;

/// Canonical match result. Declaration order is the tie-break priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "home_win")]
    Home,
    #[serde(rename = "draw")]
    Draw,
    #[serde(rename = "away_win")]
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    /// Accepts `HOME`/`home_win`, `DRAW`/`draw`, `AWAY`/`away_win` in any case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HOME" | "HOME_WIN" => Some(Outcome::Home),
            "DRAW" => Some(Outcome::Draw),
            "AWAY" | "AWAY_WIN" => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Outcome::Home => "home_win",
            Outcome::Draw => "draw",
            Outcome::Away => "away_win",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubModel {
    FullTime,
    HalfTime,
    Pattern,
}

impl SubModel {
    pub fn name(self) -> &'static str {
        match self {
            SubModel::FullTime => "full_time",
            SubModel::HalfTime => "half_time",
            SubModel::Pattern => "pattern",
        }
    }

    pub fn weight_key(self) -> &'static str {
        match self {
            SubModel::FullTime => "ft",
            SubModel::HalfTime => "ht",
            SubModel::Pattern => "pt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub ft: f64,
    pub ht: f64,
    pub pt: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            ft: 0.5,
            ht: 0.3,
            pt: 0.2,
        }
    }
}

impl EnsembleWeights {
    pub fn get(&self, source: SubModel) -> f64 {
        match source {
            SubModel::FullTime => self.ft,
            SubModel::HalfTime => self.ht,
            SubModel::Pattern => self.pt,
        }
    }

    fn set(&mut self, source: SubModel, value: f64) {
        match source {
            SubModel::FullTime => self.ft = value,
            SubModel::HalfTime => self.ht = value,
            SubModel::Pattern => self.pt = value,
        }
    }

    /// Builds weights from a `{ft, ht, pt}` map, rejecting missing, extra, or negative keys.
    pub fn from_map(map: &HashMap<String, f64>) -> Result<Self> {
        let required = ["ft", "ht", "pt"];
        let mut extras: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !required.contains(k))
            .collect();
        if !extras.is_empty() {
            extras.sort_unstable();
            return Err(EngineError::EnsembleInput(format!(
                "Invalid weights: unexpected keys {}",
                extras.join(", ")
            )));
        }
        let mut weights = EnsembleWeights {
            ft: 0.0,
            ht: 0.0,
            pt: 0.0,
        };
        for source in [SubModel::FullTime, SubModel::HalfTime, SubModel::Pattern] {
            let key = source.weight_key();
            let Some(w) = map.get(key).copied() else {
                return Err(EngineError::EnsembleInput(
                    "Invalid weights: weights must contain keys ft, ht, pt".to_string(),
                ));
            };
            if !w.is_finite() || w < 0.0 {
                return Err(EngineError::EnsembleInput(format!(
                    "Invalid weights: '{key}' must be a non-negative number, got {w}"
                )));
            }
            weights.set(source, w);
        }
        if !weights.total().is_finite() {
            return Err(EngineError::EnsembleInput(
                "Invalid weights: total weight must be finite".to_string(),
            ));
        }
        Ok(weights)
    }

    pub fn total(&self) -> f64 {
        self.ft + self.ht + self.pt
    }
}

/// Sub-model opinions. A sub-model votes only when both halves are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleRequest {
    #[serde(default)]
    pub full_time_prediction: Option<String>,
    #[serde(default)]
    pub full_time_confidence: Option<f64>,
    #[serde(default)]
    pub half_time_prediction: Option<String>,
    #[serde(default)]
    pub half_time_confidence: Option<f64>,
    #[serde(default)]
    pub pattern_prediction: Option<String>,
    #[serde(default)]
    pub pattern_confidence: Option<f64>,
}

impl EnsembleRequest {
    pub fn with_full_time(mut self, prediction: &str, confidence: f64) -> Self {
        self.full_time_prediction = Some(prediction.to_string());
        self.full_time_confidence = Some(confidence);
        self
    }

    pub fn with_half_time(mut self, prediction: &str, confidence: f64) -> Self {
        self.half_time_prediction = Some(prediction.to_string());
        self.half_time_confidence = Some(confidence);
        self
    }

    pub fn with_pattern(mut self, prediction: &str, confidence: f64) -> Self {
        self.pattern_prediction = Some(prediction.to_string());
        self.pattern_confidence = Some(confidence);
        self
    }

    fn active_votes(&self) -> Vec<(SubModel, &str, f64)> {
        let pairs = [
            (
                SubModel::FullTime,
                self.full_time_prediction.as_deref(),
                self.full_time_confidence,
            ),
            (
                SubModel::HalfTime,
                self.half_time_prediction.as_deref(),
                self.half_time_confidence,
            ),
            (
                SubModel::Pattern,
                self.pattern_prediction.as_deref(),
                self.pattern_confidence,
            ),
        ];
        pairs
            .into_iter()
            .filter_map(|(source, p, c)| Some((source, p?, c?)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub prediction: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeScores {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OutcomeScores {
    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    fn add(&mut self, outcome: Outcome, v: f64) {
        match outcome {
            Outcome::Home => self.home += v,
            Outcome::Draw => self.draw += v,
            Outcome::Away => self.away += v,
        }
    }

    pub fn total(&self) -> f64 {
        self.home + self.draw + self.away
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub weights_used: EnsembleWeights,
    pub votes: BTreeMap<String, Vote>,
    pub scores: OutcomeScores,
    pub winner: Outcome,
    pub final_confidence: f64,
    pub conflict_detected: bool,
    pub conflict_margin: f64,
}

/// Weighted three-way vote over full-time, half-time, and pattern sub-models.
#[derive(Debug, Clone, Default)]
pub struct EnsembleVoter {
    weights: EnsembleWeights,
}

impl EnsembleVoter {
    pub fn new(weights: EnsembleWeights) -> Result<Self> {
        let mut map = HashMap::new();
        map.insert("ft".to_string(), weights.ft);
        map.insert("ht".to_string(), weights.ht);
        map.insert("pt".to_string(), weights.pt);
        let weights = EnsembleWeights::from_map(&map)?;
        warn_if_unnormalized(&weights);
        Ok(Self { weights })
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Replaces the weights only if the candidate validates.
    pub fn update_weights(&mut self, candidate: &HashMap<String, f64>) -> Result<()> {
        let next = EnsembleWeights::from_map(candidate)?;
        warn_if_unnormalized(&next);
        info!(from = ?self.weights, to = ?next, "ensemble weights updated");
        self.weights = next;
        Ok(())
    }

    pub fn vote(&self, request: &EnsembleRequest) -> Result<EnsembleResult> {
        let active = request.active_votes();
        if active.is_empty() {
            return Err(EngineError::EnsembleInput(
                "At least one model prediction must be provided".to_string(),
            ));
        }

        let mut normalized = Vec::with_capacity(active.len());
        for (source, prediction, confidence) in &active {
            if !(0.0..=1.0).contains(confidence) {
                return Err(EngineError::EnsembleInput(format!(
                    "{} confidence must be in range [0, 1], got {confidence}",
                    source.name()
                )));
            }
            let outcome = Outcome::parse(prediction).ok_or_else(|| {
                EngineError::EnsembleInput(format!("Invalid outcome: {prediction}"))
            })?;
            normalized.push((*source, *prediction, *confidence, outcome));
        }

        let mass: f64 = active.iter().map(|(s, _, _)| self.weights.get(*s)).sum();
        if mass <= 0.0 {
            return Err(EngineError::EnsembleInput(
                "Total weight of active models is zero".to_string(),
            ));
        }
        if !mass.is_finite() {
            return Err(EngineError::EnsembleInput(
                "Total weight of active models is not finite".to_string(),
            ));
        }

        let mut weights_used = EnsembleWeights {
            ft: 0.0,
            ht: 0.0,
            pt: 0.0,
        };
        let mut scores = OutcomeScores::default();
        let mut votes = BTreeMap::new();
        for (source, prediction, confidence, outcome) in normalized {
            let w = self.weights.get(source) / mass;
            weights_used.set(source, w);
            scores.add(outcome, confidence * w);
            votes.insert(
                source.name().to_string(),
                Vote {
                    prediction: prediction.to_string(),
                    confidence,
                },
            );
        }

        let winner = pick_winner(&scores);
        let mut ranked: Vec<f64> = Outcome::ALL.iter().map(|o| scores.get(*o)).collect();
        ranked.sort_by(|a, b| b.total_cmp(a));
        let second = ranked.get(1).copied().unwrap_or(0.0);

        let final_confidence = round4(scores.get(winner));
        let conflict_margin = round4(ranked[0] - second);
        let conflict_detected = conflict_margin < CONFLICT_THRESHOLD;

        info!(
            winner = winner.as_label(),
            final_confidence,
            conflict_margin,
            conflict_detected,
            active = votes.len(),
            "ensemble vote"
        );

        Ok(EnsembleResult {
            weights_used,
            votes,
            scores,
            winner,
            final_confidence,
            conflict_detected,
            conflict_margin,
        })
    }
}

/// Highest score wins; exact ties go to the earlier outcome in [`Outcome::ALL`].
fn pick_winner(scores: &OutcomeScores) -> Outcome {
    let mut best = Outcome::Home;
    for outcome in Outcome::ALL {
        if scores.get(outcome) > scores.get(best) {
            best = outcome;
        }
    }
    best
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn warn_if_unnormalized(weights: &EnsembleWeights) {
    let total = weights.total();
    if !(0.99..=1.01).contains(&total) {
        warn!(total, "ensemble weights do not sum to 1.0; normalizing per vote");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reference_vote() {
        let voter = EnsembleVoter::default();
        let req = EnsembleRequest::default()
            .with_full_time("home_win", 0.80)
            .with_half_time("draw", 0.70)
            .with_pattern("home_win", 0.60);
        let r = voter.vote(&req).unwrap();
        assert!(close(r.scores.home, 0.52));
        assert!(close(r.scores.draw, 0.21));
        assert!(close(r.scores.away, 0.0));
        assert_eq!(r.winner, Outcome::Home);
        assert!(close(r.conflict_margin, 0.31));
        assert!(!r.conflict_detected);
        assert!(close(r.final_confidence, 0.52));
    }

    #[test]
    fn missing_submodel_weight_is_redistributed() {
        let voter = EnsembleVoter::default();
        let req = EnsembleRequest::default()
            .with_full_time("HOME", 0.9)
            .with_pattern("AWAY", 0.9);
        let r = voter.vote(&req).unwrap();
        assert!(close(r.weights_used.ft, 0.5 / 0.7));
        assert!(close(r.weights_used.pt, 0.2 / 0.7));
        assert_eq!(r.weights_used.ht, 0.0);
        assert!(close(r.weights_used.total(), 1.0));
    }

    #[test]
    fn half_supplied_submodel_is_ignored() {
        let voter = EnsembleVoter::default();
        let req = EnsembleRequest {
            half_time_prediction: Some("draw".into()),
            ..EnsembleRequest::default().with_full_time("away_win", 0.4)
        };
        let r = voter.vote(&req).unwrap();
        assert_eq!(r.weights_used.ft, 1.0);
        assert_eq!(r.winner, Outcome::Away);
        assert!(close(r.final_confidence, 0.4));
        assert!(!r.votes.contains_key("half_time"));
    }

    #[test]
    fn exact_tie_goes_to_home_then_draw() {
        let mut voter = EnsembleVoter::default();
        let even: HashMap<String, f64> =
            [("ft", 0.5), ("ht", 0.5), ("pt", 0.0)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect();
        voter.update_weights(&even).unwrap();

        let r = voter
            .vote(
                &EnsembleRequest::default()
                    .with_full_time("away_win", 0.6)
                    .with_half_time("draw", 0.6),
            )
            .unwrap();
        assert_eq!(r.winner, Outcome::Draw);
        assert!(r.conflict_detected);
        assert_eq!(r.conflict_margin, 0.0);
    }

    #[test]
    fn input_errors() {
        let voter = EnsembleVoter::default();
        let cases = [
            EnsembleRequest::default(),
            EnsembleRequest::default().with_full_time("home_win", 1.2),
            EnsembleRequest::default().with_full_time("home_win", f64::NAN),
            EnsembleRequest::default().with_half_time("win", 0.5),
        ];
        for req in cases {
            let err = voter.vote(&req).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EnsembleInput);
        }
    }

    #[test]
    fn zero_active_mass_is_rejected() {
        let voter = EnsembleVoter::new(EnsembleWeights {
            ft: 1.0,
            ht: 0.0,
            pt: 0.0,
        })
        .unwrap();
        let err = voter
            .vote(&EnsembleRequest::default().with_pattern("draw", 0.5))
            .unwrap_err();
        assert!(err.to_string().contains("zero"));
    }

    #[test]
    fn invalid_weight_update_keeps_previous() {
        let mut voter = EnsembleVoter::default();
        let bad: HashMap<String, f64> = [("ft", 0.5), ("ht", -0.1), ("pt", 0.6)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        assert!(voter.update_weights(&bad).is_err());
        assert_eq!(voter.weights(), EnsembleWeights::default());

        let mut missing = bad.clone();
        missing.remove("ht");
        assert!(voter.update_weights(&missing).is_err());

        let mut extra: HashMap<String, f64> = [("ft", 0.5), ("ht", 0.3), ("pt", 0.2)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        extra.insert("xx".into(), 0.1);
        assert!(voter.update_weights(&extra).is_err());
        assert_eq!(voter.weights(), EnsembleWeights::default());
    }

    #[test]
    fn overflowing_weight_total_is_rejected() {
        let huge: HashMap<String, f64> = [("ft", 1e308), ("ht", 1e308), ("pt", 0.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let mut voter = EnsembleVoter::default();
        let err = voter.update_weights(&huge).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnsembleInput);
        assert_eq!(voter.weights(), EnsembleWeights::default());

        let err = EnsembleVoter::new(EnsembleWeights {
            ft: f64::MAX,
            ht: f64::MAX,
            pt: 0.0,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnsembleInput);
    }

    #[test]
    fn large_finite_weights_still_renormalize() {
        let voter = EnsembleVoter::new(EnsembleWeights {
            ft: 1e300,
            ht: 1e300,
            pt: 0.0,
        })
        .unwrap();
        let r = voter
            .vote(
                &EnsembleRequest::default()
                    .with_full_time("away_win", 0.9)
                    .with_half_time("away_win", 0.9),
            )
            .unwrap();
        assert_eq!(r.winner, Outcome::Away);
        assert!(close(r.weights_used.total(), 1.0));
        assert!(close(r.final_confidence, 0.9));
    }

    #[test]
    fn outcome_labels_round_trip_through_serde() {
        assert_eq!(serde_json::to_string(&Outcome::Away).unwrap(), "\"away_win\"");
        assert_eq!(Outcome::parse(" Home_Win "), Some(Outcome::Home));
        assert_eq!(Outcome::parse("x"), None);
    }
}
