use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

/// Checks that the payload's key set equals `required` exactly.
pub fn validate_payload(payload: &Map<String, Value>, required: &[String]) -> Result<()> {
    let required_set: HashSet<&str> = required.iter().map(String::as_str).collect();

    let mut missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|f| !payload.contains_key(*f))
        .collect();
    let mut extras: Vec<&str> = payload
        .keys()
        .map(String::as_str)
        .filter(|k| !required_set.contains(k))
        .collect();

    if missing.is_empty() && extras.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    extras.sort_unstable();
    let mut details = Vec::with_capacity(2);
    if !missing.is_empty() {
        details.push(format!("missing features: {}", missing.join(", ")));
    }
    if !extras.is_empty() {
        details.push(format!("unexpected features: {}", extras.join(", ")));
    }
    Err(EngineError::Validation(details.join("; ")))
}

pub fn coerce_numeric(value: &Value, feature: &str) -> Result<f64> {
    match value {
        Value::Bool(_) => Err(EngineError::Validation(format!(
            "Feature '{feature}' cannot be a boolean"
        ))),
        Value::Number(n) => n.as_f64().ok_or_else(|| not_numeric(feature)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(not_numeric(feature));
            }
            s.parse::<f64>().map_err(|_| not_numeric(feature))
        }
        _ => Err(not_numeric(feature)),
    }
}

/// Coerces each required feature in order. Assumes the key set was validated.
pub fn extract_feature_vector(payload: &Map<String, Value>, ordered: &[String]) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(ordered.len());
    for feature in ordered {
        let value = payload.get(feature).ok_or_else(|| {
            EngineError::Validation(format!("missing features: {feature}"))
        })?;
        out.push(coerce_numeric(value, feature)?);
    }
    Ok(out)
}

pub fn build_feature_vector(payload: &Map<String, Value>, ordered: &[String]) -> Result<Vec<f64>> {
    validate_payload(payload, ordered)?;
    extract_feature_vector(payload, ordered)
}

fn not_numeric(feature: &str) -> EngineError {
    EngineError::Validation(format!("Feature '{feature}' must be numeric"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn required() -> Vec<String> {
        ["home_form", "away_form", "goal_diff"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn vector_follows_required_order_not_payload_order() {
        let p = payload(json!({"goal_diff": 3, "away_form": "1.5", "home_form": 0.25}));
        let v = build_feature_vector(&p, &required()).unwrap();
        assert_eq!(v, vec![0.25, 1.5, 3.0]);
    }

    #[test]
    fn mismatch_lists_missing_and_unexpected_sorted() {
        let p = payload(json!({"home_form": 1, "zeta": 1, "alpha": 2}));
        let err = validate_payload(&p, &required()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid payload: missing features: away_form, goal_diff; unexpected features: alpha, zeta"
        );
    }

    #[test]
    fn booleans_are_rejected() {
        let err = coerce_numeric(&json!(true), "home_form").unwrap_err();
        assert!(err.to_string().contains("cannot be a boolean"));
    }

    #[test]
    fn strings_must_parse() {
        assert_eq!(coerce_numeric(&json!(" 2.5 "), "x").unwrap(), 2.5);
        assert!(coerce_numeric(&json!(""), "x").is_err());
        assert!(coerce_numeric(&json!("abc"), "x").is_err());
        assert!(coerce_numeric(&Value::Null, "x").is_err());
        assert!(coerce_numeric(&json!([1]), "x").is_err());
    }

    #[test]
    fn first_bad_feature_in_required_order_is_reported() {
        let p = payload(json!({"home_form": 1, "away_form": "nope", "goal_diff": null}));
        let err = build_feature_vector(&p, &required()).unwrap_err();
        assert!(err.to_string().contains("'away_form'"));
    }
}
