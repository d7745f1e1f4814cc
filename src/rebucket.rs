use std::collections::HashSet;

use crate::normalize::{ProbabilityDistribution, synthetic_label};

pub const OTHER_LABEL: &str = "Other";

/// Maps labels outside `preferred_order` onto [`OTHER_LABEL`], summing collisions.
///
/// Output order: preferred labels that received mass, then `Other`, then any
/// remaining buckets. Rounding drift is folded into the last emitted bucket.
/// With no preferred order the model's own class order is kept.
pub fn rebucket(
    probabilities: &[f64],
    model_classes: &[String],
    preferred_order: &[String],
) -> ProbabilityDistribution {
    let mut classes: Vec<String> = model_classes.to_vec();
    if classes.len() < probabilities.len() {
        let start = classes.len();
        classes.extend((start..probabilities.len()).map(synthetic_label));
    }

    let remap = !preferred_order.is_empty();
    let mut allowed: Vec<String> = if remap {
        preferred_order.to_vec()
    } else {
        classes.clone()
    };
    let allowed_set: HashSet<String> = allowed.iter().cloned().collect();

    // Insertion-ordered buckets; label sets are small so a linear scan is fine.
    let mut bucketed: Vec<(String, f64)> = Vec::new();
    for (label, p) in classes.iter().zip(probabilities) {
        let target = if remap && !allowed_set.contains(label) {
            OTHER_LABEL
        } else {
            label.as_str()
        };
        match bucketed.iter_mut().find(|(l, _)| l == target) {
            Some((_, acc)) => *acc += p,
            None => bucketed.push((target.to_string(), *p)),
        }
    }

    let other_present = bucketed.iter().any(|(l, _)| l == OTHER_LABEL);
    if remap && other_present && !allowed_set.contains(OTHER_LABEL) {
        allowed.push(OTHER_LABEL.to_string());
    }

    let mut ordered: Vec<(String, f64)> = Vec::with_capacity(bucketed.len());
    for label in &allowed {
        if ordered.iter().any(|(l, _)| l == label) {
            continue;
        }
        if let Some((_, p)) = bucketed.iter().find(|(l, _)| l == label) {
            ordered.push((label.clone(), *p));
        }
    }
    for (label, p) in bucketed {
        if !ordered.iter().any(|(l, _)| *l == label) {
            ordered.push((label, p));
        }
    }

    let mut out = ProbabilityDistribution::from_entries(ordered);
    out.absorb_residual();
    out
}
