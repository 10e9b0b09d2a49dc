//! Blended descriptor similarity.
//!
//! Three agreement measures are mixed and then damped with a square root,
//! which lifts mid-range scores toward 1:
//!
//! ```text
//! euclidean   = max(0, 1 - (‖a-b‖₂ / √n) / 40)
//! manhattan   = max(0, 1 - (‖a-b‖₁ / n) / 60)
//! correlation = (pearson(a, b) + 1) / 2
//! score       = √(0.4·euclidean + 0.3·manhattan + 0.3·correlation)
//! ```

use crate::types::FeatureVector;

const EUCLIDEAN_SCALE: f64 = 40.0;
const MANHATTAN_SCALE: f64 = 60.0;
const EUCLIDEAN_WEIGHT: f64 = 0.4;
const MANHATTAN_WEIGHT: f64 = 0.3;
const CORRELATION_WEIGHT: f64 = 0.3;

/// Strategy for scoring two descriptors. Implementations must return a
/// value in [0, 1] and never fail.
pub trait Scorer {
    fn score(&self, a: &FeatureVector, b: &FeatureVector) -> f64;
}

/// Default scorer: weighted Euclidean/Manhattan/Pearson blend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendedScorer;

impl Scorer for BlendedScorer {
    fn score(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        score(a, b)
    }
}

/// Similarity in [0, 1]. Zero for empty or mismatched descriptors.
pub fn score(a: &FeatureVector, b: &FeatureVector) -> f64 {
    score_slices(a.as_slice(), b.as_slice())
}

fn score_slices(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let n = a.len() as f64;

    let mut squared = 0.0f64;
    let mut absolute = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let d = x as f64 - y as f64;
        squared += d * d;
        absolute += d.abs();
    }

    let euclidean = squared.sqrt() / n.sqrt();
    let manhattan = absolute / n;

    let euclidean_sim = (1.0 - euclidean / EUCLIDEAN_SCALE).max(0.0);
    let manhattan_sim = (1.0 - manhattan / MANHATTAN_SCALE).max(0.0);
    let correlation_sim = (pearson(a, b) + 1.0) / 2.0;

    let blend = euclidean_sim * EUCLIDEAN_WEIGHT
        + manhattan_sim * MANHATTAN_WEIGHT
        + correlation_sim * CORRELATION_WEIGHT;

    let damped = blend.sqrt();
    if damped.is_finite() {
        damped.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Pearson correlation, 0 when either side has zero variance.
fn pearson(a: &[u8], b: &[u8]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a > 0.0 && var_b > 0.0 {
        cov / (var_a * var_b).sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: Vec<u8>) -> FeatureVector {
        FeatureVector::new(values)
    }

    fn ramp(len: usize, offset: u8) -> FeatureVector {
        fv((0..len).map(|i| (i as u8).wrapping_mul(3).wrapping_add(offset)).collect())
    }

    #[test]
    fn test_self_similarity_saturates() {
        let a = ramp(80, 10);
        assert!((score(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_self_similarity_loses_correlation_term() {
        // Zero variance: correlation contributes (0 + 1) / 2.
        let a = fv(vec![100; 80]);
        let expected = (0.4 + 0.3 + 0.3 * 0.5f64).sqrt();
        assert!((score(&a, &a) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric() {
        let a = ramp(80, 0);
        let b = fv((0..80).map(|i| ((i * 37) % 251) as u8).collect());
        assert_eq!(score(&a, &b), score(&b, &a));
    }

    #[test]
    fn test_bounds() {
        let pairs = [
            (fv(vec![0; 80]), fv(vec![255; 80])),
            (ramp(80, 0), fv((0..80).map(|i| 255 - (i as u8) * 3).collect())),
            (ramp(16, 5), ramp(16, 9)),
        ];
        for (a, b) in &pairs {
            let s = score(a, b);
            assert!((0.0..=1.0).contains(&s), "score {s} out of bounds");
        }
    }

    #[test]
    fn test_mismatch_guard() {
        assert_eq!(score(&ramp(80, 0), &ramp(79, 0)), 0.0);
        assert_eq!(score(&fv(vec![]), &fv(vec![])), 0.0);
        assert_eq!(score(&fv(vec![]), &ramp(4, 0)), 0.0);
    }

    #[test]
    fn test_known_value_constant_offset() {
        // Distance 3 on every component, both sides constant:
        // 0.4·(1 - 3/40) + 0.3·(1 - 3/60) + 0.3·0.5 = 0.805
        let a = fv(vec![100; 80]);
        let b = fv(vec![103; 80]);
        assert!((score(&a, &b) - 0.805f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_far_apart_floors_distance_terms() {
        // Euclidean and Manhattan floor at zero; correlation alone remains.
        let a = fv(vec![0; 80]);
        let b = fv(vec![255; 80]);
        assert!((score(&a, &b) - 0.15f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_anticorrelated_scores_lower() {
        let a = ramp(60, 0);
        let same_shape = ramp(60, 4);
        let flipped = fv(a.values.iter().rev().copied().collect());
        assert!(score(&a, &same_shape) > score(&a, &flipped));
    }

    #[test]
    fn test_blended_scorer_matches_function() {
        let a = ramp(80, 1);
        let b = ramp(80, 2);
        assert_eq!(BlendedScorer.score(&a, &b), score(&a, &b));
    }
}
