//! One-shot threshold calibration after enrollment.
//!
//! Pairwise similarities are computed within each identity only, pooled,
//! and summarised. The operating thresholds themselves are configured
//! points; the statistics are reported for diagnostics.

use crate::config::{EngineParams, DEFAULT_RECOGNITION_THRESHOLD, DEFAULT_REJECT_THRESHOLD};
use crate::similarity::{BlendedScorer, Scorer};
use crate::types::{CalibrationResult, EnrolledIdentity, SimilarityStats};

#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    recognition_threshold: f64,
    reject_threshold: f64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            recognition_threshold: DEFAULT_RECOGNITION_THRESHOLD,
            reject_threshold: DEFAULT_REJECT_THRESHOLD,
        }
    }
}

impl Calibrator {
    pub fn from_params(params: &EngineParams) -> Self {
        Self {
            recognition_threshold: params.recognition_threshold,
            reject_threshold: params.reject_threshold,
        }
    }

    pub fn calibrate<S: Scorer>(&self, identities: &[EnrolledIdentity], scorer: &S) -> CalibrationResult {
        let mut pooled = Vec::new();

        for identity in identities {
            let samples = identity.samples();
            let mut scores = Vec::new();
            for i in 0..samples.len() {
                for j in (i + 1)..samples.len() {
                    scores.push(scorer.score(&samples[i], &samples[j]));
                }
            }
            if let Some(stats) = summarize(&scores) {
                tracing::info!(
                    label = identity.label(),
                    mean = stats.mean,
                    min = stats.min,
                    max = stats.max,
                    "intra-identity similarity"
                );
            }
            pooled.extend(scores);
        }

        let stats = summarize(&pooled);
        match &stats {
            Some(s) => tracing::info!(
                mean = s.mean,
                min = s.min,
                std_dev = s.std_dev,
                pairs = s.pairs,
                recognition = self.recognition_threshold,
                reject = self.reject_threshold,
                "calibration baseline"
            ),
            None => tracing::warn!(
                identities = identities.len(),
                recognition = self.recognition_threshold,
                reject = self.reject_threshold,
                "no identity has two samples; using default thresholds"
            ),
        }

        CalibrationResult {
            recognition_threshold: self.recognition_threshold,
            reject_threshold: self.reject_threshold,
            stats,
        }
    }
}

/// Calibrate with default thresholds and the blended scorer.
pub fn calibrate(identities: &[EnrolledIdentity]) -> CalibrationResult {
    Calibrator::default().calibrate(identities, &BlendedScorer)
}

fn summarize(scores: &[f64]) -> Option<SimilarityStats> {
    if scores.is_empty() {
        return None;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some(SimilarityStats {
        mean,
        min,
        max,
        std_dev: variance.sqrt(),
        pairs: scores.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureVector;

    fn identity(label: &str, samples: &[&[u8]]) -> EnrolledIdentity {
        EnrolledIdentity::from_samples(
            label,
            samples.iter().map(|s| FeatureVector::new(s.to_vec())).collect(),
        )
    }

    /// Scores every pair by the first component difference, so statistics are
    /// easy to predict.
    struct FirstComponent;

    impl Scorer for FirstComponent {
        fn score(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
            1.0 - (a.values[0] as f64 - b.values[0] as f64).abs() / 100.0
        }
    }

    #[test]
    fn test_fallback_without_pairs() {
        let identities = vec![identity("a", &[&[1, 2, 3]]), identity("b", &[])];
        let result = calibrate(&identities);
        assert_eq!(result.recognition_threshold, 0.9);
        assert_eq!(result.reject_threshold, 0.89);
        assert!(result.stats.is_none());
    }

    #[test]
    fn test_fallback_with_no_identities() {
        let result = calibrate(&[]);
        assert_eq!(result.recognition_threshold, 0.9);
        assert_eq!(result.reject_threshold, 0.89);
        assert!(result.stats.is_none());
    }

    #[test]
    fn test_intra_identity_pairs_only() {
        // a: pairs (0,10)=0.9, (0,20)=0.8, (10,20)=0.9 ; b: (50,50)=1.0
        // Cross-identity pairs would pull the minimum well below 0.8.
        let identities = vec![
            identity("a", &[&[0], &[10], &[20]]),
            identity("b", &[&[50], &[50]]),
        ];
        let stats = Calibrator::default()
            .calibrate(&identities, &FirstComponent)
            .stats
            .unwrap();
        assert_eq!(stats.pairs, 4);
        assert!((stats.mean - 0.9).abs() < 1e-12);
        assert!((stats.min - 0.8).abs() < 1e-12);
        assert!((stats.max - 1.0).abs() < 1e-12);
        // Population deviation of [0.9, 0.8, 0.9, 1.0]
        assert!((stats.std_dev - 0.005f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_thresholds_follow_params() {
        let params = EngineParams {
            recognition_threshold: 0.8,
            reject_threshold: 0.7,
            ..Default::default()
        };
        let result = Calibrator::from_params(&params)
            .calibrate(&[identity("a", &[&[1], &[2]])], &FirstComponent);
        assert_eq!(result.recognition_threshold, 0.8);
        assert_eq!(result.reject_threshold, 0.7);
        assert!(result.stats.is_some());
    }
}
