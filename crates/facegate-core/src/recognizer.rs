//! Recognition decision engine.
//!
//! Scores a probe descriptor against every enrolled identity, picks the
//! identity with the best average score, and turns that score plus a
//! consistency check into an access [`Decision`]. Stateless per call.

use crate::config::{EngineParams, DEFAULT_MIN_CONSISTENCY};
use crate::similarity::{BlendedScorer, Scorer};
use crate::types::{
    CalibrationResult, Decision, EnrolledIdentity, FeatureVector, IdentityScore, RecognitionVerdict,
};

/// Decision engine over a pluggable [`Scorer`].
#[derive(Debug, Clone)]
pub struct Recognizer<S = BlendedScorer> {
    scorer: S,
    min_consistency: f64,
}

impl Default for Recognizer<BlendedScorer> {
    fn default() -> Self {
        Self::new(BlendedScorer, DEFAULT_MIN_CONSISTENCY)
    }
}

impl Recognizer<BlendedScorer> {
    pub fn from_params(params: &EngineParams) -> Self {
        Self::new(BlendedScorer, params.min_consistency)
    }
}

impl<S: Scorer> Recognizer<S> {
    pub fn new(scorer: S, min_consistency: f64) -> Self {
        Self { scorer, min_consistency }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Match `probe` against `identities` and classify the best match.
    pub fn decide(
        &self,
        probe: &FeatureVector,
        identities: &[EnrolledIdentity],
        calibration: &CalibrationResult,
    ) -> RecognitionVerdict {
        let mut candidates = Vec::with_capacity(identities.len());
        let mut best: Option<usize> = None;
        let mut best_score = 0.0f64;

        for identity in identities {
            let scores: Vec<f64> = identity
                .samples()
                .iter()
                .map(|sample| self.scorer.score(probe, sample))
                .collect();
            if scores.is_empty() {
                continue;
            }
            let average = scores.iter().sum::<f64>() / scores.len() as f64;
            let max = scores.iter().copied().fold(0.0, f64::max);

            tracing::debug!(label = identity.label(), average, max, "identity scored");

            // Strict comparison: ties keep the earliest enrolled identity.
            if average > best_score {
                best_score = average;
                best = Some(candidates.len());
            }
            candidates.push((identity, IdentityScore {
                label: identity.label().to_string(),
                average,
                max,
                scores,
            }));
        }

        let (label, identity_id, consistency) = match best {
            Some(idx) => {
                let (identity, detail) = &candidates[idx];
                let above = detail
                    .scores
                    .iter()
                    .filter(|&&s| s > calibration.reject_threshold)
                    .count();
                (
                    Some(identity.label().to_string()),
                    Some(identity.id().to_string()),
                    above as f64 / detail.scores.len() as f64,
                )
            }
            None => (None, None, 0.0),
        };

        let decision = classify(best_score, consistency, calibration, self.min_consistency);

        match decision {
            Decision::Authorized => tracing::info!(
                label = label.as_deref(),
                score = best_score,
                consistency,
                "access authorized"
            ),
            Decision::Unstable => tracing::warn!(
                label = label.as_deref(),
                score = best_score,
                consistency,
                "match unstable, access denied"
            ),
            Decision::LowConfidence => tracing::warn!(
                label = label.as_deref(),
                score = best_score,
                "possible known user, confidence too low"
            ),
            Decision::Denied => tracing::info!(
                label = label.as_deref(),
                score = best_score,
                "no enrolled identity matched"
            ),
        }

        RecognitionVerdict {
            label,
            identity_id,
            score: best_score,
            consistency,
            decision,
            candidates: candidates.into_iter().map(|(_, detail)| detail).collect(),
        }
    }
}

/// Map a best score and consistency ratio to a decision class.
///
/// Checked in order: authorized, unstable, low confidence, denied.
pub fn classify(
    score: f64,
    consistency: f64,
    calibration: &CalibrationResult,
    min_consistency: f64,
) -> Decision {
    if score >= calibration.recognition_threshold {
        if consistency >= min_consistency {
            Decision::Authorized
        } else {
            Decision::Unstable
        }
    } else if score >= calibration.reject_threshold {
        Decision::LowConfidence
    } else {
        Decision::Denied
    }
}

/// Decide with the default scorer and consistency floor.
pub fn decide(
    probe: &FeatureVector,
    identities: &[EnrolledIdentity],
    calibration: &CalibrationResult,
) -> RecognitionVerdict {
    Recognizer::default().decide(probe, identities, calibration)
}
