//! Sequential enrollment of identities.
//!
//! One identity is enrolled at a time. Each capture attempt either yields an
//! accepted descriptor or is discarded; once `faces_per_user` descriptors
//! are accepted the identity is frozen and appended to the store.

use crate::config::EngineParams;
use crate::descriptor::DescriptorExtractor;
use crate::types::{EnrolledIdentity, FaceSample, FeatureVector};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("enrollment of {0:?} is still in progress")]
    InProgress(String),
    #[error("identity {0:?} is already enrolled")]
    DuplicateLabel(String),
    #[error("no enrollment in progress")]
    NotStarted,
    #[error("enrollment of {label:?} incomplete: {accepted}/{target} samples after {attempts} attempts")]
    Incomplete {
        label: String,
        accepted: usize,
        target: usize,
        attempts: u32,
    },
}

/// Why a capture attempt was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Extraction produced no descriptor.
    NoDescriptor,
    /// Descriptor had too few components.
    TooShort(usize),
}

/// Result of one capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Accepted { accepted: usize, target: usize },
    Rejected(RejectReason),
    /// Quota reached; the identity is now frozen in the store.
    Completed(EnrolledIdentity),
}

#[derive(Debug)]
struct Pending {
    label: String,
    samples: Vec<FeatureVector>,
    attempts: u32,
    max_attempts: u32,
}

/// Owner of all enrolled identities, in enrollment order.
#[derive(Debug)]
pub struct EnrollmentStore {
    faces_per_user: usize,
    min_components: usize,
    max_attempts: u32,
    identities: Vec<EnrolledIdentity>,
    pending: Option<Pending>,
}

impl EnrollmentStore {
    pub fn new(params: &EngineParams) -> Self {
        Self {
            faces_per_user: params.faces_per_user.max(1),
            min_components: params.min_feature_components,
            max_attempts: params.max_capture_attempts,
            identities: Vec::new(),
            pending: None,
        }
    }

    pub fn faces_per_user(&self) -> usize {
        self.faces_per_user
    }

    /// Frozen identities, in enrollment order.
    pub fn identities(&self) -> &[EnrolledIdentity] {
        &self.identities
    }

    /// Label currently being enrolled, if any.
    pub fn pending_label(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.label.as_str())
    }

    /// Accepted samples and attempts so far for the pending identity.
    pub fn pending_progress(&self) -> Option<(usize, u32)> {
        self.pending.as_ref().map(|p| (p.samples.len(), p.attempts))
    }

    /// Start enrolling a new identity.
    pub fn begin(&mut self, label: &str) -> Result<(), EnrollmentError> {
        if let Some(pending) = &self.pending {
            return Err(EnrollmentError::InProgress(pending.label.clone()));
        }
        if self.identities.iter().any(|i| i.label() == label) {
            return Err(EnrollmentError::DuplicateLabel(label.to_string()));
        }
        tracing::info!(label, target = self.faces_per_user, "enrollment started");
        self.pending = Some(Pending {
            label: label.to_string(),
            samples: Vec::with_capacity(self.faces_per_user),
            attempts: 0,
            max_attempts: self.max_attempts,
        });
        Ok(())
    }

    /// Record one capture attempt for the pending identity.
    ///
    /// Returns [`EnrollmentError::Incomplete`] once the attempt budget is
    /// spent; the pending identity is kept so the caller can
    /// [`extend_attempts`](Self::extend_attempts) or [`abandon`](Self::abandon).
    pub fn submit(&mut self, vector: Option<FeatureVector>) -> Result<CaptureOutcome, EnrollmentError> {
        let min_components = self.min_components;
        let target = self.faces_per_user;
        let pending = self.pending.as_mut().ok_or(EnrollmentError::NotStarted)?;

        if pending.max_attempts > 0 && pending.attempts >= pending.max_attempts {
            return Err(EnrollmentError::Incomplete {
                label: pending.label.clone(),
                accepted: pending.samples.len(),
                target,
                attempts: pending.attempts,
            });
        }
        pending.attempts += 1;

        let vector = match vector {
            None => {
                tracing::debug!(label = %pending.label, attempt = pending.attempts, "capture rejected: no descriptor");
                return Ok(CaptureOutcome::Rejected(RejectReason::NoDescriptor));
            }
            Some(v) if v.len() <= min_components => {
                tracing::debug!(label = %pending.label, len = v.len(), "capture rejected: descriptor too short");
                return Ok(CaptureOutcome::Rejected(RejectReason::TooShort(v.len())));
            }
            Some(v) => v,
        };

        pending.samples.push(vector);
        let accepted = pending.samples.len();
        tracing::info!(label = %pending.label, accepted, target, "enrollment sample saved");

        if accepted < target {
            return Ok(CaptureOutcome::Accepted { accepted, target });
        }

        let Some(done) = self.pending.take() else {
            return Err(EnrollmentError::NotStarted);
        };
        let identity = EnrolledIdentity::freeze(done.label, done.samples);
        tracing::info!(
            label = identity.label(),
            id = identity.id(),
            samples = identity.samples().len(),
            attempts = done.attempts,
            "enrollment complete"
        );
        self.identities.push(identity.clone());
        Ok(CaptureOutcome::Completed(identity))
    }

    /// Extract a descriptor from `sample` and submit it.
    pub fn offer(
        &mut self,
        sample: &FaceSample,
        extractor: &DescriptorExtractor,
    ) -> Result<CaptureOutcome, EnrollmentError> {
        self.submit(extractor.extract(sample))
    }

    /// Grant the pending identity `extra` more capture attempts.
    pub fn extend_attempts(&mut self, extra: u32) -> Result<(), EnrollmentError> {
        let pending = self.pending.as_mut().ok_or(EnrollmentError::NotStarted)?;
        if pending.max_attempts > 0 {
            pending.max_attempts = pending.max_attempts.saturating_add(extra);
        }
        Ok(())
    }

    /// Drop the pending identity and every sample captured for it.
    pub fn abandon(&mut self) -> Option<String> {
        let pending = self.pending.take()?;
        tracing::warn!(
            label = %pending.label,
            accepted = pending.samples.len(),
            attempts = pending.attempts,
            "enrollment abandoned"
        );
        Some(pending.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(faces: usize, max_attempts: u32) -> EngineParams {
        EngineParams {
            faces_per_user: faces,
            max_capture_attempts: max_attempts,
            ..Default::default()
        }
    }

    fn vector(len: usize) -> Option<FeatureVector> {
        Some(FeatureVector::new(vec![7; len]))
    }

    #[test]
    fn test_quota_freezes_identity() {
        let mut store = EnrollmentStore::new(&params(2, 0));
        store.begin("alice").unwrap();
        assert_eq!(
            store.submit(vector(80)).unwrap(),
            CaptureOutcome::Accepted { accepted: 1, target: 2 }
        );
        let CaptureOutcome::Completed(identity) = store.submit(vector(80)).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(identity.label(), "alice");
        assert_eq!(identity.samples().len(), 2);
        assert_eq!(store.identities().len(), 1);
        assert!(store.pending_label().is_none());
    }

    #[test]
    fn test_rejections_do_not_count() {
        let mut store = EnrollmentStore::new(&params(1, 0));
        store.begin("bob").unwrap();
        assert_eq!(
            store.submit(None).unwrap(),
            CaptureOutcome::Rejected(RejectReason::NoDescriptor)
        );
        assert_eq!(
            store.submit(vector(40)).unwrap(),
            CaptureOutcome::Rejected(RejectReason::TooShort(40))
        );
        assert!(matches!(store.submit(vector(41)).unwrap(), CaptureOutcome::Completed(_)));
    }

    #[test]
    fn test_sequential_only() {
        let mut store = EnrollmentStore::new(&params(1, 0));
        store.begin("alice").unwrap();
        assert_eq!(
            store.begin("bob").unwrap_err(),
            EnrollmentError::InProgress("alice".into())
        );
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut store = EnrollmentStore::new(&params(1, 0));
        store.begin("alice").unwrap();
        store.submit(vector(80)).unwrap();
        assert_eq!(
            store.begin("alice").unwrap_err(),
            EnrollmentError::DuplicateLabel("alice".into())
        );
    }

    #[test]
    fn test_submit_without_begin() {
        let mut store = EnrollmentStore::new(&params(1, 0));
        assert_eq!(store.submit(vector(80)).unwrap_err(), EnrollmentError::NotStarted);
    }

    #[test]
    fn test_attempt_budget_reports_incomplete() {
        let mut store = EnrollmentStore::new(&params(3, 2));
        store.begin("carol").unwrap();
        store.submit(vector(80)).unwrap();
        store.submit(None).unwrap();
        let err = store.submit(vector(80)).unwrap_err();
        assert_eq!(
            err,
            EnrollmentError::Incomplete {
                label: "carol".into(),
                accepted: 1,
                target: 3,
                attempts: 2,
            }
        );

        store.extend_attempts(2).unwrap();
        store.submit(vector(80)).unwrap();
        assert!(matches!(store.submit(vector(80)).unwrap(), CaptureOutcome::Completed(_)));
    }

    #[test]
    fn test_abandon_discards_pending() {
        let mut store = EnrollmentStore::new(&params(3, 0));
        store.begin("dave").unwrap();
        store.submit(vector(80)).unwrap();
        store.submit(None).unwrap();
        assert_eq!(store.pending_progress(), Some((1, 2)));
        assert_eq!(store.abandon().as_deref(), Some("dave"));
        assert_eq!(store.pending_progress(), None);
        assert!(store.identities().is_empty());
        store.begin("dave").unwrap();
    }

    #[test]
    fn test_offer_extracts() {
        let mut store = EnrollmentStore::new(&params(1, 0));
        let extractor = DescriptorExtractor::default();
        store.begin("erin").unwrap();
        let tiny = FaceSample::gray(vec![0; 100], 10, 10);
        assert_eq!(
            store.offer(&tiny, &extractor).unwrap(),
            CaptureOutcome::Rejected(RejectReason::NoDescriptor)
        );
        let face = FaceSample::gray(vec![90; 32 * 32], 32, 32);
        assert!(matches!(store.offer(&face, &extractor).unwrap(), CaptureOutcome::Completed(_)));
    }
}
