//! facegate-core: face descriptor extraction and access decisions.
//!
//! Turns preprocessed face crops into compact LBP + intensity descriptors,
//! scores them with a blended similarity metric, calibrates thresholds
//! after enrollment, and classifies each probe as authorized, unstable,
//! low-confidence or denied.

pub mod calibration;
pub mod config;
pub mod descriptor;
pub mod enrollment;
pub mod recognizer;
pub mod similarity;
pub mod types;

pub use calibration::{calibrate, Calibrator};
pub use config::{ConfigError, EngineParams};
pub use descriptor::{extract, DescriptorExtractor, ExtractionError};
pub use enrollment::{CaptureOutcome, EnrollmentError, EnrollmentStore, RejectReason};
pub use recognizer::{classify, decide, Recognizer};
pub use similarity::{score, BlendedScorer, Scorer};
pub use types::{
    CalibrationResult, Decision, EnrolledIdentity, FaceSample, FeatureVector, IdentityScore,
    RecognitionVerdict, SimilarityStats, MAX_FEATURE_LEN,
};
