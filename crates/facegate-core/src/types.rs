use serde::{Deserialize, Serialize};

/// Maximum number of components a descriptor may carry (64 LBP + 16 grid).
pub const MAX_FEATURE_LEN: usize = 80;

/// A cropped, already-detected face region handed over by the vision layer.
///
/// Pixels are stored row-major with channels interleaved, so a 3-channel
/// sample of 32×32 holds 3072 bytes.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl FaceSample {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self { data, width, height, channels }
    }

    /// Single-channel sample from grayscale bytes.
    pub fn gray(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(data, width, height, 1)
    }

    /// Number of bytes the buffer must hold for its declared shape.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Intensity at (x, y). Multi-channel pixels collapse to the unweighted
    /// integer mean of their channels. `None` when out of bounds.
    pub fn intensity(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        let pixel = self.data.get(start..start + c)?;
        if c == 1 {
            return Some(pixel[0]);
        }
        let sum: u32 = pixel.iter().map(|&v| v as u32).sum();
        Some((sum / c as u32) as u8)
    }
}

/// Fixed-length face descriptor, each component in [0, 255].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<u8>,
}

impl FeatureVector {
    pub fn new(values: Vec<u8>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }
}

impl From<Vec<u8>> for FeatureVector {
    fn from(values: Vec<u8>) -> Self {
        Self::new(values)
    }
}

/// An enrolled user: a label plus the descriptors captured during enrollment.
///
/// Built by [`EnrollmentStore`](crate::enrollment::EnrollmentStore) and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrolledIdentity {
    id: String,
    label: String,
    samples: Vec<FeatureVector>,
    enrolled_at: String,
}

impl EnrolledIdentity {
    pub(crate) fn freeze(label: String, samples: Vec<FeatureVector>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label,
            samples,
            enrolled_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build an identity directly from known descriptors (replay, tests).
    pub fn from_samples(label: impl Into<String>, samples: Vec<FeatureVector>) -> Self {
        Self::freeze(label.into(), samples)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }

    pub fn enrolled_at(&self) -> &str {
        &self.enrolled_at
    }
}

/// Pooled intra-identity similarity statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub pairs: usize,
}

/// Operating thresholds fixed once after enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub recognition_threshold: f64,
    pub reject_threshold: f64,
    /// `None` when no identity had two or more samples.
    pub stats: Option<SimilarityStats>,
}

/// Access decision class for a single recognition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Confident, consistent match: grant access.
    Authorized,
    /// High average driven by too few samples: reject as noisy.
    Unstable,
    /// Between the reject and recognition thresholds: possibly a known user.
    LowConfidence,
    /// Below the reject threshold, or nothing enrolled.
    Denied,
}

impl Decision {
    pub fn grants_access(self) -> bool {
        matches!(self, Decision::Authorized)
    }
}

/// Per-identity scoring detail for one probe.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityScore {
    pub label: String,
    pub average: f64,
    pub max: f64,
    pub scores: Vec<f64>,
}

/// Outcome of matching one probe against every enrolled identity.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionVerdict {
    /// Best-matching identity label, `None` if nothing scored above zero.
    pub label: Option<String>,
    pub identity_id: Option<String>,
    /// Best average similarity across identities.
    pub score: f64,
    /// Fraction of the best identity's samples above the reject threshold.
    pub consistency: f64,
    pub decision: Decision,
    /// Scores for every identity, in enrollment order.
    pub candidates: Vec<IdentityScore>,
}
