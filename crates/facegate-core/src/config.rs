//! Engine parameters.
//!
//! Every knob has a default matching the reference device; a TOML file
//! may override any subset of them.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_FACES_PER_USER: usize = 6;
pub const DEFAULT_MIN_FEATURE_COMPONENTS: usize = 40;
pub const DEFAULT_MAX_CAPTURE_ATTEMPTS: u32 = 180;
pub const DEFAULT_LBP_RADIUS: u32 = 1;
pub const DEFAULT_LBP_NEIGHBORS: u32 = 8;
pub const DEFAULT_GRID_SIZE: u32 = 6;
pub const DEFAULT_RECOGNITION_THRESHOLD: f64 = 0.9;
pub const DEFAULT_REJECT_THRESHOLD: f64 = 0.89;
pub const DEFAULT_MIN_CONSISTENCY: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid engine parameters: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineParams {
    /// Accepted samples required before an identity is frozen.
    pub faces_per_user: usize,
    /// A capture is accepted only with strictly more components than this.
    pub min_feature_components: usize,
    /// Capture attempts allowed per identity before enrollment is reported
    /// incomplete. Zero disables the bound.
    pub max_capture_attempts: u32,
    pub lbp_radius: u32,
    pub lbp_neighbors: u32,
    pub grid_size: u32,
    pub recognition_threshold: f64,
    pub reject_threshold: f64,
    /// Minimum consistency ratio for an authorized decision.
    pub min_consistency: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            faces_per_user: DEFAULT_FACES_PER_USER,
            min_feature_components: DEFAULT_MIN_FEATURE_COMPONENTS,
            max_capture_attempts: DEFAULT_MAX_CAPTURE_ATTEMPTS,
            lbp_radius: DEFAULT_LBP_RADIUS,
            lbp_neighbors: DEFAULT_LBP_NEIGHBORS,
            grid_size: DEFAULT_GRID_SIZE,
            recognition_threshold: DEFAULT_RECOGNITION_THRESHOLD,
            reject_threshold: DEFAULT_REJECT_THRESHOLD,
            min_consistency: DEFAULT_MIN_CONSISTENCY,
        }
    }
}

impl EngineParams {
    /// Parse and validate parameters from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let params: EngineParams = toml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    /// Load and validate parameters from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let params = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), ?params, "loaded engine parameters");
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.faces_per_user == 0 {
            return Err(out_of_range("faces_per_user", "must be at least 1".into()));
        }
        if self.lbp_radius == 0 {
            return Err(out_of_range("lbp_radius", "must be at least 1".into()));
        }
        if !(1..=8).contains(&self.lbp_neighbors) {
            return Err(out_of_range(
                "lbp_neighbors",
                format!("must be between 1 and 8, got {}", self.lbp_neighbors),
            ));
        }
        if self.grid_size == 0 {
            return Err(out_of_range("grid_size", "must be at least 1".into()));
        }
        for (field, value) in [
            ("recognition_threshold", self.recognition_threshold),
            ("reject_threshold", self.reject_threshold),
            ("min_consistency", self.min_consistency),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(out_of_range(field, format!("must be within [0, 1], got {value}")));
            }
        }
        if self.reject_threshold > self.recognition_threshold {
            return Err(out_of_range(
                "reject_threshold",
                format!(
                    "{} exceeds recognition_threshold {}",
                    self.reject_threshold, self.recognition_threshold
                ),
            ));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, reason: String) -> ConfigError {
    ConfigError::OutOfRange { field, reason }
}
