//! Face descriptor extraction.
//!
//! A descriptor is the concatenation of two parts:
//!
//! 1. Circular LBP histograms over four overlapping face regions (eyes,
//!    nose, mouth), reduced to 16 selected codes per region: 64 components.
//! 2. Mean intensity over a coarse grid of cells, sampled with stride 2,
//!    filling the remaining components up to [`MAX_FEATURE_LEN`].
//!
//! Both parts are integers in [0, 255], so descriptors from samples of any
//! size compare component by component.

use crate::config::EngineParams;
use crate::types::{FaceSample, FeatureVector, MAX_FEATURE_LEN};
use thiserror::Error;

/// Smallest accepted sample edge, in pixels.
pub const MIN_SAMPLE_DIM: u32 = 24;

/// LBP codes reported per region: uniform codes first, then representative
/// non-uniform ones, cut to 16 entries.
const SELECTED_PATTERNS: [usize; 16] = [0, 1, 3, 7, 15, 31, 63, 127, 255, 2, 4, 6, 8, 12, 14, 16];

const HISTOGRAM_BINS: usize = 256;
/// Approximate number of LBP samples taken along a region row.
const SAMPLES_PER_REGION_ROW: i64 = 12;
const GRID_STRIDE: usize = 2;
const EMPTY_CELL_INTENSITY: u8 = 128;

/// Fractional bounding box `(x_start, y_start, x_end, y_end)`.
#[derive(Debug, Clone, Copy)]
struct Region {
    name: &'static str,
    bounds: (f64, f64, f64, f64),
}

const REGIONS: [Region; 4] = [
    Region { name: "upper_left", bounds: (0.1, 0.1, 0.5, 0.5) },
    Region { name: "upper_right", bounds: (0.5, 0.1, 0.9, 0.5) },
    Region { name: "center", bounds: (0.2, 0.3, 0.8, 0.7) },
    Region { name: "lower", bounds: (0.2, 0.6, 0.8, 0.95) },
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("sample {width}x{height} is below the 24x24 minimum")]
    Undersized { width: u32, height: u32 },
    #[error("sample buffer holds {actual} bytes, expected {expected}")]
    Malformed { expected: usize, actual: usize },
    #[error("sample has zero channels")]
    NoChannels,
}

/// LBP + grid-intensity descriptor extractor.
#[derive(Debug, Clone)]
pub struct DescriptorExtractor {
    radius: i64,
    grid_size: i64,
    /// Neighbour offsets, bit `i` of the code comes from `offsets[i]`.
    offsets: Vec<(i64, i64)>,
}

impl Default for DescriptorExtractor {
    fn default() -> Self {
        Self::from_params(&EngineParams::default())
    }
}

impl DescriptorExtractor {
    pub fn new(radius: u32, neighbors: u32, grid_size: u32) -> Self {
        Self {
            radius: radius as i64,
            grid_size: grid_size.max(1) as i64,
            offsets: neighbor_offsets(radius, neighbors.min(8)),
        }
    }

    pub fn from_params(params: &EngineParams) -> Self {
        Self::new(params.lbp_radius, params.lbp_neighbors, params.grid_size)
    }

    /// Extract a descriptor, or `None` if the sample is unusable.
    pub fn extract(&self, sample: &FaceSample) -> Option<FeatureVector> {
        match self.try_extract(sample) {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::debug!(error = %e, "descriptor extraction failed");
                None
            }
        }
    }

    /// Extract a descriptor, reporting why a sample was rejected.
    pub fn try_extract(&self, sample: &FaceSample) -> Result<FeatureVector, ExtractionError> {
        if sample.width < MIN_SAMPLE_DIM || sample.height < MIN_SAMPLE_DIM {
            return Err(ExtractionError::Undersized {
                width: sample.width,
                height: sample.height,
            });
        }
        if sample.channels == 0 {
            return Err(ExtractionError::NoChannels);
        }
        if sample.data.len() != sample.expected_len() {
            return Err(ExtractionError::Malformed {
                expected: sample.expected_len(),
                actual: sample.data.len(),
            });
        }

        let mut values = Vec::with_capacity(MAX_FEATURE_LEN);
        for region in &REGIONS {
            values.extend(self.region_features(sample, region));
        }
        let remaining = MAX_FEATURE_LEN.saturating_sub(values.len());
        values.extend(self.grid_intensity(sample).take(remaining));
        values.truncate(MAX_FEATURE_LEN);

        tracing::trace!(
            width = sample.width,
            height = sample.height,
            len = values.len(),
            "extracted descriptor"
        );
        Ok(FeatureVector::new(values))
    }

    /// LBP code at (x, y), or `None` if the centre or any neighbour falls
    /// outside the sample.
    fn lbp_code(&self, sample: &FaceSample, x: i64, y: i64) -> Option<usize> {
        let center = sample.intensity(x, y)?;
        let mut code = 0usize;
        for (bit, &(dx, dy)) in self.offsets.iter().enumerate() {
            if sample.intensity(x + dx, y + dy)? >= center {
                code |= 1 << bit;
            }
        }
        Some(code)
    }

    fn region_features(&self, sample: &FaceSample, region: &Region) -> [u8; 16] {
        let width = sample.width as f64;
        let height = sample.height as f64;
        let (fx0, fy0, fx1, fy1) = region.bounds;
        let x_start = (width * fx0) as i64;
        let y_start = (height * fy0) as i64;
        let x_end = (width * fx1) as i64;
        let y_end = (height * fy1) as i64;

        let step = ((x_end - x_start) / SAMPLES_PER_REGION_ROW).max(1) as usize;
        let mut histogram = [0u32; HISTOGRAM_BINS];
        let mut total = 0u32;

        for y in ((y_start + self.radius)..(y_end - self.radius)).step_by(step) {
            for x in ((x_start + self.radius)..(x_end - self.radius)).step_by(step) {
                if let Some(code) = self.lbp_code(sample, x, y) {
                    histogram[code] += 1;
                    total += 1;
                }
            }
        }

        let mut features = [0u8; 16];
        if total == 0 {
            tracing::trace!(region = region.name, "region produced no LBP samples");
            return features;
        }
        for (slot, &pattern) in features.iter_mut().zip(SELECTED_PATTERNS.iter()) {
            *slot = (histogram[pattern] * 100 / total).min(255) as u8;
        }
        features
    }

    /// Mean intensity per grid cell, columns outermost.
    fn grid_intensity<'a>(&'a self, sample: &'a FaceSample) -> impl Iterator<Item = u8> + 'a {
        let width = sample.width as i64;
        let height = sample.height as i64;
        let cell_w = width / self.grid_size;
        let cell_h = height / self.grid_size;

        (0..self.grid_size)
            .flat_map(move |i| (0..self.grid_size).map(move |j| (i, j)))
            .map(move |(i, j)| {
                let x_start = i * cell_w;
                let y_start = j * cell_h;
                let x_end = (x_start + cell_w).min(width);
                let y_end = (y_start + cell_h).min(height);

                let mut sum = 0u64;
                let mut count = 0u64;
                for y in (y_start..y_end).step_by(GRID_STRIDE) {
                    for x in (x_start..x_end).step_by(GRID_STRIDE) {
                        if let Some(p) = sample.intensity(x, y) {
                            sum += p as u64;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    (sum / count) as u8
                } else {
                    EMPTY_CELL_INTENSITY
                }
            })
    }
}

/// Neighbour offsets on a circle of `radius`, truncated toward zero.
fn neighbor_offsets(radius: u32, neighbors: u32) -> Vec<(i64, i64)> {
    let r = radius as f64;
    (0..neighbors)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / neighbors as f64;
            ((r * angle.cos()) as i64, (r * angle.sin()) as i64)
        })
        .collect()
}

/// Extract with default parameters.
pub fn extract(sample: &FaceSample) -> Option<FeatureVector> {
    DescriptorExtractor::default().extract(sample)
}
