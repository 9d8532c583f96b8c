//! Pipeline configuration.
//!
//! Every section has defaults matching the reference pipeline; a JSON file
//! only needs the fields it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{DistanceMetric, ScalingKind};

/// Canonical analysis sample rate in Hz.
pub const CANONICAL_SAMPLE_RATE: u32 = 22_050;

/// Signal analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Sample rate the extractor expects (Hz)
    pub sample_rate: u32,
    /// Analysis frame length in samples
    pub frame_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
    /// Clips longer than this are truncated (seconds)
    pub max_duration_secs: f64,
    /// Number of mel bands feeding the cepstrum
    pub n_mels: usize,
    /// Peak amplitude below which a clip counts as silent
    pub silence_threshold: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_rate: CANONICAL_SAMPLE_RATE,
            frame_size: 2048,
            hop_size: 512,
            max_duration_secs: 30.0,
            n_mels: 128,
            silence_threshold: 1e-5,
        }
    }
}

impl ExtractionConfig {
    /// Maximum number of samples analyzed per clip.
    pub fn max_samples(&self) -> usize {
        (self.max_duration_secs * self.sample_rate as f64) as usize
    }
}

/// Batch table-building parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Process at most this many corpus entries
    pub limit: Option<usize>,
    /// Extract tracks on the rayon thread pool
    pub parallel: bool,
    /// File extensions recognized when scanning a corpus directory
    pub extensions: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            limit: None,
            parallel: true,
            extensions: ["mp3", "wav", "flac", "ogg"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Neighbor index parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Distance function
    pub metric: DistanceMetric,
    /// Column scaling recorded at build time
    pub scaling: ScalingKind,
}

/// Recommendation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Number of results when the caller does not specify one
    pub default_k: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { default_k: 5 }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Signal analysis
    pub extraction: ExtractionConfig,
    /// Table building
    pub build: BuildConfig,
    /// Index construction
    pub index: IndexConfig,
    /// Query defaults
    pub recommend: RecommendConfig,
}

impl PipelineConfig {
    /// Load a configuration file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Reject parameter combinations the analysis cannot work with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.extraction;
        if e.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be positive".into()));
        }
        if e.frame_size < 16 || !e.frame_size.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "frame_size must be a power of two >= 16, got {}",
                e.frame_size
            )));
        }
        if e.hop_size == 0 || e.hop_size > e.frame_size {
            return Err(Error::InvalidConfig(format!(
                "hop_size must be in 1..={}, got {}",
                e.frame_size, e.hop_size
            )));
        }
        if e.n_mels == 0 {
            return Err(Error::InvalidConfig("n_mels must be positive".into()));
        }
        if e.max_duration_secs.is_nan() || e.max_duration_secs <= 0.0 {
            return Err(Error::InvalidConfig("max_duration_secs must be positive".into()));
        }
        if self.recommend.default_k == 0 {
            return Err(Error::InvalidConfig("default_k must be positive".into()));
        }
        Ok(())
    }
}
