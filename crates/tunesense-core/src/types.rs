//! Shared types for the recommendation pipeline.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stable numeric track identifier.
///
/// Corpus identifiers come from file names (`000123.mp3` is track 123), so
/// the canonical form is an unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Coerce a raw identifier cell into canonical numeric form.
    ///
    /// Accepts plain integers, zero-padded integers, integral floats
    /// (`"123.0"`) and file names (`"000123.mp3"`). Returns `None` for
    /// anything else.
    pub fn coerce(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(id) = trimmed.parse::<u64>() {
            return Some(Self(id));
        }

        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
                return Some(Self(value as u64));
            }
            return None;
        }

        // File-name form: numeric stem plus an alphabetic extension
        let (stem, ext) = trimmed.rsplit_once('.')?;
        if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) && ext.chars().any(|c| c.is_ascii_alphabetic()) {
            return stem.parse::<u64>().ok().map(Self);
        }
        None
    }

    /// Derive an identifier from a file stem.
    ///
    /// The stem's leading digit run wins (`000123_live` is 123). A stem that
    /// starts with something else must hold exactly one digit run
    /// (`track-77` is 77); `a1b2` is ambiguous and yields `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let mut runs = stem.split(|c: char| !c.is_ascii_digit()).filter(|run| !run.is_empty());
        let first = runs.next()?;
        let leading = stem.starts_with(|c: char| c.is_ascii_digit());
        if !leading && runs.next().is_some() {
            return None;
        }
        first.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Descriptive fields attached to a track.
///
/// Missing values are empty strings, never absent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Track title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Top-level genre
    pub genre: String,
}

impl TrackMetadata {
    /// Create a metadata record.
    pub fn new(title: impl Into<String>, artist: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            genre: genre.into(),
        }
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty() && self.genre.is_empty()
    }
}

/// A single ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// Recommended track
    pub track_id: TrackId,
    /// Distance from the query in (scaled) feature space
    pub distance: f32,
    /// Track title (empty when unknown)
    pub title: String,
    /// Artist name (empty when unknown)
    pub artist: String,
    /// Top-level genre (empty when unknown)
    pub genre: String,
}

/// Distance function used by the neighbor index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Straight-line distance
    #[default]
    Euclidean,
    /// Sum of absolute differences
    Manhattan,
    /// One minus cosine similarity
    Cosine,
}

impl DistanceMetric {
    /// Distance between two equally sized vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }

                (1.0 - dot / (norm_a * norm_b)).max(0.0)
            }
        }
    }

    /// Parse a metric name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Some(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Some(DistanceMetric::Manhattan),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Manhattan => write!(f, "manhattan"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Column scaling applied when an index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingKind {
    /// Raw feature values; large-magnitude columns such as tempo dominate
    None,
    /// Zero mean, unit variance per column
    #[default]
    Standard,
}

impl ScalingKind {
    /// Parse a scaling name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "raw" => Some(ScalingKind::None),
            "standard" | "zscore" => Some(ScalingKind::Standard),
            _ => None,
        }
    }
}
