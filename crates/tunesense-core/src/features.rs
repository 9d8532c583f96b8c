//! Feature schema and vectors.
//!
//! The schema fixes the dimensionality of every variable-length sub-feature
//! (cepstral coefficients, chroma bins, spectral-contrast bands). It is shared
//! by the extractor and the table builder so that independently produced
//! batches either agree column for column or fail at build time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::TrackId;

/// Name of the tempo column.
pub const TEMPO: &str = "tempo";
/// Name of the spectral centroid column.
pub const CENTROID: &str = "centroid";
/// Name of the RMS energy column.
pub const RMS: &str = "rms";
/// Name of the zero-crossing rate column.
pub const ZCR: &str = "zcr";

const MFCC_PREFIX: &str = "mfcc";
const CHROMA_PREFIX: &str = "chroma";
const CONTRAST_PREFIX: &str = "spec_contrast";

/// Fixed, versioned column layout of a feature vector.
///
/// Columns are ordered `mfcc_*`, `chroma_*`, `spec_contrast_*`, `tempo`,
/// `centroid`, `rms`, `zcr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Layout version
    pub version: u32,
    /// Number of cepstral coefficients
    pub mfcc: usize,
    /// Number of chroma bins
    pub chroma: usize,
    /// Number of spectral-contrast bands
    pub spectral_contrast: usize,
}

impl FeatureSchema {
    /// Current layout produced by the extractor.
    pub const V1: FeatureSchema = FeatureSchema {
        version: 1,
        mfcc: 13,
        chroma: 12,
        spectral_contrast: 7,
    };

    const SCALARS: [&'static str; 4] = [TEMPO, CENTROID, RMS, ZCR];

    /// Total number of columns.
    pub fn width(&self) -> usize {
        self.mfcc + self.chroma + self.spectral_contrast + Self::SCALARS.len()
    }

    /// Ordered column names.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.width());
        columns.extend((0..self.mfcc).map(|i| format!("{}_{}", MFCC_PREFIX, i)));
        columns.extend((0..self.chroma).map(|i| format!("{}_{}", CHROMA_PREFIX, i)));
        columns.extend((0..self.spectral_contrast).map(|i| format!("{}_{}", CONTRAST_PREFIX, i)));
        columns.extend(Self::SCALARS.iter().map(|s| s.to_string()));
        columns
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c == name)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::V1
    }
}

/// Tempo as delivered by an extraction batch.
///
/// Older batches wrapped the estimate in a one-element list, sometimes
/// stringified (`"[120.5]"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TempoValue {
    /// Plain BPM value
    Scalar(f32),
    /// Single-element container
    List(Vec<f32>),
    /// Stringified scalar or list
    Text(String),
}

impl TempoValue {
    /// Unwrap to a scalar BPM value.
    pub fn unwrap_scalar(&self) -> std::result::Result<f32, String> {
        match self {
            TempoValue::Scalar(bpm) => Ok(*bpm),
            TempoValue::List(values) => match values.as_slice() {
                [bpm] => Ok(*bpm),
                other => Err(format!("tempo list has {} values, expected 1", other.len())),
            },
            TempoValue::Text(text) => {
                let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
                let parts: Vec<&str> = inner.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
                match parts.as_slice() {
                    [single] => single
                        .parse::<f32>()
                        .map_err(|_| format!("tempo text {:?} is not numeric", text)),
                    other => Err(format!("tempo text {:?} has {} values, expected 1", text, other.len())),
                }
            }
        }
    }
}

impl From<f32> for TempoValue {
    fn from(bpm: f32) -> Self {
        TempoValue::Scalar(bpm)
    }
}

/// Per-track statistics before they are laid out as columns.
///
/// The extractor fills every field; records read back from independent
/// batches may omit some, which are filled with zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    /// Mean cepstral coefficients
    #[serde(default)]
    pub mfcc: Option<Vec<f32>>,
    /// Mean chroma energy per pitch class
    #[serde(default)]
    pub chroma: Option<Vec<f32>>,
    /// Mean spectral contrast per band
    #[serde(default, alias = "spectral_contrast")]
    pub spec_contrast: Option<Vec<f32>>,
    /// Tempo estimate in BPM
    #[serde(default)]
    pub tempo: Option<TempoValue>,
    /// Mean spectral centroid in Hz
    #[serde(default)]
    pub centroid: Option<f32>,
    /// Mean RMS energy
    #[serde(default)]
    pub rms: Option<f32>,
    /// Mean zero-crossing rate
    #[serde(default)]
    pub zcr: Option<f32>,
}

/// A raw record conformed to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformed {
    /// Column values in schema order
    pub vector: FeatureVector,
    /// Number of absent fields filled with zero
    pub filled_defaults: usize,
}

impl RawFeatures {
    /// Declare a schema from this record's sub-feature lengths.
    ///
    /// Sub-features the record lacks take their dimension from `fallback`.
    pub fn declare_schema(&self, fallback: &FeatureSchema) -> FeatureSchema {
        FeatureSchema {
            version: fallback.version,
            mfcc: self.mfcc.as_ref().map_or(fallback.mfcc, Vec::len),
            chroma: self.chroma.as_ref().map_or(fallback.chroma, Vec::len),
            spectral_contrast: self.spec_contrast.as_ref().map_or(fallback.spectral_contrast, Vec::len),
        }
    }

    /// Lay the record out as columns of `schema`.
    ///
    /// Present arrays must match the schema exactly. Absent fields and
    /// non-finite values become zeros, each counted in `filled_defaults`.
    pub fn conform(&self, schema: &FeatureSchema, track_id: TrackId) -> Result<Conformed> {
        let mut values = Vec::with_capacity(schema.width());
        let mut filled_defaults = 0;

        for (name, array, expected) in [
            (MFCC_PREFIX, &self.mfcc, schema.mfcc),
            (CHROMA_PREFIX, &self.chroma, schema.chroma),
            (CONTRAST_PREFIX, &self.spec_contrast, schema.spectral_contrast),
        ] {
            match array {
                Some(array) if array.len() == expected => {
                    let non_finite = array.iter().filter(|v| !v.is_finite()).count();
                    if non_finite > 0 {
                        debug!(track_id = %track_id, field = name, count = non_finite, "Zeroing non-finite values");
                        filled_defaults += non_finite;
                    }
                    values.extend(array.iter().map(|&v| if v.is_finite() { v } else { 0.0 }));
                }
                Some(array) => {
                    return Err(Error::schema_violation(
                        track_id,
                        format!("{} has {} values, schema declares {}", name, array.len(), expected),
                    ));
                }
                None => {
                    debug!(track_id = %track_id, field = name, "Filling absent sub-feature with zeros");
                    values.extend(std::iter::repeat(0.0).take(expected));
                    filled_defaults += 1;
                }
            }
        }

        let tempo = match &self.tempo {
            Some(tempo) => Some(
                tempo
                    .unwrap_scalar()
                    .map_err(|detail| Error::schema_violation(track_id, detail))?,
            ),
            None => None,
        };

        for (name, value) in [(TEMPO, tempo), (CENTROID, self.centroid), (RMS, self.rms), (ZCR, self.zcr)] {
            match value {
                Some(v) if v.is_finite() => values.push(v),
                _ => {
                    debug!(track_id = %track_id, field = name, "Filling missing scalar with zero");
                    values.push(0.0);
                    filled_defaults += 1;
                }
            }
        }

        Ok(Conformed {
            vector: FeatureVector::new(values),
            filled_defaults,
        })
    }
}

/// Feature values in schema column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Wrap column values.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Column values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the vector has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of a named column.
    pub fn get(&self, schema: &FeatureSchema, name: &str) -> Option<f32> {
        schema.column_index(name).and_then(|i| self.0.get(i).copied())
    }

    /// Consume into the raw values.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}
