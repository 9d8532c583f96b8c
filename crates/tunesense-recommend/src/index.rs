//! Exhaustive nearest-neighbor index.
//!
//! The index keeps the scaled feature matrix, the scaler that produced it,
//! and the metadata needed to turn neighbor identifiers into results. It is
//! immutable; a corpus change builds a new index which is swapped in
//! through an [`IndexHandle`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tunesense_core::{
    DistanceMetric, Error, FeatureSchema, FeatureVector, IndexConfig, Result, ScalingKind, TrackId, TrackMetadata,
};

use crate::join::JoinedTable;

/// Artifact layout version understood by [`NeighborIndex::load`].
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Per-column affine scaling fitted at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub kind: ScalingKind,
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    /// Identity scaling for `width` columns.
    pub fn identity(width: usize) -> Self {
        Self {
            kind: ScalingKind::None,
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        }
    }

    /// Fit column statistics of `matrix` (rows × columns).
    ///
    /// Columns with zero variance keep unit scale.
    pub fn fit(kind: ScalingKind, matrix: &Array2<f32>) -> Self {
        let width = matrix.ncols();
        if kind == ScalingKind::None || matrix.nrows() == 0 {
            return Self {
                kind,
                ..Self::identity(width)
            };
        }

        let n = matrix.nrows() as f64;
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        for column in matrix.columns() {
            let m = column.iter().map(|&v| v as f64).sum::<f64>() / n;
            let var = column.iter().map(|&v| (v as f64 - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m as f32);
            scale.push(if std > f64::from(f32::EPSILON) { std as f32 } else { 1.0 });
        }

        Self { kind, mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Scale one row.
    pub fn transform(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    /// Undo [`Scaler::transform`].
    pub fn inverse(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| v * s + m)
            .collect()
    }
}

/// One neighbor of a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub track_id: TrackId,
    pub distance: f32,
}

/// Serialized form of a [`NeighborIndex`].
#[derive(Serialize, Deserialize)]
struct IndexArtifact {
    format_version: u32,
    built_at: DateTime<Utc>,
    schema: FeatureSchema,
    columns: Vec<String>,
    metric: DistanceMetric,
    scaler: Scaler,
    ids: Vec<TrackId>,
    matrix: Array2<f32>,
    metadata: Vec<MetadataEntry>,
}

#[derive(Serialize, Deserialize)]
struct MetadataEntry {
    track_id: TrackId,
    #[serde(flatten)]
    metadata: TrackMetadata,
}

/// Immutable feature matrix with an identifier → row mapping.
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    schema: FeatureSchema,
    metric: DistanceMetric,
    scaler: Scaler,
    ids: Vec<TrackId>,
    rows: HashMap<TrackId, usize>,
    /// Scaled rows in `ids` order, standard layout
    matrix: Array2<f32>,
    metadata: BTreeMap<TrackId, TrackMetadata>,
    built_at: DateTime<Utc>,
}

impl NeighborIndex {
    /// Build from a joined table; scaling is fitted here and recorded.
    pub fn build(table: &JoinedTable, config: &IndexConfig) -> Result<Self> {
        let width = table.schema.width();
        let mut data = Vec::with_capacity(table.len() * width);
        let mut ids = Vec::with_capacity(table.len());
        let mut metadata = BTreeMap::new();

        let mut sorted: Vec<_> = table.rows.iter().collect();
        sorted.sort_by_key(|row| row.track_id);

        for row in sorted {
            if row.features.len() != width {
                return Err(Error::schema_violation(
                    row.track_id,
                    format!("row has {} columns, schema declares {}", row.features.len(), width),
                ));
            }
            if let Some(column) = row.features.as_slice().iter().position(|v| !v.is_finite()) {
                return Err(Error::schema_violation(
                    row.track_id,
                    format!("column {} is not finite", table.schema.columns()[column]),
                ));
            }
            data.extend_from_slice(row.features.as_slice());
            ids.push(row.track_id);
            if !row.metadata.is_empty() {
                metadata.insert(row.track_id, row.metadata.clone());
            }
        }

        let raw = Array2::from_shape_vec((ids.len(), width), data)
            .map_err(|e| Error::InvalidArtifact(e.to_string()))?;
        let scaler = Scaler::fit(config.scaling, &raw);

        let mut matrix = raw;
        for mut row in matrix.rows_mut() {
            for ((v, m), s) in row.iter_mut().zip(scaler.mean.iter()).zip(scaler.scale.iter()) {
                *v = (*v - m) / s;
            }
        }

        let index = Self::assemble(table.schema, config.metric, scaler, ids, matrix, metadata, Utc::now())?;
        info!(
            rows = index.len(),
            columns = width,
            metric = %index.metric,
            scaling = ?index.scaler.kind,
            "Built neighbor index"
        );
        Ok(index)
    }

    fn assemble(
        schema: FeatureSchema,
        metric: DistanceMetric,
        scaler: Scaler,
        ids: Vec<TrackId>,
        matrix: Array2<f32>,
        metadata: BTreeMap<TrackId, TrackMetadata>,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        let width = schema.width();
        if matrix.dim() != (ids.len(), width) {
            return Err(Error::InvalidArtifact(format!(
                "matrix is {:?}, expected ({}, {})",
                matrix.dim(),
                ids.len(),
                width
            )));
        }
        if scaler.width() != width || scaler.scale.len() != width {
            return Err(Error::InvalidArtifact(format!(
                "scaler covers {} columns, schema declares {}",
                scaler.width(),
                width
            )));
        }

        if scaler.mean.iter().any(|m| !m.is_finite()) || scaler.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(Error::InvalidArtifact(
                "scaler has a zero or non-finite parameter".to_string(),
            ));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidArtifact("matrix holds non-finite values".to_string()));
        }

        let mut rows = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if rows.insert(*id, i).is_some() {
                return Err(Error::DuplicateIdentifier(*id));
            }
        }

        let matrix = if matrix.is_standard_layout() {
            matrix
        } else {
            matrix.as_standard_layout().into_owned()
        };

        Ok(Self {
            schema,
            metric,
            scaler,
            ids,
            rows,
            matrix,
            metadata,
            built_at,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Indexed identifiers in ascending order.
    pub fn ids(&self) -> &[TrackId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.rows.contains_key(&track_id)
    }

    /// Scaled feature matrix, one row per identifier.
    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// Metadata for a track; empty fields when none was joined.
    pub fn metadata(&self, track_id: TrackId) -> TrackMetadata {
        self.metadata.get(&track_id).cloned().unwrap_or_default()
    }

    fn scaled_rows(&self) -> impl Iterator<Item = &[f32]> {
        let width = self.schema.width().max(1);
        self.matrix.as_slice().unwrap_or(&[]).chunks_exact(width)
    }

    fn scaled_row(&self, track_id: TrackId) -> Option<&[f32]> {
        let width = self.schema.width();
        let row = *self.rows.get(&track_id)?;
        self.matrix.as_slice()?.get(row * width..(row + 1) * width)
    }

    /// Stored feature values of a track, unscaled.
    pub fn vector_for(&self, track_id: TrackId) -> Option<FeatureVector> {
        self.scaled_row(track_id)
            .map(|row| FeatureVector::new(self.scaler.inverse(row)))
    }

    /// The `k` nearest rows to an unscaled vector, skipping `exclude`.
    ///
    /// Results are ordered by ascending distance, ties by ascending
    /// identifier. Fewer than `k` candidates returns them all.
    pub fn query(&self, vector: &[f32], k: usize, exclude: &[TrackId]) -> Result<Vec<Neighbor>> {
        if vector.len() != self.schema.width() {
            return Err(Error::DimensionMismatch {
                expected: self.schema.width(),
                actual: vector.len(),
            });
        }
        let scaled = self.scaler.transform(vector);
        Ok(self.nearest(&scaled, k, exclude))
    }

    /// Neighbors of an indexed track; the track itself is never returned.
    pub fn query_track(&self, track_id: TrackId, k: usize) -> Result<Vec<Neighbor>> {
        let row = self.scaled_row(track_id).ok_or(Error::UnknownIdentifier(track_id))?;
        Ok(self.nearest(row, k, &[track_id]))
    }

    fn nearest(&self, scaled: &[f32], k: usize, exclude: &[TrackId]) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(self.scaled_rows())
            .filter(|(id, _)| !exclude.contains(*id))
            .map(|(id, row)| Neighbor {
                track_id: *id,
                distance: self.metric.distance(scaled, row),
            })
            .collect();

        candidates.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => a.track_id.cmp(&b.track_id),
            other => other,
        });
        candidates.truncate(k);

        debug!(k, returned = candidates.len(), excluded = exclude.len(), "Neighbor query");
        candidates
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        let artifact = IndexArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            built_at: self.built_at,
            schema: self.schema,
            columns: self.schema.columns(),
            metric: self.metric,
            scaler: self.scaler.clone(),
            ids: self.ids.clone(),
            matrix: self.matrix.clone(),
            metadata: self
                .metadata
                .iter()
                .map(|(track_id, metadata)| MetadataEntry {
                    track_id: *track_id,
                    metadata: metadata.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&artifact)?)
    }

    /// Parse and validate an artifact.
    pub fn from_json(text: &str) -> Result<Self> {
        let artifact: IndexArtifact = serde_json::from_str(text)?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(Error::InvalidArtifact(format!(
                "format version {} is not supported (expected {})",
                artifact.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if artifact.columns != artifact.schema.columns() {
            return Err(Error::InvalidArtifact(
                "column names do not match the declared schema".to_string(),
            ));
        }

        let metadata = artifact
            .metadata
            .into_iter()
            .map(|entry| (entry.track_id, entry.metadata))
            .collect();

        Self::assemble(
            artifact.schema,
            artifact.metric,
            artifact.scaler,
            artifact.ids,
            artifact.matrix,
            metadata,
            artifact.built_at,
        )
    }

    /// Write the artifact to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        info!(path = %path.as_ref().display(), rows = self.len(), "Saved index artifact");
        Ok(())
    }

    /// Load an artifact for read-only serving.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let index = Self::from_json(&text)?;
        info!(path = %path.as_ref().display(), rows = index.len(), "Loaded index artifact");
        Ok(index)
    }
}

/// Shared reference to the serving index.
///
/// Readers clone the inner `Arc` and query without holding the lock; a
/// rebuild replaces the whole index at once.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    inner: Arc<RwLock<Arc<NeighborIndex>>>,
}

impl IndexHandle {
    pub fn new(index: NeighborIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The index currently being served.
    pub fn current(&self) -> Arc<NeighborIndex> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the served index, returning the previous one.
    pub fn swap(&self, index: NeighborIndex) -> Arc<NeighborIndex> {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        info!(rows = index.len(), "Swapping serving index");
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}
