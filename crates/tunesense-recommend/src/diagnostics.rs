//! Index quality checks and side-by-side feature comparison.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use tunesense_core::features::{CENTROID, RMS, TEMPO, ZCR};
use tunesense_core::{Error, Result, TrackId};

use crate::index::NeighborIndex;

/// Columns shown by default when comparing two tracks.
pub const DEFAULT_COMPARISON_COLUMNS: [&str; 4] = [RMS, ZCR, CENTROID, TEMPO];

/// How well each track's neighbors stand in for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    /// Neighbors averaged per track
    pub k: usize,
    /// Tracks that had at least one neighbor
    pub evaluated: usize,
    /// Mean squared error between row means and neighbor-averaged row means
    pub mse: f64,
    /// Coefficient of determination of the same pair
    pub r2: f64,
}

/// Predict every track's feature mean from its `k` nearest neighbors.
///
/// Row means are taken over unscaled feature values. Tracks without any
/// neighbor are skipped.
pub fn reconstruction(index: &NeighborIndex, k: usize) -> Result<ReconstructionReport> {
    let row_mean = |id: TrackId| -> Option<f64> {
        let vector = index.vector_for(id)?;
        let values = vector.as_slice();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
    };

    let pairs: Vec<(f64, f64)> = index
        .ids()
        .par_iter()
        .map(|&id| -> Result<Option<(f64, f64)>> {
            let neighbors = index.query_track(id, k)?;
            let means: Vec<f64> = neighbors.iter().filter_map(|n| row_mean(n.track_id)).collect();
            if means.is_empty() {
                return Ok(None);
            }
            let predicted = means.iter().sum::<f64>() / means.len() as f64;
            Ok(row_mean(id).map(|actual| (actual, predicted)))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let (mse, r2) = mse_and_r2(&pairs);
    info!(k, evaluated = pairs.len(), mse, r2, "Reconstruction metrics");

    Ok(ReconstructionReport {
        k,
        evaluated: pairs.len(),
        mse,
        r2,
    })
}

/// Mean squared error and R² of `(actual, predicted)` pairs.
///
/// R² is 1 for a perfect fit of constant targets and 0 for an imperfect one.
pub fn mse_and_r2(pairs: &[(f64, f64)]) -> (f64, f64) {
    if pairs.is_empty() {
        return (0.0, 0.0);
    }

    let n = pairs.len() as f64;
    let ss_res: f64 = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum();
    let mean = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let ss_tot: f64 = pairs.iter().map(|(a, _)| (a - mean).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };
    (ss_res / n, r2)
}

/// One feature of two tracks side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedFeature {
    pub name: String,
    pub query: f32,
    pub candidate: f32,
}

/// Selected features of a query track next to a recommended track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureComparison {
    pub query: TrackId,
    pub candidate: TrackId,
    pub features: Vec<ComparedFeature>,
}

/// Compare named columns of two indexed tracks (unscaled values).
pub fn compare(index: &NeighborIndex, query: TrackId, candidate: TrackId, columns: &[&str]) -> Result<FeatureComparison> {
    let schema = index.schema();
    let unresolved: Vec<String> = columns
        .iter()
        .filter(|name| schema.column_index(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !unresolved.is_empty() {
        return Err(Error::SchemaResolution {
            unresolved,
            available: schema.columns(),
        });
    }

    let left = index.vector_for(query).ok_or(Error::UnknownIdentifier(query))?;
    let right = index.vector_for(candidate).ok_or(Error::UnknownIdentifier(candidate))?;

    let features = columns
        .iter()
        .map(|name| ComparedFeature {
            name: name.to_string(),
            query: left.get(schema, name).unwrap_or_default(),
            candidate: right.get(schema, name).unwrap_or_default(),
        })
        .collect();

    Ok(FeatureComparison {
        query,
        candidate,
        features,
    })
}
