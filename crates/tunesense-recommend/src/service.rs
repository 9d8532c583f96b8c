//! Query resolution and result assembly.

use std::sync::Arc;

use tracing::{debug, info};

use tunesense_core::{Error, RecommendationResult, Result, TrackId};
use tunesense_frequency::{AudioData, FeatureExtractor};

use crate::index::{IndexHandle, Neighbor, NeighborIndex};

/// What to recommend against.
#[derive(Debug, Clone)]
pub enum Query {
    /// An indexed track; its stored vector is used as is
    Track(TrackId),
    /// Freshly decoded audio, optionally known to be an indexed track
    Audio {
        audio: AudioData,
        track_id: Option<TrackId>,
    },
}

/// Turns queries into ranked, metadata-joined results.
pub struct RecommendationService {
    index: IndexHandle,
    extractor: Arc<FeatureExtractor>,
}

impl RecommendationService {
    pub fn new(index: IndexHandle, extractor: Arc<FeatureExtractor>) -> Self {
        Self { index, extractor }
    }

    /// Handle to the served index, for swapping in a rebuild.
    pub fn index_handle(&self) -> &IndexHandle {
        &self.index
    }

    /// The `k` nearest tracks to the query, never including the query itself.
    ///
    /// Failures to resolve the query (unknown identifier, extraction
    /// failure, schema disagreement) are returned as errors; no partial
    /// result is produced.
    pub fn recommend(&self, query: &Query, k: usize) -> Result<Vec<RecommendationResult>> {
        let index = self.index.current();

        let neighbors = match query {
            Query::Track(track_id) => index.query_track(*track_id, k)?,
            Query::Audio { audio, track_id } => {
                if self.extractor.schema() != index.schema() {
                    return Err(Error::DimensionMismatch {
                        expected: index.schema().width(),
                        actual: self.extractor.schema().width(),
                    });
                }

                let vector = self.extractor.extract_vector(track_id.unwrap_or(TrackId(0)), audio)?;
                let exclude: Vec<TrackId> = track_id.iter().copied().filter(|id| index.contains(*id)).collect();
                debug!(excluded = exclude.len(), "Querying with extracted audio");
                index.query(vector.as_slice(), k, &exclude)?
            }
        };

        let results = assemble(&index, neighbors);
        info!(k, returned = results.len(), "Recommendations ready");
        Ok(results)
    }

    /// Shorthand for [`Query::Track`].
    pub fn recommend_track(&self, track_id: TrackId, k: usize) -> Result<Vec<RecommendationResult>> {
        self.recommend(&Query::Track(track_id), k)
    }
}

/// Attach metadata to every neighbor; missing metadata becomes empty strings.
fn assemble(index: &NeighborIndex, neighbors: Vec<Neighbor>) -> Vec<RecommendationResult> {
    neighbors
        .into_iter()
        .map(|neighbor| {
            let metadata = index.metadata(neighbor.track_id);
            RecommendationResult {
                track_id: neighbor.track_id,
                distance: neighbor.distance,
                title: metadata.title,
                artist: metadata.artist,
                genre: metadata.genre,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesense_core::{ExtractionFailure, FeatureSchema, FeatureVector, IndexConfig, TrackMetadata};

    use crate::join::{JoinedRow, JoinedTable};

    fn service(rows: &[(u64, f32, Option<&str>)]) -> RecommendationService {
        let schema = FeatureSchema::V1;
        let tempo = schema.column_index("tempo").unwrap();
        let table = JoinedTable {
            schema,
            columns: schema.columns(),
            rows: rows
                .iter()
                .map(|&(id, bpm, title)| {
                    let mut values = vec![1.0; schema.width()];
                    values[tempo] = bpm;
                    JoinedRow {
                        track_id: TrackId(id),
                        features: FeatureVector::new(values),
                        metadata: title
                            .map(|t| TrackMetadata::new(t, "Artist", "Electronic"))
                            .unwrap_or_default(),
                    }
                })
                .collect(),
        };
        let index = NeighborIndex::build(&table, &IndexConfig::default()).unwrap();
        RecommendationService::new(IndexHandle::new(index), Arc::new(FeatureExtractor::default()))
    }

    #[test]
    fn test_recommend_by_track() {
        let service = service(&[(1, 90.0, Some("Slow")), (2, 91.0, None), (3, 180.0, Some("Fast"))]);
        let results = service.recommend_track(TrackId(1), 1).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].track_id, TrackId(2));
        // Missing metadata never drops a result
        assert_eq!(results[0].title, "");
        assert_eq!(results[0].genre, "");
    }

    #[test]
    fn test_unknown_track() {
        let service = service(&[(1, 90.0, None)]);
        assert!(matches!(
            service.recommend_track(TrackId(5), 3),
            Err(Error::UnknownIdentifier(TrackId(5)))
        ));
    }

    #[test]
    fn test_audio_query_extraction_failure_is_typed() {
        let service = service(&[(1, 90.0, None)]);
        let query = Query::Audio {
            audio: AudioData::new(vec![0.0; 22_050], 22_050),
            track_id: None,
        };
        assert!(matches!(
            service.recommend(&query, 3),
            Err(Error::Extraction(ExtractionFailure::Silent))
        ));
    }

    #[test]
    fn test_audio_query_excludes_known_track() {
        let service = service(&[(1, 90.0, Some("A")), (2, 120.0, Some("B")), (3, 150.0, Some("C"))]);
        let samples: Vec<f32> = (0..22_050)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22_050.0).sin())
            .collect();

        let anonymous = Query::Audio {
            audio: AudioData::new(samples.clone(), 22_050),
            track_id: None,
        };
        assert_eq!(service.recommend(&anonymous, 10).unwrap().len(), 3);

        let known = Query::Audio {
            audio: AudioData::new(samples, 22_050),
            track_id: Some(TrackId(2)),
        };
        let results = service.recommend(&known, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.track_id != TrackId(2)));
    }
}
