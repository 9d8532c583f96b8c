//! Left join of features with metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use tunesense_core::{Error, FeatureSchema, FeatureVector, Result, TrackId, TrackMetadata};

use crate::metadata::MetadataTable;
use crate::table::FeatureTable;

/// One feature row with its (possibly empty) metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub track_id: TrackId,
    pub features: FeatureVector,
    pub metadata: TrackMetadata,
}

/// Every feature row, in identifier order, with metadata attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedTable {
    pub schema: FeatureSchema,
    pub columns: Vec<String>,
    pub rows: Vec<JoinedRow>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a joined table, checking every row against the schema.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let table: JoinedTable = serde_json::from_str(&text)?;

        if table.columns != table.schema.columns() {
            return Err(Error::InvalidArtifact(
                "column names do not match the declared schema".to_string(),
            ));
        }
        for pair in table.rows.windows(2) {
            if pair[0].track_id >= pair[1].track_id {
                return Err(Error::InvalidArtifact(format!(
                    "rows not in ascending identifier order at track {}",
                    pair[1].track_id
                )));
            }
        }
        if let Some(row) = table.rows.iter().find(|r| r.features.len() != table.schema.width()) {
            return Err(Error::schema_violation(
                row.track_id,
                format!("row has {} columns, schema declares {}", row.features.len(), table.schema.width()),
            ));
        }
        Ok(table)
    }
}

/// Counts from one join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    /// Feature rows in the output
    pub rows: usize,
    /// Feature rows that found metadata
    pub matched: usize,
    /// Feature rows left with empty metadata
    pub unmatched_features: usize,
    /// Metadata records with no feature row
    pub ignored_metadata: usize,
}

/// Attaches metadata to feature rows by identifier.
#[derive(Debug, Default)]
pub struct MetadataJoiner;

impl MetadataJoiner {
    pub fn new() -> Self {
        Self
    }

    /// Left join: feature rows are never dropped; unmatched metadata is ignored.
    pub fn join(&self, features: &FeatureTable, metadata: &MetadataTable) -> (JoinedTable, JoinReport) {
        let mut report = JoinReport::default();

        let rows: Vec<JoinedRow> = features
            .iter()
            .map(|(track_id, vector)| {
                let metadata = match metadata.get(track_id) {
                    Some(found) => {
                        report.matched += 1;
                        found.clone()
                    }
                    None => {
                        report.unmatched_features += 1;
                        TrackMetadata::default()
                    }
                };
                JoinedRow {
                    track_id,
                    features: vector.clone(),
                    metadata,
                }
            })
            .collect();

        report.rows = rows.len();
        report.ignored_metadata = metadata.iter().filter(|(id, _)| !features.contains(*id)).count();

        info!(
            rows = report.rows,
            matched = report.matched,
            unmatched = report.unmatched_features,
            ignored_metadata = report.ignored_metadata,
            "Joined metadata"
        );

        (
            JoinedTable {
                schema: *features.schema(),
                columns: features.columns(),
                rows,
            },
            report,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(ids: &[u64]) -> FeatureTable {
        let mut table = FeatureTable::new(FeatureSchema::V1);
        for &id in ids {
            table.insert(TrackId(id), FeatureVector::new(vec![id as f32; 36])).unwrap();
        }
        table
    }

    #[test]
    fn test_left_join() {
        let mut metadata = MetadataTable::new();
        metadata.insert(TrackId(1), TrackMetadata::new("One", "A", "Rock"));
        metadata.insert(TrackId(9), TrackMetadata::new("Nine", "B", "Pop"));

        let (joined, report) = MetadataJoiner::new().join(&features(&[1, 2, 3]), &metadata);

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.rows[0].metadata.title, "One");
        assert!(joined.rows[1].metadata.is_empty());
        assert_eq!(
            report,
            JoinReport {
                rows: 3,
                matched: 1,
                unmatched_features: 2,
                ignored_metadata: 1,
            }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joined.json");
        let (joined, _) = MetadataJoiner::new().join(&features(&[4, 5]), &MetadataTable::new());

        joined.save(&path).unwrap();
        assert_eq!(JoinedTable::load(&path).unwrap(), joined);
    }
}
