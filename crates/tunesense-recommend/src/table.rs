//! Feature table construction.
//!
//! The builder extracts every corpus entry (in parallel when configured),
//! sorts the outcomes by identifier and only then declares the column schema
//! from the first successful row. Processing order therefore never changes
//! the resulting table.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tunesense_core::{
    BuildConfig, Error, ExtractionConfig, FeatureSchema, FeatureVector, RawFeatures, Result, TrackId,
};
use tunesense_frequency::{CorpusEntry, FeatureExtractor};

/// Identifier → feature vector, all rows in one schema, ordered by identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    schema: FeatureSchema,
    rows: BTreeMap<TrackId, FeatureVector>,
}

/// On-disk layout of a feature table.
#[derive(Serialize, Deserialize)]
struct TableFile {
    schema: FeatureSchema,
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

#[derive(Serialize, Deserialize)]
struct TableRow {
    track_id: TrackId,
    features: FeatureVector,
}

impl FeatureTable {
    /// Create an empty table.
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Add a row; identifiers are unique and vectors must match the schema width
    /// with finite values only.
    pub fn insert(&mut self, track_id: TrackId, vector: FeatureVector) -> Result<()> {
        if vector.len() != self.schema.width() {
            return Err(Error::schema_violation(
                track_id,
                format!("row has {} columns, schema declares {}", vector.len(), self.schema.width()),
            ));
        }
        if let Some(column) = vector.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(Error::schema_violation(
                track_id,
                format!("column {} is not finite", self.schema.columns()[column]),
            ));
        }
        if self.rows.contains_key(&track_id) {
            return Err(Error::DuplicateIdentifier(track_id));
        }
        self.rows.insert(track_id, vector);
        Ok(())
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Ordered column names.
    pub fn columns(&self) -> Vec<String> {
        self.schema.columns()
    }

    pub fn get(&self, track_id: TrackId) -> Option<&FeatureVector> {
        self.rows.get(&track_id)
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.rows.contains_key(&track_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &FeatureVector)> {
        self.rows.iter().map(|(id, v)| (*id, v))
    }

    /// Identifiers in ascending order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.rows.keys().copied().collect()
    }

    /// Serialize to pretty JSON. Equal tables always produce equal text.
    pub fn to_json(&self) -> Result<String> {
        let file = TableFile {
            schema: self.schema,
            columns: self.columns(),
            rows: self
                .iter()
                .map(|(track_id, features)| TableRow {
                    track_id,
                    features: features.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parse a table written by [`FeatureTable::to_json`].
    pub fn from_json(text: &str) -> Result<Self> {
        let file: TableFile = serde_json::from_str(text)?;
        if file.columns != file.schema.columns() {
            return Err(Error::InvalidArtifact(
                "column names do not match the declared schema".to_string(),
            ));
        }

        let mut table = FeatureTable::new(file.schema);
        for row in file.rows {
            table.insert(row.track_id, row.features)?;
        }
        Ok(table)
    }

    /// Write the table to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        debug!(path = %path.as_ref().display(), rows = self.len(), "Saved feature table");
        Ok(())
    }

    /// Read a table from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

/// A track the builder had to skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTrack {
    pub track_id: TrackId,
    /// Stable error code, see [`Error::error_code`]
    pub code: String,
    pub reason: String,
}

/// Summary of one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Rows in the finished table
    pub rows: usize,
    /// Skipped tracks, in identifier order
    pub failed: Vec<FailedTrack>,
    /// Absent fields filled with zero, over all rows
    pub filled_defaults: usize,
    /// Raw records dropped because their identifier could not be read
    pub unidentified: usize,
}

impl BuildReport {
    /// Identifiers of skipped tracks.
    pub fn failed_ids(&self) -> Vec<TrackId> {
        self.failed.iter().map(|f| f.track_id).collect()
    }

    fn log_summary(&self) {
        info!(
            rows = self.rows,
            failed = self.failed.len(),
            filled_defaults = self.filled_defaults,
            unidentified = self.unidentified,
            "Feature table built"
        );
        if !self.failed.is_empty() {
            let ids: Vec<String> = self.failed.iter().map(|f| f.track_id.to_string()).collect();
            warn!(count = self.failed.len(), ids = %ids.join(","), "Tracks skipped");
        }
    }
}

/// Runs the extractor over a corpus and assembles a [`FeatureTable`].
pub struct TableBuilder {
    extractor: FeatureExtractor,
    config: BuildConfig,
}

impl TableBuilder {
    pub fn new(extraction: ExtractionConfig, config: BuildConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(extraction),
            config,
        }
    }

    /// The extractor every track goes through.
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Build a table from a corpus manifest.
    pub fn build(&self, corpus: &[CorpusEntry]) -> Result<(FeatureTable, BuildReport)> {
        self.build_with_progress(corpus, &|| {})
    }

    /// Build a table, calling `progress` once per processed entry.
    ///
    /// Per-track failures are recorded in the report. Duplicate identifiers
    /// and schema violations abort the build.
    pub fn build_with_progress(
        &self,
        corpus: &[CorpusEntry],
        progress: &(dyn Fn() + Sync),
    ) -> Result<(FeatureTable, BuildReport)> {
        let mut seen = BTreeSet::new();
        for entry in corpus {
            if !seen.insert(entry.track_id) {
                return Err(Error::DuplicateIdentifier(entry.track_id));
            }
        }

        let mut entries: Vec<&CorpusEntry> = corpus.iter().collect();
        entries.sort_by_key(|e| e.track_id);
        if let Some(limit) = self.config.limit {
            entries.truncate(limit);
        }

        info!(entries = entries.len(), parallel = self.config.parallel, "Extracting corpus");

        let process = |entry: &&CorpusEntry| {
            let outcome = self.process_entry(entry);
            progress();
            (entry.track_id, outcome)
        };

        let mut outcomes: Vec<(TrackId, Result<RawFeatures>)> = if self.config.parallel {
            entries.par_iter().map(process).collect()
        } else {
            entries.iter().map(process).collect()
        };
        outcomes.sort_by_key(|(id, _)| *id);

        let mut records = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for (track_id, outcome) in outcomes {
            match outcome {
                Ok(raw) => records.push((track_id, raw)),
                Err(e) => {
                    warn!(track_id = %track_id, error = %e, "Skipping track");
                    failed.push(FailedTrack {
                        track_id,
                        code: e.error_code().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = BuildReport {
            failed,
            ..BuildReport::default()
        };
        self.assemble(records, report)
    }

    fn process_entry(&self, entry: &CorpusEntry) -> Result<RawFeatures> {
        let audio = entry
            .source
            .load(self.extractor.config())
            .map_err(|e| Error::AudioSource {
                track_id: entry.track_id,
                message: format!("{:#}", e),
            })?;
        Ok(self.extractor.extract_audio(&audio)?)
    }

    /// Build a table from pre-extracted raw records.
    pub fn build_from_records(&self, records: Vec<(TrackId, RawFeatures)>) -> Result<(FeatureTable, BuildReport)> {
        self.build_from_records_with_report(records, BuildReport::default())
    }

    fn build_from_records_with_report(
        &self,
        mut records: Vec<(TrackId, RawFeatures)>,
        report: BuildReport,
    ) -> Result<(FeatureTable, BuildReport)> {
        records.sort_by_key(|(id, _)| *id);
        if let Some(pair) = records.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(Error::DuplicateIdentifier(pair[0].0));
        }
        if let Some(limit) = self.config.limit {
            records.truncate(limit);
        }
        self.assemble(records, report)
    }

    /// Build a table from a JSON-lines file of raw records.
    pub fn build_from_jsonl(&self, path: impl AsRef<Path>) -> Result<(FeatureTable, BuildReport)> {
        let (records, unidentified) = read_raw_records(path)?;
        let report = BuildReport {
            unidentified,
            ..BuildReport::default()
        };
        self.build_from_records_with_report(records, report)
    }

    /// Declare the schema from the first row and conform every row to it.
    fn assemble(
        &self,
        records: Vec<(TrackId, RawFeatures)>,
        mut report: BuildReport,
    ) -> Result<(FeatureTable, BuildReport)> {
        let schema = records
            .first()
            .map(|(_, raw)| raw.declare_schema(self.extractor.schema()))
            .unwrap_or(*self.extractor.schema());
        debug!(?schema, "Declared table schema");

        let mut table = FeatureTable::new(schema);
        for (track_id, raw) in records {
            let conformed = raw.conform(&schema, track_id)?;
            if conformed.filled_defaults > 0 {
                debug!(track_id = %track_id, filled = conformed.filled_defaults, "Filled absent features");
            }
            report.filled_defaults += conformed.filled_defaults;
            table.insert(track_id, conformed.vector)?;
        }

        report.rows = table.len();
        report.log_summary();
        Ok((table, report))
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new(ExtractionConfig::default(), BuildConfig::default())
    }
}

/// Identifier cell of a raw record: a number or any coercible string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Float(f64),
    Text(String),
}

impl RawId {
    fn coerce(&self) -> Option<TrackId> {
        match self {
            RawId::Int(id) => Some(TrackId(*id)),
            RawId::Float(value) => TrackId::coerce(&value.to_string()),
            RawId::Text(text) => TrackId::coerce(text),
        }
    }
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(alias = "id", alias = "filename")]
    track_id: RawId,
    #[serde(flatten)]
    features: RawFeatures,
}

/// Read JSON-lines raw records.
///
/// Returns the records plus the number of lines dropped for an unreadable
/// identifier. Blank lines are skipped; any other malformed line is an error.
pub fn read_raw_records(path: impl AsRef<Path>) -> Result<(Vec<(TrackId, RawFeatures)>, usize)> {
    let file = std::fs::File::open(path.as_ref())?;
    let mut records = Vec::new();
    let mut unidentified = 0;

    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = serde_json::from_str(&line)?;
        match record.track_id.coerce() {
            Some(track_id) => records.push((track_id, record.features)),
            None => {
                warn!(line = line_no + 1, "Dropping raw record without a usable identifier");
                unidentified += 1;
            }
        }
    }

    Ok((records, unidentified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesense_core::{ExtractionFailure, TempoValue};
    use tunesense_frequency::AudioData;

    fn raw(seed: f32) -> RawFeatures {
        RawFeatures {
            mfcc: Some(vec![seed; 13]),
            chroma: Some(vec![0.5; 12]),
            spec_contrast: Some(vec![20.0; 7]),
            tempo: Some(TempoValue::Scalar(100.0 + seed)),
            centroid: Some(1000.0),
            rms: Some(0.1),
            zcr: Some(0.05),
        }
    }

    fn sine(freq: f32) -> AudioData {
        let samples = (0..22_050)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 22_050.0).sin())
            .collect();
        AudioData::new(samples, 22_050)
    }

    #[test]
    fn test_insert_rejects_duplicates_and_wrong_width() {
        let mut table = FeatureTable::new(FeatureSchema::V1);
        table.insert(TrackId(1), FeatureVector::new(vec![0.0; 36])).unwrap();
        assert!(matches!(
            table.insert(TrackId(1), FeatureVector::new(vec![0.0; 36])),
            Err(Error::DuplicateIdentifier(TrackId(1)))
        ));
        assert!(matches!(
            table.insert(TrackId(2), FeatureVector::new(vec![0.0; 35])),
            Err(Error::SchemaViolation { track_id: TrackId(2), .. })
        ));
    }

    #[test]
    fn test_records_are_order_independent() {
        let builder = TableBuilder::default();
        let forward = vec![(TrackId(3), raw(3.0)), (TrackId(1), raw(1.0)), (TrackId(2), raw(2.0))];
        let mut backward = forward.clone();
        backward.reverse();

        let (a, _) = builder.build_from_records(forward).unwrap();
        let (b, _) = builder.build_from_records(backward).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.ids(), vec![TrackId(1), TrackId(2), TrackId(3)]);
    }

    #[test]
    fn test_schema_declared_from_first_row() {
        let builder = TableBuilder::default();
        let mut short = raw(1.0);
        short.mfcc = Some(vec![1.0; 20]);

        // Lowest identifier declares 20 coefficients; the V1 row then violates it
        let err = builder
            .build_from_records(vec![(TrackId(5), raw(5.0)), (TrackId(1), short)])
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { track_id: TrackId(5), .. }));
    }

    #[test]
    fn test_absent_fields_are_zero_filled_and_counted() {
        let builder = TableBuilder::default();
        let mut partial = raw(2.0);
        partial.chroma = None;
        partial.zcr = None;

        let (table, report) = builder
            .build_from_records(vec![(TrackId(1), raw(1.0)), (TrackId(2), partial)])
            .unwrap();
        assert_eq!(report.filled_defaults, 2);
        let row = table.get(TrackId(2)).unwrap();
        assert_eq!(row.get(table.schema(), "chroma_4"), Some(0.0));
        assert_eq!(row.get(table.schema(), "zcr"), Some(0.0));
    }

    #[test]
    fn test_non_finite_coefficients_do_not_poison_the_table() {
        let builder = TableBuilder::default();
        let mut broken = raw(2.0);
        if let Some(mfcc) = broken.mfcc.as_mut() {
            mfcc[0] = f32::NAN;
        }

        let (table, report) = builder
            .build_from_records(vec![(TrackId(1), raw(1.0)), (TrackId(2), broken), (TrackId(3), raw(3.0))])
            .unwrap();
        assert_eq!(report.filled_defaults, 1);
        assert_eq!(table.get(TrackId(2)).unwrap().get(table.schema(), "mfcc_0"), Some(0.0));
        assert_eq!(FeatureTable::from_json(&table.to_json().unwrap()).unwrap(), table);

        let (joined, _) = crate::join::MetadataJoiner::new().join(&table, &crate::metadata::MetadataTable::new());
        let index = crate::index::NeighborIndex::build(&joined, &tunesense_core::IndexConfig::default()).unwrap();
        let neighbors = index.query_track(TrackId(1), 2).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors.iter().all(|n| n.distance.is_finite()));
    }

    #[test]
    fn test_insert_rejects_non_finite_values() {
        let mut table = FeatureTable::new(FeatureSchema::V1);
        let mut values = vec![0.0; 36];
        values[35] = f32::INFINITY;
        match table.insert(TrackId(4), FeatureVector::new(values)) {
            Err(Error::SchemaViolation { track_id, detail }) => {
                assert_eq!(track_id, TrackId(4));
                assert!(detail.contains("zcr"));
            }
            other => panic!("expected a schema violation, got {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_records_are_fatal() {
        let builder = TableBuilder::default();
        let err = builder
            .build_from_records(vec![(TrackId(7), raw(1.0)), (TrackId(7), raw(2.0))])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier(TrackId(7))));
    }

    #[test]
    fn test_corpus_build_records_failures() {
        let builder = TableBuilder::default();
        let corpus = vec![
            CorpusEntry::new(TrackId(2), sine(440.0)),
            CorpusEntry::new(TrackId(1), sine(220.0)),
            CorpusEntry::new(TrackId(3), AudioData::new(vec![0.0; 22_050], 22_050)),
        ];

        let (table, report) = builder.build(&corpus).unwrap();
        assert_eq!(table.ids(), vec![TrackId(1), TrackId(2)]);
        assert_eq!(report.rows, 2);
        assert_eq!(report.failed_ids(), vec![TrackId(3)]);
        assert_eq!(report.failed[0].code, "EXTRACTION_FAILURE");
        assert!(report.failed[0].reason.contains(&ExtractionFailure::Silent.to_string()));
    }

    #[test]
    fn test_parallel_and_sequential_builds_agree() {
        let corpus: Vec<CorpusEntry> = (1..=4)
            .map(|i| CorpusEntry::new(TrackId(i), sine(110.0 * i as f32)))
            .collect();

        let parallel = TableBuilder::default();
        let sequential = TableBuilder::new(
            ExtractionConfig::default(),
            BuildConfig {
                parallel: false,
                ..BuildConfig::default()
            },
        );

        let (a, _) = parallel.build(&corpus).unwrap();
        let (b, _) = sequential.build(&corpus).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn test_limit_caps_processed_entries() {
        let builder = TableBuilder::new(
            ExtractionConfig::default(),
            BuildConfig {
                limit: Some(2),
                ..BuildConfig::default()
            },
        );
        let records = (1..=5).map(|i| (TrackId(i), raw(i as f32))).collect();
        let (table, _) = builder.build_from_records(records).unwrap();
        assert_eq!(table.ids(), vec![TrackId(1), TrackId(2)]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");

        let (table, _) = TableBuilder::default()
            .build_from_records(vec![(TrackId(1), raw(1.0)), (TrackId(2), raw(2.0))])
            .unwrap();
        table.save(&path).unwrap();
        assert_eq!(FeatureTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_read_jsonl_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let lines = [
            r#"{"track_id": "000002.mp3", "mfcc": [1,1,1,1,1,1,1,1,1,1,1,1,1], "tempo": "[117.5]"}"#,
            "",
            r#"{"track_id": 5, "tempo": [99.0], "rms": 0.2}"#,
            r#"{"track_id": "cover.jpg", "tempo": 80}"#,
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();

        let (table, report) = TableBuilder::default().build_from_jsonl(&path).unwrap();
        assert_eq!(table.ids(), vec![TrackId(2), TrackId(5)]);
        assert_eq!(report.unidentified, 1);
        assert_eq!(table.get(TrackId(2)).unwrap().get(table.schema(), "tempo"), Some(117.5));
        assert_eq!(table.get(TrackId(5)).unwrap().get(table.schema(), "tempo"), Some(99.0));
    }
}
