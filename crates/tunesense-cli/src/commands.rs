//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

use tunesense_core::{BuildConfig, DistanceMetric, ExtractionConfig, PipelineConfig, ScalingKind, TrackId};
use tunesense_frequency::{decode_file, fma_path, scan_directory, FeatureExtractor};
use tunesense_recommend::diagnostics::DEFAULT_COMPARISON_COLUMNS;
use tunesense_recommend::{
    compare as compare_tracks, reconstruction, BuildReport, FeatureTable, IndexHandle, JoinReport, JoinedTable,
    MetadataJoiner, MetadataReport, MetadataTable, NeighborIndex, Query, RecommendationService, TableBuilder,
};

use crate::output::{self, ComparisonRow, FailureRow, FeatureRow, RecommendationRow, StatRow};

/// Where `build` reads its tracks from
pub enum BuildSource {
    /// Audio files found by scanning a directory
    Directory(PathBuf),
    /// Pre-extracted JSON-lines records
    Records(PathBuf),
}

#[derive(Serialize)]
struct ExtractedVector {
    track_id: TrackId,
    columns: Vec<String>,
    values: Vec<f32>,
}

/// Decode one file and print its feature vector
pub async fn extract(
    input: Option<PathBuf>,
    track: Option<u64>,
    fma_root: Option<PathBuf>,
    config: &PipelineConfig,
    format: &str,
) -> anyhow::Result<()> {
    let (path, track_id) = match (input, track, fma_root) {
        (Some(path), _, _) => {
            let id = TrackId::from_path(&path).unwrap_or(TrackId(0));
            (path, id)
        }
        (None, Some(id), Some(root)) => (fma_path(&root, TrackId(id)), TrackId(id)),
        _ => anyhow::bail!("an audio file or --track with --fma-root is required"),
    };

    let extraction = config.extraction.clone();
    let extracted = tokio::task::spawn_blocking(move || -> anyhow::Result<ExtractedVector> {
        let audio = decode_file(&path, &extraction)?;
        debug!(samples = audio.len(), "Decoded query audio");
        let extractor = FeatureExtractor::new(extraction);
        let vector = extractor
            .extract_vector(track_id, &audio)
            .with_context(|| format!("Feature extraction failed for {}", path.display()))?;
        Ok(ExtractedVector {
            track_id,
            columns: extractor.schema().columns(),
            values: vector.into_inner(),
        })
    })
    .await??;

    let rows = extracted
        .columns
        .iter()
        .zip(&extracted.values)
        .map(|(column, value)| FeatureRow {
            column: column.clone(),
            value: format!("{:.6}", value),
        })
        .collect();
    println!("{}", output::render(&extracted, rows, format));
    Ok(())
}

/// Build a feature table and save it
pub async fn build(
    source: BuildSource,
    output_path: &Path,
    report_path: Option<PathBuf>,
    extraction: ExtractionConfig,
    config: BuildConfig,
    format: &str,
) -> anyhow::Result<()> {
    let quiet = output::is_json(format);
    let builder = TableBuilder::new(extraction, config.clone());

    let (table, report) = match source {
        BuildSource::Records(path) => tokio::task::spawn_blocking(move || builder.build_from_jsonl(&path)).await??,
        BuildSource::Directory(dir) => {
            let corpus = scan_directory(&dir, &config.extensions, config.limit)?;
            if corpus.is_empty() {
                anyhow::bail!("No audio files with numeric identifiers under {}", dir.display());
            }

            let pb = output::progress_bar(corpus.len() as u64, "Extracting")?;
            if quiet {
                pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
            }
            tokio::task::spawn_blocking(move || {
                let built = builder.build_with_progress(&corpus, &|| pb.inc(1));
                pb.finish_and_clear();
                built
            })
            .await??
        }
    };

    table
        .save(output_path)
        .with_context(|| format!("Cannot write {}", output_path.display()))?;
    if let Some(path) = &report_path {
        std::fs::write(path, output::format_output(&report))?;
    }

    if !quiet {
        output::success(&format!("{} rows written to {}", report.rows, output_path.display()));
        if !report.failed.is_empty() {
            output::warning(&format!("{} tracks skipped", report.failed.len()));
        }
    }
    println!("{}", render_build_report(&report, format));
    Ok(())
}

fn render_build_report(report: &BuildReport, format: &str) -> String {
    if report.failed.is_empty() || output::is_json(format) {
        let rows = vec![
            StatRow::new("Rows", report.rows),
            StatRow::new("Failed", report.failed.len()),
            StatRow::new("Filled defaults", report.filled_defaults),
            StatRow::new("Unidentified records", report.unidentified),
        ];
        return output::render(report, rows, format);
    }
    let rows: Vec<FailureRow> = report.failed.iter().map(FailureRow::from).collect();
    output::render(report, rows, format)
}

#[derive(Serialize)]
struct JoinSummary {
    metadata: MetadataReport,
    join: JoinReport,
}

/// Attach metadata to a feature table
pub async fn join(features: &Path, metadata: &Path, output_path: &Path, format: &str) -> anyhow::Result<()> {
    let features = FeatureTable::load(features)
        .with_context(|| format!("Cannot read feature table {}", features.display()))?;
    let (metadata_table, metadata_report) = MetadataTable::from_csv_file(metadata)
        .with_context(|| format!("Cannot read metadata {}", metadata.display()))?;

    let (joined, join_report) = MetadataJoiner::new().join(&features, &metadata_table);
    joined.save(output_path)?;

    if !output::is_json(format) {
        output::success(&format!("{} rows written to {}", joined.len(), output_path.display()));
    }
    let rows = vec![
        StatRow::new("Metadata records", metadata_report.rows),
        StatRow::new("Dropped records", metadata_report.dropped),
        StatRow::new("Duplicate records", metadata_report.duplicates),
        StatRow::new("Feature rows", join_report.rows),
        StatRow::new("Matched", join_report.matched),
        StatRow::new("Without metadata", join_report.unmatched_features),
        StatRow::new("Ignored metadata", join_report.ignored_metadata),
    ];
    let summary = JoinSummary {
        metadata: metadata_report,
        join: join_report,
    };
    println!("{}", output::render(&summary, rows, format));
    Ok(())
}

#[derive(Serialize)]
struct IndexSummary {
    tracks: usize,
    columns: usize,
    metric: DistanceMetric,
    scaling: ScalingKind,
    built_at: String,
}

/// Build a neighbor index artifact from a joined table
pub async fn index(
    joined: &Path,
    output_path: &Path,
    metric: Option<&str>,
    scaling: Option<&str>,
    config: &PipelineConfig,
    format: &str,
) -> anyhow::Result<()> {
    let mut index_config = config.index.clone();
    if let Some(name) = metric {
        index_config.metric =
            DistanceMetric::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown distance metric '{}'", name))?;
    }
    if let Some(name) = scaling {
        index_config.scaling =
            ScalingKind::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown scaling '{}'", name))?;
    }

    let table = JoinedTable::load(joined).with_context(|| format!("Cannot read joined table {}", joined.display()))?;
    let index = tokio::task::spawn_blocking(move || NeighborIndex::build(&table, &index_config)).await??;
    index.save(output_path)?;

    if !output::is_json(format) {
        output::success(&format!("Index written to {}", output_path.display()));
    }
    let summary = IndexSummary {
        tracks: index.len(),
        columns: index.schema().width(),
        metric: index.metric(),
        scaling: index.scaler().kind,
        built_at: index.built_at().to_rfc3339(),
    };
    let rows = vec![
        StatRow::new("Tracks", summary.tracks),
        StatRow::new("Columns", summary.columns),
        StatRow::new("Metric", summary.metric),
        StatRow::new("Scaling", format!("{:?}", summary.scaling).to_lowercase()),
        StatRow::new("Built", &summary.built_at),
    ];
    println!("{}", output::render(&summary, rows, format));
    Ok(())
}

/// Recommend tracks for an indexed track or an audio file
pub async fn recommend(
    index_path: &Path,
    track: Option<u64>,
    audio: Option<PathBuf>,
    k: usize,
    config: &PipelineConfig,
    format: &str,
) -> anyhow::Result<()> {
    let index = NeighborIndex::load(index_path)
        .with_context(|| format!("Cannot load index {}", index_path.display()))?;
    let extraction = config.extraction.clone();

    let results = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let query = match audio {
            Some(path) => Query::Audio {
                audio: decode_file(&path, &extraction)?,
                track_id: track.map(TrackId),
            },
            None => match track {
                Some(id) => Query::Track(TrackId(id)),
                None => anyhow::bail!("--track or --audio is required"),
            },
        };
        let service = RecommendationService::new(IndexHandle::new(index), Arc::new(FeatureExtractor::new(extraction)));
        Ok(service.recommend(&query, k)?)
    })
    .await??;

    if results.is_empty() && !output::is_json(format) {
        output::warning("No other tracks in the index");
    }
    println!("{}", output::render(&results, RecommendationRow::from_results(&results), format));
    Ok(())
}

/// Compare selected features of two indexed tracks
pub async fn compare(index_path: &Path, query: u64, candidate: u64, columns: &[String], format: &str) -> anyhow::Result<()> {
    let index = NeighborIndex::load(index_path)
        .with_context(|| format!("Cannot load index {}", index_path.display()))?;

    let names: Vec<&str> = if columns.is_empty() {
        DEFAULT_COMPARISON_COLUMNS.to_vec()
    } else {
        columns.iter().map(String::as_str).collect()
    };
    let comparison = compare_tracks(&index, TrackId(query), TrackId(candidate), &names)?;

    let rows = comparison.features.iter().map(ComparisonRow::from).collect();
    println!("{}", output::render(&comparison, rows, format));
    Ok(())
}

/// Report neighbor reconstruction error
pub async fn evaluate(index_path: &Path, k: usize, format: &str) -> anyhow::Result<()> {
    let index = NeighborIndex::load(index_path)
        .with_context(|| format!("Cannot load index {}", index_path.display()))?;
    let report = tokio::task::spawn_blocking(move || reconstruction(&index, k)).await??;

    let rows = vec![
        StatRow::new("Neighbors", report.k),
        StatRow::new("Tracks evaluated", report.evaluated),
        StatRow::new("MSE", format!("{:.6}", report.mse)),
        StatRow::new("R²", format!("{:.4}", report.r2)),
    ];
    println!("{}", output::render(&report, rows, format));
    Ok(())
}
