//! TuneSense CLI - audio similarity pipeline
//!
//! Features:
//! - Single-file feature extraction
//! - Corpus feature tables (audio directories or JSON-lines records)
//! - Metadata join
//! - Neighbor index construction
//! - Recommendations by track or by audio
//! - Feature comparison and reconstruction diagnostics

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tunesense_core::PipelineConfig;

mod commands;
mod output;

/// TuneSense CLI - music recommendation toolkit
#[derive(Parser)]
#[command(name = "tunesense")]
#[command(version)]
#[command(about = "Audio feature extraction and nearest-neighbor recommendations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the feature vector of one audio file
    Extract {
        /// Audio file
        #[arg(required_unless_present = "track")]
        input: Option<PathBuf>,

        /// Track identifier, resolved inside --fma-root
        #[arg(long, requires = "fma_root", conflicts_with = "input")]
        track: Option<u64>,

        /// Root of an FMA-style archive (root/000/000123.mp3)
        #[arg(long)]
        fma_root: Option<PathBuf>,
    },

    /// Build a feature table from an audio directory or raw records
    Build {
        /// Directory scanned recursively for audio files
        #[arg(required_unless_present = "records", conflicts_with = "records")]
        corpus: Option<PathBuf>,

        /// JSON-lines file of pre-extracted feature records
        #[arg(long)]
        records: Option<PathBuf>,

        /// Output feature table
        #[arg(short, long, default_value = "features.json")]
        output: PathBuf,

        /// Process at most this many tracks
        #[arg(short, long)]
        limit: Option<usize>,

        /// Extract on a single thread
        #[arg(long)]
        sequential: bool,

        /// Write the build report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Attach CSV metadata to a feature table
    Join {
        /// Feature table from `build`
        features: PathBuf,

        /// Metadata CSV (one to three header rows)
        metadata: PathBuf,

        /// Output joined table
        #[arg(short, long, default_value = "joined.json")]
        output: PathBuf,
    },

    /// Build a neighbor index artifact
    Index {
        /// Joined table from `join`
        joined: PathBuf,

        /// Output artifact
        #[arg(short, long, default_value = "index.json")]
        output: PathBuf,

        /// Distance metric (euclidean, manhattan, cosine)
        #[arg(short, long)]
        metric: Option<String>,

        /// Column scaling (standard, none)
        #[arg(short, long)]
        scaling: Option<String>,
    },

    /// Recommend tracks similar to an indexed track or an audio file
    Recommend {
        /// Index artifact
        index: PathBuf,

        /// Query track identifier
        #[arg(short, long, required_unless_present = "audio")]
        track: Option<u64>,

        /// Query audio file; --track then names the file's own identifier
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Number of results
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// Show selected features of two indexed tracks side by side
    Compare {
        /// Index artifact
        index: PathBuf,

        /// Query track identifier
        query: u64,

        /// Candidate track identifier
        candidate: u64,

        /// Feature columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Measure how well neighbors reconstruct each track
    Evaluate {
        /// Index artifact
        index: PathBuf,

        /// Neighbors per track
        #[arg(short = 'k', long, default_value = "5")]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    tunesense_core::init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Extract { input, track, fma_root } => {
            commands::extract(input, track, fma_root, &config, &cli.format).await?;
        }
        Commands::Build { corpus, records, output, limit, sequential, report } => {
            let mut build = config.build.clone();
            build.limit = limit.or(build.limit);
            build.parallel = build.parallel && !sequential;
            let source = match (corpus, records) {
                (_, Some(records)) => commands::BuildSource::Records(records),
                (Some(dir), None) => commands::BuildSource::Directory(dir),
                (None, None) => anyhow::bail!("either a corpus directory or --records is required"),
            };
            commands::build(source, &output, report, config.extraction.clone(), build, &cli.format).await?;
        }
        Commands::Join { features, metadata, output } => {
            commands::join(&features, &metadata, &output, &cli.format).await?;
        }
        Commands::Index { joined, output, metric, scaling } => {
            commands::index(&joined, &output, metric.as_deref(), scaling.as_deref(), &config, &cli.format).await?;
        }
        Commands::Recommend { index, track, audio, k } => {
            let k = k.unwrap_or(config.recommend.default_k);
            commands::recommend(&index, track, audio, k, &config, &cli.format).await?;
        }
        Commands::Compare { index, query, candidate, columns } => {
            commands::compare(&index, query, candidate, &columns, &cli.format).await?;
        }
        Commands::Evaluate { index, k } => {
            commands::evaluate(&index, k, &cli.format).await?;
        }
    }

    Ok(())
}
