//! TuneSense Recommend - from audio corpus to ranked recommendations
//!
//! This crate assembles the pieces produced by `tunesense-frequency` into a
//! servable recommender:
//! - **Table building**: parallel extraction into an identifier-ordered
//!   [`FeatureTable`], with a [`BuildReport`] of skipped tracks
//! - **Metadata join**: CSV metadata with hierarchical headers, resolved
//!   through alias lists and left-joined onto the features
//! - **Neighbor index**: exhaustive k-nearest-neighbor search over a scaled
//!   matrix, persisted as a JSON artifact
//! - **Recommendation service**: identifier or audio queries with mandatory
//!   self-exclusion
//! - **Diagnostics**: neighbor reconstruction error and feature comparison
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use tunesense_core::{PipelineConfig, TrackId};
//! use tunesense_frequency::{scan_directory, FeatureExtractor};
//! use tunesense_recommend::{
//!     IndexHandle, MetadataJoiner, MetadataTable, NeighborIndex, RecommendationService, TableBuilder,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::default();
//!     let corpus = scan_directory(Path::new("fma_small"), &config.build.extensions, None)?;
//!
//!     let builder = TableBuilder::new(config.extraction.clone(), config.build.clone());
//!     let (features, report) = builder.build(&corpus)?;
//!     println!("{} rows, {} failed", report.rows, report.failed.len());
//!
//!     let (metadata, _) = MetadataTable::from_csv_file("tracks.csv")?;
//!     let (joined, _) = MetadataJoiner::new().join(&features, &metadata);
//!     let index = NeighborIndex::build(&joined, &config.index)?;
//!
//!     let service = RecommendationService::new(
//!         IndexHandle::new(index),
//!         Arc::new(FeatureExtractor::new(config.extraction)),
//!     );
//!     for result in service.recommend_track(TrackId(2), 5)? {
//!         println!("{} {:.3} {} - {}", result.track_id, result.distance, result.artist, result.title);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod diagnostics;
pub mod index;
pub mod join;
pub mod metadata;
pub mod service;
pub mod table;

pub use diagnostics::{compare, reconstruction, FeatureComparison, ReconstructionReport};
pub use index::{IndexHandle, Neighbor, NeighborIndex, Scaler};
pub use join::{JoinReport, JoinedRow, JoinedTable, MetadataJoiner};
pub use metadata::{MetadataReport, MetadataTable, RawMetadata};
pub use service::{Query, RecommendationService};
pub use table::{BuildReport, FailedTrack, FeatureTable, TableBuilder};
