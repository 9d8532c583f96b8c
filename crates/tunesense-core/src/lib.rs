//! TuneSense Core - shared types for the audio recommendation pipeline
//!
//! This crate provides the vocabulary every other TuneSense crate speaks:
//! - Track identifiers and their canonical coercion
//! - The versioned feature schema and feature vectors
//! - Descriptive metadata and recommendation results
//! - Pipeline configuration
//! - The error taxonomy
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │  raw audio   │───▶│   Feature    │───▶│    Table     │
//! │  (decoded)   │    │  Extractor   │    │   Builder    │
//! └──────────────┘    └──────────────┘    └──────┬───────┘
//!                                                │
//!                     ┌──────────────┐    ┌──────┴───────┐
//!                     │   Metadata   │───▶│   Joined     │
//!                     │    Source    │    │   Table      │
//!                     └──────────────┘    └──────┬───────┘
//!                                                │
//!                     ┌──────────────┐    ┌──────┴───────┐
//!                     │Recommendation│◀───│   Neighbor   │
//!                     │   Service    │    │    Index     │
//!                     └──────────────┘    └──────────────┘
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod types;

pub use config::{
    BuildConfig, ExtractionConfig, IndexConfig, PipelineConfig, RecommendConfig,
    CANONICAL_SAMPLE_RATE,
};
pub use error::{Error, ExtractionFailure, Result};
pub use features::{Conformed, FeatureSchema, FeatureVector, RawFeatures, TempoValue};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "TuneSense Core initialized");
}
