//! TuneSense Frequency - audio signal analysis
//!
//! This crate turns decoded audio into the fixed-length statistics the
//! recommendation index is built from:
//! - **Spectral shape**: centroid, RMS energy, zero-crossing rate
//! - **Timbre**: mean mel-frequency cepstral coefficients
//! - **Harmony**: mean chroma energy per pitch class
//! - **Texture**: spectral contrast per octave band
//! - **Rhythm**: global tempo from the onset-strength autocorrelation
//!
//! It also owns the input side of the pipeline: decoding audio files and
//! scanning a corpus directory into `(identifier, source)` entries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │  Audio file     │───▶│  Decode / mono   │───▶│  STFT (Hann)    │
//! │  (wav/mp3/...)  │    │  22,050 Hz, 30 s │    │  2048 / 512     │
//! └─────────────────┘    └──────────────────┘    └────────┬────────┘
//!                                                         │
//!         ┌──────────────────┬────────────────────────────┼──────────────────┐
//!         ▼                  ▼                            ▼                  ▼
//! ┌───────────────┐  ┌───────────────┐           ┌────────────────┐  ┌───────────────┐
//! │ Log-mel → DCT │  │ Chroma (12)   │           │ Contrast (7)   │  │ Onset → tempo │
//! │ MFCC (13)     │  │               │           │                │  │               │
//! └───────────────┘  └───────────────┘           └────────────────┘  └───────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tunesense_core::{ExtractionConfig, TrackId};
//! use tunesense_frequency::{decode_file, FeatureExtractor};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ExtractionConfig::default();
//!     let audio = decode_file(Path::new("000002.mp3"), &config)?;
//!
//!     let extractor = FeatureExtractor::new(config);
//!     let vector = extractor.extract_vector(TrackId(2), &audio)?;
//!     println!("{} columns", vector.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod chroma;
pub mod contrast;
pub mod corpus;
pub mod decode;
pub mod extractor;
pub mod fft;
pub mod mel;
pub mod tempo;
pub mod types;

pub use corpus::{fma_path, scan_directory, AudioSource, CorpusEntry, FileSource};
pub use decode::decode_file;
pub use extractor::FeatureExtractor;
pub use fft::FrequencyAnalyzer;
pub use types::{AudioData, Spectrogram};
