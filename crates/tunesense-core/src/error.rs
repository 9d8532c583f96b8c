//! Error types for TuneSense Core

use thiserror::Error;

use crate::types::TrackId;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a clip cannot be turned into features.
///
/// Always scoped to a single track: batch callers record it and move on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionFailure {
    #[error("audio buffer is empty")]
    Empty,

    #[error("audio too short: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },

    #[error("non-finite sample at index {index}")]
    NonFinite { index: usize },

    #[error("audio is silent")]
    Silent,

    #[error("unexpected sample rate: expected {expected} Hz, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },

    #[error("spectral analysis failed: {0}")]
    Analysis(String),
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    // Extraction errors
    #[error("Feature extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("Audio source for track {track_id} unavailable: {message}")]
    AudioSource { track_id: TrackId, message: String },

    // Build errors
    #[error("Schema violation at track {track_id}: {detail}")]
    SchemaViolation { track_id: TrackId, detail: String },

    #[error("Duplicate track identifier: {0}")]
    DuplicateIdentifier(TrackId),

    // Join errors
    #[error("Cannot resolve metadata columns {unresolved:?}; available columns: {available:?}")]
    SchemaResolution {
        unresolved: Vec<String>,
        available: Vec<String>,
    },

    #[error("Malformed metadata source: {0}")]
    MalformedMetadata(String),

    // Query errors
    #[error("Unknown track identifier: {0}")]
    UnknownIdentifier(TrackId),

    #[error("Query vector has {actual} columns, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Persistence errors
    #[error("Invalid index artifact: {0}")]
    InvalidArtifact(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a schema violation for a track
    pub fn schema_violation(track_id: TrackId, detail: impl Into<String>) -> Self {
        Error::SchemaViolation {
            track_id,
            detail: detail.into(),
        }
    }

    /// Returns true if the error only affects a single track or query
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Extraction(_) | Error::AudioSource { .. } | Error::UnknownIdentifier(_)
        )
    }

    /// Returns the error code for reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Extraction(_) => "EXTRACTION_FAILURE",
            Error::AudioSource { .. } => "AUDIO_SOURCE",
            Error::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            Error::DuplicateIdentifier(_) => "DUPLICATE_ID",
            Error::SchemaResolution { .. } => "SCHEMA_RESOLUTION",
            Error::MalformedMetadata(_) => "MALFORMED_METADATA",
            Error::UnknownIdentifier(_) => "UNKNOWN_ID",
            Error::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Error::InvalidArtifact(_) => "INVALID_ARTIFACT",
            Error::Serialization(_) => "SERIALIZATION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::from(ExtractionFailure::Silent).is_recoverable());
        assert!(Error::UnknownIdentifier(TrackId(3)).is_recoverable());
        assert!(!Error::DuplicateIdentifier(TrackId(3)).is_recoverable());
        assert!(!Error::schema_violation(TrackId(3), "mfcc has 12 values").is_recoverable());
    }

    #[test]
    fn test_schema_resolution_message_names_field() {
        let err = Error::SchemaResolution {
            unresolved: vec!["genre".to_string()],
            available: vec!["track_id".to_string(), "track_title".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("genre"));
        assert!(message.contains("track_title"));
        assert_eq!(err.error_code(), "SCHEMA_RESOLUTION");
    }
}
