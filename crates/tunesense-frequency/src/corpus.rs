//! Corpus manifests: identifiers paired with audio sources.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use tunesense_core::{ExtractionConfig, TrackId};

use crate::decode::decode_file;
use crate::types::AudioData;

/// Anything that can produce decoded audio for one track.
pub trait AudioSource: Send + Sync {
    /// Decode to mono at the configured analysis rate.
    fn load(&self, config: &ExtractionConfig) -> Result<AudioData>;

    /// Short human-readable description for logs and reports.
    fn describe(&self) -> String;
}

/// Audio file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for FileSource {
    fn load(&self, config: &ExtractionConfig) -> Result<AudioData> {
        decode_file(&self.path, config).with_context(|| format!("Cannot decode {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Already-decoded audio; no resampling is applied.
impl AudioSource for AudioData {
    fn load(&self, config: &ExtractionConfig) -> Result<AudioData> {
        let mut audio = self.clone();
        audio.truncate(config.max_samples());
        Ok(audio)
    }

    fn describe(&self) -> String {
        format!("{} samples at {} Hz", self.len(), self.sample_rate)
    }
}

/// One manifest line.
#[derive(Clone)]
pub struct CorpusEntry {
    pub track_id: TrackId,
    pub source: Arc<dyn AudioSource>,
}

impl CorpusEntry {
    pub fn new(track_id: TrackId, source: impl AudioSource + 'static) -> Self {
        Self {
            track_id,
            source: Arc::new(source),
        }
    }
}

impl fmt::Debug for CorpusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusEntry")
            .field("track_id", &self.track_id)
            .field("source", &self.source.describe())
            .finish()
    }
}

/// Recursively collect audio files under `root` whose stem yields an identifier.
///
/// Entries come back sorted by identifier, then path, so `limit` always picks
/// the same files. Files sharing an identifier are reduced to the first path.
pub fn scan_directory(root: &Path, extensions: &[String], limit: Option<usize>) -> Result<Vec<CorpusEntry>> {
    let mut found: Vec<(TrackId, PathBuf)> = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).with_context(|| format!("Cannot read directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
            if !matches_ext {
                continue;
            }

            match TrackId::from_path(&path) {
                Some(id) => found.push((id, path)),
                None => debug!(path = %path.display(), "Skipping file without numeric identifier"),
            }
        }
    }

    found.sort();
    // One entry per identifier: the first path in sorted order
    found.dedup_by(|later, kept| {
        let same = later.0 == kept.0;
        if same {
            warn!(
                track_id = %later.0,
                kept = %kept.1.display(),
                skipped = %later.1.display(),
                "Skipping file with repeated identifier"
            );
        }
        same
    });
    if let Some(limit) = limit {
        found.truncate(limit);
    }

    info!(root = %root.display(), files = found.len(), "Scanned corpus directory");

    Ok(found
        .into_iter()
        .map(|(id, path)| CorpusEntry::new(id, FileSource::new(path)))
        .collect())
}

/// Location of a track in the FMA archive layout: `root/123/123456.mp3`
/// for zero-padded identifier `123456`.
pub fn fma_path(root: &Path, track_id: TrackId) -> PathBuf {
    let padded = format!("{:06}", track_id.0);
    root.join(&padded[..3]).join(format!("{}.mp3", padded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["mp3".into(), "wav".into()]
    }

    #[test]
    fn test_fma_path() {
        let root = Path::new("/data/fma_small");
        assert_eq!(fma_path(root, TrackId(2)), root.join("000").join("000002.mp3"));
        assert_eq!(fma_path(root, TrackId(155_066)), root.join("155").join("155066.mp3"));
    }

    #[test]
    fn test_scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("000")).unwrap();
        std::fs::write(dir.path().join("000").join("000005.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("000").join("000002.MP3"), b"").unwrap();
        std::fs::write(dir.path().join("000010.wav"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join("cover.mp3"), b"").unwrap();

        let entries = scan_directory(dir.path(), &extensions(), None).unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![2, 5, 10]);

        let limited = scan_directory(dir.path(), &extensions(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].track_id, TrackId(5));
    }

    #[test]
    fn test_scan_keeps_one_file_per_identifier() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000002.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("2.wav"), b"").unwrap();
        std::fs::write(dir.path().join("000003.mp3"), b"").unwrap();

        let entries = scan_directory(dir.path(), &extensions(), None).unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(entries[0].source.describe().ends_with("000002.mp3"));
    }

    #[test]
    fn test_decoded_audio_source() {
        let audio = AudioData::new(vec![0.1; 100], 22_050);
        let loaded = audio.load(&ExtractionConfig::default()).unwrap();
        assert_eq!(loaded, audio);
        assert!(audio.describe().contains("100 samples"));
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let source = FileSource::new("/nonexistent/000001.mp3");
        assert!(source.load(&ExtractionConfig::default()).is_err());
    }
}
