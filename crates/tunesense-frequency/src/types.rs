//! Core types for signal analysis.

/// Decoded mono audio handed to the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// PCM samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u32,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl AudioData {
    /// Create new mono audio data from samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self {
            samples,
            sample_rate,
            channels: 1,
            duration_secs,
        }
    }

    /// Keep at most `max_samples` leading samples.
    pub fn truncate(&mut self, max_samples: usize) {
        if self.samples.len() > max_samples {
            self.samples.truncate(max_samples);
            self.duration_secs = max_samples as f64 / self.sample_rate.max(1) as f64;
        }
    }

    /// Get number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if audio data is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Magnitude spectrogram of a clip.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// One magnitude spectrum per analysis frame (`frame_size / 2 + 1` bins)
    pub frames: Vec<Vec<f32>>,
    /// Center frequency of each bin (Hz)
    pub frequencies: Vec<f32>,
}

impl Spectrogram {
    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of frequency bins per frame.
    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }
}
