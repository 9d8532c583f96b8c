//! FFT-based frame analysis core.
//!
//! Frames are taken without padding: a clip of `n` samples yields
//! `(n - frame_size) / hop_size + 1` frames, so anything shorter than one
//! frame has no analysis at all.

use std::sync::Arc;

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use tracing::debug;

use tunesense_core::ExtractionFailure;

use crate::types::Spectrogram;

/// Short-time Fourier analyzer with a Hann window.
pub struct FrequencyAnalyzer {
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl FrequencyAnalyzer {
    /// Create a new frequency analyzer.
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        // Periodic Hann window
        let window: Vec<f32> = (0..frame_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / frame_size as f32).cos()))
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);

        Self {
            frame_size,
            hop_size,
            window,
            fft,
        }
    }

    /// Frame length in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Hop between frames in samples.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of complete frames in a clip of `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        if len < self.frame_size {
            0
        } else {
            (len - self.frame_size) / self.hop_size + 1
        }
    }

    /// Iterate over the raw (unwindowed) frames of a clip.
    pub fn frames<'a>(&self, samples: &'a [f32]) -> impl Iterator<Item = &'a [f32]> + 'a {
        let frame_size = self.frame_size;
        let hop_size = self.hop_size;
        (0..self.num_frames(samples.len())).map(move |i| &samples[i * hop_size..i * hop_size + frame_size])
    }

    /// Center frequency of every positive-frequency bin.
    pub fn bin_frequencies(&self, sample_rate: u32) -> Vec<f32> {
        (0..=self.frame_size / 2)
            .map(|i| i as f32 * sample_rate as f32 / self.frame_size as f32)
            .collect()
    }

    /// Compute the magnitude spectrogram (time-frequency representation).
    pub fn spectrogram(&self, samples: &[f32], sample_rate: u32) -> Result<Spectrogram, ExtractionFailure> {
        let num_frames = self.num_frames(samples.len());
        if num_frames == 0 {
            return Err(ExtractionFailure::TooShort {
                samples: samples.len(),
                required: self.frame_size,
            });
        }

        let mut input = self.fft.make_input_vec();
        let mut output: Vec<Complex<f32>> = self.fft.make_output_vec();
        let mut frames = Vec::with_capacity(num_frames);

        for frame in self.frames(samples) {
            for ((slot, &s), &w) in input.iter_mut().zip(frame.iter()).zip(self.window.iter()) {
                *slot = s * w;
            }

            self.fft
                .process(&mut input, &mut output)
                .map_err(|e| ExtractionFailure::Analysis(e.to_string()))?;

            frames.push(output.iter().map(|c| c.norm()).collect());
        }

        debug!(frames = num_frames, bins = self.frame_size / 2 + 1, "Computed spectrogram");

        Ok(Spectrogram {
            frames,
            frequencies: self.bin_frequencies(sample_rate),
        })
    }
}

/// Spectral centroid (center of mass of a magnitude spectrum).
pub fn spectral_centroid(spectrum: &[f32], frequencies: &[f32]) -> f32 {
    let weighted_sum: f32 = spectrum
        .iter()
        .zip(frequencies.iter())
        .map(|(&mag, &freq)| mag * freq)
        .sum();

    let total_mag: f32 = spectrum.iter().sum();

    if total_mag > 0.0 {
        weighted_sum / total_mag
    } else {
        0.0
    }
}

/// Fraction of adjacent sample pairs that change sign.
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }

    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();

    crossings as f32 / frame.len() as f32
}

/// Root-mean-square amplitude of a frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Convert a power value to decibels with a floor.
pub fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(1e-10).log10()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn generate_sine_wave(freq: f32, sample_rate: u32, duration_secs: f32) -> Vec<f32> {
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_frame_count() {
        let analyzer = FrequencyAnalyzer::new(2048, 512);
        assert_eq!(analyzer.num_frames(2047), 0);
        assert_eq!(analyzer.num_frames(2048), 1);
        assert_eq!(analyzer.num_frames(2048 + 511), 1);
        assert_eq!(analyzer.num_frames(2048 + 512), 2);
    }

    #[test]
    fn test_too_short_for_a_frame() {
        let analyzer = FrequencyAnalyzer::new(2048, 512);
        let err = analyzer.spectrogram(&[0.5; 100], 22_050).unwrap_err();
        assert_eq!(err, ExtractionFailure::TooShort { samples: 100, required: 2048 });
    }

    #[test]
    fn test_spectrogram_peak_bin() {
        let sample_rate = 22_050;
        let samples = generate_sine_wave(1000.0, sample_rate, 0.5);
        let analyzer = FrequencyAnalyzer::new(2048, 512);
        let spectrogram = analyzer.spectrogram(&samples, sample_rate).unwrap();

        assert_eq!(spectrogram.num_bins(), 1025);
        let frame = &spectrogram.frames[0];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((spectrogram.frequencies[peak] - 1000.0).abs() < 15.0);
    }

    #[test]
    fn test_spectral_centroid() {
        let sample_rate = 22_050;
        let analyzer = FrequencyAnalyzer::new(2048, 512);

        let low = analyzer.spectrogram(&generate_sine_wave(100.0, sample_rate, 0.5), sample_rate).unwrap();
        let high = analyzer.spectrogram(&generate_sine_wave(5000.0, sample_rate, 0.5), sample_rate).unwrap();

        let low_centroid = spectral_centroid(&low.frames[0], &low.frequencies);
        let high_centroid = spectral_centroid(&high.frames[0], &high.frequencies);

        // High frequency signal should have higher centroid
        assert!(high_centroid > low_centroid);
    }

    #[test]
    fn test_rms_of_sine() {
        let samples = generate_sine_wave(441.0, 22_050, 1.0);
        let value = rms(&samples);
        assert!((value - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }

    #[test]
    fn test_zero_crossing_rate() {
        let low = generate_sine_wave(100.0, 22_050, 1.0);
        let high = generate_sine_wave(2000.0, 22_050, 1.0);
        assert!(zero_crossing_rate(&high) > zero_crossing_rate(&low));
        assert_eq!(zero_crossing_rate(&[]), 0.0);
    }
}
