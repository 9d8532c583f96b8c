//! Clip-level feature extraction.

use ndarray::Array2;
use tracing::{debug, instrument};

use tunesense_core::{
    ExtractionConfig, ExtractionFailure, FeatureSchema, FeatureVector, RawFeatures, Result, TempoValue, TrackId,
};

use crate::chroma::ChromaMap;
use crate::contrast::ContrastBands;
use crate::fft::{rms, spectral_centroid, zero_crossing_rate, FrequencyAnalyzer};
use crate::mel::{dct_basis, log_mel_spectrogram, mean_mfcc, MelFilterbank};
use crate::tempo::{onset_envelope, TempoEstimator};
use crate::types::AudioData;

/// Dynamic range kept in the log-mel spectrogram (dB).
const TOP_DB: f32 = 80.0;
/// Lowest spectral-contrast band edge above the DC band (Hz).
const CONTRAST_FMIN: f32 = 200.0;
/// Fraction of a band averaged for its peak and valley.
const CONTRAST_QUANTILE: f32 = 0.02;

/// Turns a decoded mono clip into time-averaged statistics.
///
/// All analysis tables are built once; `extract` only reads them, so a
/// single extractor can be shared across threads.
pub struct FeatureExtractor {
    config: ExtractionConfig,
    schema: FeatureSchema,
    analyzer: FrequencyAnalyzer,
    mel: MelFilterbank,
    dct: Array2<f32>,
    chroma: ChromaMap,
    contrast: ContrastBands,
    tempo: TempoEstimator,
}

impl FeatureExtractor {
    /// Create an extractor producing the current schema.
    pub fn new(config: ExtractionConfig) -> Self {
        let schema = FeatureSchema::V1;
        let analyzer = FrequencyAnalyzer::new(config.frame_size, config.hop_size);
        let frequencies = analyzer.bin_frequencies(config.sample_rate);

        Self {
            mel: MelFilterbank::new(config.n_mels, config.frame_size, config.sample_rate),
            dct: dct_basis(schema.mfcc, config.n_mels),
            chroma: ChromaMap::new(schema.chroma, &frequencies),
            contrast: ContrastBands::new(schema.spectral_contrast - 1, CONTRAST_FMIN, CONTRAST_QUANTILE, &frequencies),
            tempo: TempoEstimator::new(config.sample_rate, config.hop_size),
            analyzer,
            schema,
            config,
        }
    }

    /// Schema of every vector this extractor produces.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Analysis parameters.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract per-clip statistics.
    ///
    /// The clip must be at the configured rate. Clips longer than the
    /// configured maximum are truncated; shorter clips are not padded.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> std::result::Result<RawFeatures, ExtractionFailure> {
        if sample_rate != self.config.sample_rate {
            return Err(ExtractionFailure::SampleRate {
                expected: self.config.sample_rate,
                actual: sample_rate,
            });
        }
        if samples.is_empty() {
            return Err(ExtractionFailure::Empty);
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ExtractionFailure::NonFinite { index });
        }

        let samples = &samples[..samples.len().min(self.config.max_samples())];

        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak < self.config.silence_threshold {
            return Err(ExtractionFailure::Silent);
        }

        let spectrogram = self.analyzer.spectrogram(samples, sample_rate)?;
        let n_frames = spectrogram.num_frames() as f32;

        let centroid = spectrogram
            .frames
            .iter()
            .map(|frame| spectral_centroid(frame, &spectrogram.frequencies))
            .sum::<f32>()
            / n_frames;

        let (rms_sum, zcr_sum) = self
            .analyzer
            .frames(samples)
            .fold((0.0f32, 0.0f32), |(r, z), frame| (r + rms(frame), z + zero_crossing_rate(frame)));

        let power: Vec<Vec<f32>> = spectrogram
            .frames
            .iter()
            .map(|frame| frame.iter().map(|m| m * m).collect())
            .collect();

        let log_mel = log_mel_spectrogram(&self.mel, &power, TOP_DB);
        let mfcc = mean_mfcc(&log_mel, &self.dct);
        let chroma = self.chroma.mean(&power);
        let contrast = self.contrast.mean(&spectrogram.frames);
        let tempo = self.tempo.estimate(&onset_envelope(&log_mel));

        debug!(frames = spectrogram.num_frames(), tempo, centroid, "Extracted clip features");

        Ok(RawFeatures {
            mfcc: Some(mfcc),
            chroma: Some(chroma),
            spec_contrast: Some(contrast),
            tempo: Some(TempoValue::Scalar(tempo)),
            centroid: Some(centroid),
            rms: Some(rms_sum / n_frames),
            zcr: Some(zcr_sum / n_frames),
        })
    }

    /// Extract statistics from decoded audio.
    pub fn extract_audio(&self, audio: &AudioData) -> std::result::Result<RawFeatures, ExtractionFailure> {
        self.extract(&audio.samples, audio.sample_rate)
    }

    /// Extract a vector laid out in this extractor's schema.
    pub fn extract_vector(&self, track_id: TrackId, audio: &AudioData) -> Result<FeatureVector> {
        let raw = self.extract_audio(audio)?;
        Ok(raw.conform(&self.schema, track_id)?.vector)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::tests::generate_sine_wave;
    use crate::tempo::tests::click_track;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::default()
    }

    #[test]
    fn test_extractor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FeatureExtractor>();
    }

    #[test]
    fn test_full_record() {
        let samples = generate_sine_wave(440.0, 22_050, 2.0);
        let raw = extractor().extract(&samples, 22_050).unwrap();

        assert_eq!(raw.mfcc.as_ref().map(Vec::len), Some(13));
        assert_eq!(raw.chroma.as_ref().map(Vec::len), Some(12));
        assert_eq!(raw.spec_contrast.as_ref().map(Vec::len), Some(7));

        let conformed = raw.conform(&FeatureSchema::V1, TrackId(1)).unwrap();
        assert_eq!(conformed.filled_defaults, 0);
        assert_eq!(conformed.vector.len(), 36);

        let centroid = raw.centroid.unwrap();
        assert!((centroid - 440.0).abs() < 150.0, "centroid {centroid}");
        assert!((raw.rms.unwrap() - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn test_deterministic() {
        let samples = generate_sine_wave(330.0, 22_050, 1.5);
        let extractor = extractor();
        let first = extractor.extract(&samples, 22_050).unwrap();
        let second = extractor.extract(&samples, 22_050).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failures() {
        let extractor = extractor();
        assert_eq!(extractor.extract(&[], 22_050), Err(ExtractionFailure::Empty));
        assert_eq!(extractor.extract(&[0.0; 4096], 22_050), Err(ExtractionFailure::Silent));
        assert_eq!(
            extractor.extract(&[0.5; 1000], 22_050),
            Err(ExtractionFailure::TooShort { samples: 1000, required: 2048 })
        );
        assert_eq!(
            extractor.extract(&[0.1, f32::NAN, 0.2], 22_050),
            Err(ExtractionFailure::NonFinite { index: 1 })
        );
        assert_eq!(
            extractor.extract(&[0.5; 4096], 44_100),
            Err(ExtractionFailure::SampleRate { expected: 22_050, actual: 44_100 })
        );
    }

    #[test]
    fn test_long_clips_are_truncated() {
        let config = ExtractionConfig {
            max_duration_secs: 1.0,
            ..ExtractionConfig::default()
        };
        let extractor = FeatureExtractor::new(config);

        let one_second = generate_sine_wave(500.0, 22_050, 1.0);
        let mut longer = one_second.clone();
        longer.extend(generate_sine_wave(3000.0, 22_050, 1.0));

        assert_eq!(
            extractor.extract(&one_second, 22_050).unwrap(),
            extractor.extract(&longer, 22_050).unwrap()
        );
    }

    #[test]
    fn test_click_track_tempo() {
        let samples = click_track(120.0, 22_050, 10.0);
        let raw = extractor().extract(&samples, 22_050).unwrap();
        let tempo = raw.tempo.unwrap().unwrap_scalar().unwrap();
        assert!((100.0..=140.0).contains(&tempo), "estimated {tempo} BPM");
    }

    #[test]
    fn test_extract_vector_uses_schema() {
        let audio = AudioData::new(generate_sine_wave(440.0, 22_050, 1.0), 22_050);
        let extractor = extractor();
        let vector = extractor.extract_vector(TrackId(9), &audio).unwrap();
        assert_eq!(vector.len(), extractor.schema().width());
    }
}
