//! Global tempo estimation.
//!
//! The onset-strength envelope is the half-wave rectified frame-to-frame
//! increase of the log-mel spectrogram, averaged over bands. Its
//! autocorrelation, weighted by a log-normal prior over BPM, picks the
//! dominant beat period.

use ndarray::Array2;
use tracing::trace;

/// Onset strength per frame from a log-mel spectrogram (bands × frames).
///
/// The first frame has no predecessor and is zero.
pub fn onset_envelope(log_mel: &Array2<f32>) -> Vec<f32> {
    let (n_bands, n_frames) = log_mel.dim();
    let mut envelope = vec![0.0f32; n_frames];
    if n_bands == 0 {
        return envelope;
    }

    for t in 1..n_frames {
        let flux: f32 = log_mel
            .column(t)
            .iter()
            .zip(log_mel.column(t - 1).iter())
            .map(|(now, before)| (now - before).max(0.0))
            .sum();
        envelope[t] = flux / n_bands as f32;
    }

    envelope
}

/// Autocorrelation tempo estimator.
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    frame_rate: f32,
    min_bpm: f32,
    max_bpm: f32,
    prior_bpm: f32,
    prior_octaves: f32,
}

impl TempoEstimator {
    /// Estimator for envelopes sampled every `hop_size` samples.
    pub fn new(sample_rate: u32, hop_size: usize) -> Self {
        Self {
            frame_rate: sample_rate as f32 / hop_size as f32,
            min_bpm: 30.0,
            max_bpm: 300.0,
            prior_bpm: 120.0,
            prior_octaves: 1.0,
        }
    }

    fn lag_to_bpm(&self, lag: f32) -> f32 {
        60.0 * self.frame_rate / lag
    }

    fn prior(&self, bpm: f32) -> f32 {
        let octaves = (bpm / self.prior_bpm).log2() / self.prior_octaves;
        (-0.5 * octaves * octaves).exp()
    }

    /// Estimate tempo in BPM; 0 when the envelope carries no periodicity.
    pub fn estimate(&self, envelope: &[f32]) -> f32 {
        let n = envelope.len();
        if n < 3 {
            return 0.0;
        }

        let mean = envelope.iter().sum::<f32>() / n as f32;
        let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();
        let energy: f32 = centered.iter().map(|v| v * v).sum();
        if energy <= f32::EPSILON {
            return 0.0;
        }

        let min_lag = ((60.0 * self.frame_rate / self.max_bpm).ceil() as usize).max(1);
        let max_lag = ((60.0 * self.frame_rate / self.min_bpm).floor() as usize).min(n - 1);
        if min_lag > max_lag {
            return 0.0;
        }

        let scores: Vec<f32> = (min_lag..=max_lag)
            .map(|lag| {
                let acf: f32 = centered[..n - lag]
                    .iter()
                    .zip(centered[lag..].iter())
                    .map(|(a, b)| a * b)
                    .sum();
                (acf / energy).max(0.0) * self.prior(self.lag_to_bpm(lag as f32))
            })
            .collect();

        let Some((best, &peak)) = scores.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)) else {
            return 0.0;
        };
        if peak <= 0.0 {
            return 0.0;
        }

        // Parabolic refinement around the best lag
        let mut lag = (min_lag + best) as f32;
        if best > 0 && best + 1 < scores.len() {
            let (left, right) = (scores[best - 1], scores[best + 1]);
            let denom = left - 2.0 * peak + right;
            if denom.abs() > f32::EPSILON {
                lag += (0.5 * (left - right) / denom).clamp(-0.5, 0.5);
            }
        }

        let bpm = self.lag_to_bpm(lag);
        trace!(lag, bpm, "Tempo estimate");
        bpm
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Short noise-like bursts every beat, silence in between.
    pub(crate) fn click_track(bpm: f32, sample_rate: u32, duration_secs: f32) -> Vec<f32> {
        let total = (sample_rate as f32 * duration_secs) as usize;
        let period = 60.0 * sample_rate as f32 / bpm;
        let burst = (0.02 * sample_rate as f32) as usize;

        let mut samples = vec![0.0f32; total];
        let mut beat = 0usize;
        loop {
            let start = (beat as f32 * period) as usize;
            if start >= total {
                break;
            }
            for i in 0..burst.min(total - start) {
                let decay = 1.0 - i as f32 / burst as f32;
                samples[start + i] = decay * (i as f32 * 1.7).sin() * (i as f32 * 0.31).cos();
            }
            beat += 1;
        }
        samples
    }

    #[test]
    fn test_onset_envelope_rectifies() {
        let log_mel = Array2::from_shape_vec((2, 3), vec![0.0, 10.0, 5.0, 0.0, 20.0, 0.0]).unwrap();
        let envelope = onset_envelope(&log_mel);
        assert_eq!(envelope, vec![0.0, 15.0, 0.0]);
    }

    #[test]
    fn test_flat_envelope_has_no_tempo() {
        let estimator = TempoEstimator::new(22_050, 512);
        assert_eq!(estimator.estimate(&[0.0; 500]), 0.0);
        assert_eq!(estimator.estimate(&[3.0; 500]), 0.0);
        assert_eq!(estimator.estimate(&[]), 0.0);
    }

    #[test]
    fn test_periodic_envelope() {
        let estimator = TempoEstimator::new(22_050, 512);
        // One impulse every 22 frames at ~43 frames per second is ~117 BPM
        let envelope: Vec<f32> = (0..600).map(|i| if i % 22 == 0 { 1.0 } else { 0.0 }).collect();
        let bpm = estimator.estimate(&envelope);
        assert!((bpm - 117.4).abs() < 3.0, "estimated {bpm}");
    }

    #[test]
    fn test_prior_peaks_at_center() {
        let estimator = TempoEstimator::new(22_050, 512);
        assert!((estimator.prior(120.0) - 1.0).abs() < 1e-6);
        assert!(estimator.prior(60.0) < 1.0);
        assert!((estimator.prior(60.0) - estimator.prior(240.0)).abs() < 1e-6);
    }
}
