//! Mel filterbank and cepstral coefficients.
//!
//! Slaney-style mel scale (linear below 1 kHz, logarithmic above) with
//! area-normalized triangular filters, followed by an orthonormal DCT-II.

use ndarray::{Array1, Array2, ArrayView1};

use crate::fft::power_to_db;

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Convert Hz to mels.
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert mels to Hz.
pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filterbank over positive-frequency FFT bins.
pub struct MelFilterbank {
    /// Filter weights, one row per mel band
    weights: Array2<f32>,
}

impl MelFilterbank {
    /// Create a filterbank spanning 0 Hz to Nyquist.
    pub fn new(n_mels: usize, frame_size: usize, sample_rate: u32) -> Self {
        let n_bins = frame_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let bin_freqs: Vec<f32> = (0..n_bins)
            .map(|i| i as f32 * sample_rate as f32 / frame_size as f32)
            .collect();

        let mel_max = hz_to_mel(nyquist);
        let edges: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
            .collect();

        let mut weights = Array2::<f32>::zeros((n_mels, n_bins));
        for m in 0..n_mels {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let norm = 2.0 / (upper - lower);

            for (k, &freq) in bin_freqs.iter().enumerate() {
                let rising = (freq - lower) / (center - lower);
                let falling = (upper - freq) / (upper - center);
                let w = rising.min(falling).max(0.0);
                weights[[m, k]] = w * norm;
            }
        }

        Self { weights }
    }

    /// Number of mel bands.
    pub fn n_mels(&self) -> usize {
        self.weights.nrows()
    }

    /// Project one power spectrum onto the mel bands.
    pub fn apply(&self, power: ArrayView1<f32>) -> Array1<f32> {
        self.weights.dot(&power)
    }
}

/// Log-power mel spectrogram, one column per frame.
///
/// Values are in dB and clipped to `top_db` below the global maximum.
pub fn log_mel_spectrogram(filterbank: &MelFilterbank, power_frames: &[Vec<f32>], top_db: f32) -> Array2<f32> {
    let mut mel = Array2::<f32>::zeros((filterbank.n_mels(), power_frames.len()));

    for (t, frame) in power_frames.iter().enumerate() {
        let bands = filterbank.apply(ArrayView1::from(frame.as_slice()));
        mel.column_mut(t).assign(&bands.mapv(power_to_db));
    }

    let max_db = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max_db.is_finite() {
        let floor = max_db - top_db;
        mel.mapv_inplace(|v| v.max(floor));
    }

    mel
}

/// Orthonormal DCT-II basis truncated to the first `n_coeffs` rows.
pub fn dct_basis(n_coeffs: usize, n_inputs: usize) -> Array2<f32> {
    let n = n_inputs as f32;
    Array2::from_shape_fn((n_coeffs, n_inputs), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        scale * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n)).cos()
    })
}

/// Mean cepstral coefficients over all frames of a log-mel spectrogram.
pub fn mean_mfcc(log_mel: &Array2<f32>, dct: &Array2<f32>) -> Vec<f32> {
    let frames = log_mel.ncols();
    if frames == 0 {
        return vec![0.0; dct.nrows()];
    }

    let cepstra = dct.dot(log_mel);
    cepstra
        .rows()
        .into_iter()
        .map(|row| row.sum() / frames as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0f32, 200.0, 999.0, 1000.0, 4000.0, 11_025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 0.05 * hz.max(1.0), "{hz} -> {back}");
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_filterbank_shape_and_coverage() {
        let fb = MelFilterbank::new(128, 2048, 22_050);
        assert_eq!(fb.n_mels(), 128);
        assert_eq!(fb.weights.ncols(), 1025);

        // Every band has at least some weight
        for row in fb.weights.rows() {
            assert!(row.sum() > 0.0);
        }
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_basis(13, 128);
        let gram = basis.dot(&basis.t());
        for i in 0..13 {
            for j in 0..13 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_mean_mfcc_of_constant_spectrum() {
        // A flat log-mel spectrum carries all its energy in the first coefficient
        let log_mel = Array2::<f32>::from_elem((128, 4), -20.0);
        let dct = dct_basis(13, 128);
        let mfcc = mean_mfcc(&log_mel, &dct);

        assert_eq!(mfcc.len(), 13);
        assert!((mfcc[0] - (-20.0 * 128f32.sqrt())).abs() < 1e-2);
        for c in &mfcc[1..] {
            assert!(c.abs() < 1e-2);
        }
    }
}
