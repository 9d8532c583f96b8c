//! Spectral contrast: peak-to-valley level difference per octave band.

use crate::fft::power_to_db;

/// Octave sub-bands starting at `fmin`, plus one band below it and one
/// open-ended band up to Nyquist.
pub struct ContrastBands {
    bands: Vec<Vec<usize>>,
    quantile: f32,
}

impl ContrastBands {
    /// Create `n_bands + 1` bands with edges `0, fmin, 2·fmin, …`.
    pub fn new(n_bands: usize, fmin: f32, quantile: f32, frequencies: &[f32]) -> Self {
        let mut edges = vec![0.0f32];
        edges.extend((0..=n_bands).map(|k| fmin * 2f32.powi(k as i32)));

        let bands = (0..=n_bands)
            .map(|k| {
                let (low, high) = (edges[k], edges[k + 1]);
                frequencies
                    .iter()
                    .enumerate()
                    .filter(|(_, &f)| {
                        if k == n_bands {
                            f >= low
                        } else {
                            f >= low && f < high
                        }
                    })
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        Self { bands, quantile }
    }

    /// Number of contrast values per frame.
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// True when no bands are defined.
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Contrast of one magnitude spectrum, in dB per band.
    pub fn frame(&self, magnitude: &[f32]) -> Vec<f32> {
        self.bands
            .iter()
            .map(|bins| {
                if bins.is_empty() {
                    return 0.0;
                }

                let mut values: Vec<f32> = bins.iter().map(|&i| magnitude[i]).collect();
                values.sort_by(|a, b| a.total_cmp(b));

                let n = ((self.quantile * values.len() as f32).round() as usize).max(1);
                let valley = values[..n].iter().sum::<f32>() / n as f32;
                let peak = values[values.len() - n..].iter().sum::<f32>() / n as f32;

                power_to_db(peak) - power_to_db(valley)
            })
            .collect()
    }

    /// Mean contrast over all frames.
    pub fn mean(&self, magnitude_frames: &[Vec<f32>]) -> Vec<f32> {
        let mut mean = vec![0.0f32; self.len()];
        if magnitude_frames.is_empty() {
            return mean;
        }

        for frame in magnitude_frames {
            for (acc, value) in mean.iter_mut().zip(self.frame(frame)) {
                *acc += value;
            }
        }

        let n = magnitude_frames.len() as f32;
        mean.iter_mut().for_each(|v| *v /= n);
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freqs() -> Vec<f32> {
        (0..=1024).map(|i| i as f32 * 22_050.0 / 2048.0).collect()
    }

    #[test]
    fn test_seven_bands() {
        let bands = ContrastBands::new(6, 200.0, 0.02, &freqs());
        assert_eq!(bands.len(), 7);

        // Every bin is covered exactly once
        let covered: usize = bands.bands.iter().map(Vec::len).sum();
        assert_eq!(covered, 1025);
    }

    #[test]
    fn test_flat_spectrum_has_no_contrast() {
        let bands = ContrastBands::new(6, 200.0, 0.02, &freqs());
        let contrast = bands.frame(&vec![0.3; 1025]);
        for value in contrast {
            assert!(value.abs() < 1e-4);
        }
    }

    #[test]
    fn test_peaky_band_has_positive_contrast() {
        let bands = ContrastBands::new(6, 200.0, 0.02, &freqs());
        let mut spectrum = vec![0.01f32; 1025];
        spectrum[93] = 50.0; // ~1000 Hz, inside the 800-1600 Hz band

        let contrast = bands.frame(&spectrum);
        assert!(contrast[3] > 30.0);
        assert!(contrast[0].abs() < 1e-4);
    }
}
