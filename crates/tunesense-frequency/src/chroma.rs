//! Pitch-class (chroma) energy.

/// Lowest frequency mapped to a pitch class (A0).
const MIN_CHROMA_HZ: f32 = 27.5;

/// Maps FFT bins onto the twelve pitch classes, C = 0.
pub struct ChromaMap {
    classes: Vec<Option<usize>>,
    n_chroma: usize,
}

impl ChromaMap {
    /// Assign every bin to its nearest equal-tempered pitch class.
    pub fn new(n_chroma: usize, frequencies: &[f32]) -> Self {
        let classes = frequencies
            .iter()
            .map(|&freq| {
                if freq < MIN_CHROMA_HZ || n_chroma == 0 {
                    return None;
                }
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                let class = (midi.round() as i64).rem_euclid(12) as usize;
                Some(class * n_chroma / 12)
            })
            .collect();

        Self { classes, n_chroma }
    }

    /// Pitch-class energy of one power spectrum, scaled so the strongest class is 1.
    pub fn frame(&self, power: &[f32]) -> Vec<f32> {
        let mut chroma = vec![0.0f32; self.n_chroma];
        for (class, &p) in self.classes.iter().zip(power.iter()) {
            if let Some(c) = class {
                chroma[*c] += p;
            }
        }

        let max = chroma.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            for value in &mut chroma {
                *value /= max;
            }
        }
        chroma
    }

    /// Mean normalized chroma over all frames.
    pub fn mean(&self, power_frames: &[Vec<f32>]) -> Vec<f32> {
        let mut mean = vec![0.0f32; self.n_chroma];
        if power_frames.is_empty() {
            return mean;
        }

        for frame in power_frames {
            for (acc, value) in mean.iter_mut().zip(self.frame(frame)) {
                *acc += value;
            }
        }

        let n = power_frames.len() as f32;
        for value in &mut mean {
            *value /= n;
        }
        mean
    }
}
