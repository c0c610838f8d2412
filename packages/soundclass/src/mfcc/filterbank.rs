//! Triangular Mel filterbank.
//!
//! `num_filters + 2` points are spaced evenly on the Mel scale between 0 Hz and
//! Nyquist and mapped to *fractional* FFT bin positions. Filter `m` rises
//! linearly from point `m` to point `m+1` and falls back to zero at point
//! `m+2`, so neighbouring filters overlap by half and cross at 0.5.

use std::ops::Range;

use crate::config::ConfigError;
use crate::constants::{MEL_BREAK_HZ, MEL_SCALE};

#[inline]
pub fn hz_to_mel(hz: f32) -> f32 {
    MEL_SCALE * (1.0 + hz / MEL_BREAK_HZ).log10()
}

#[inline]
pub fn mel_to_hz(mel: f32) -> f32 {
    MEL_BREAK_HZ * (10f32.powf(mel / MEL_SCALE) - 1.0)
}

#[derive(Debug, Clone)]
pub struct MelFilterbank {
    num_filters: usize,
    bins: usize,
    /// Row-major `[num_filters][bins]`.
    weights: Box<[f32]>,
    /// Non-zero bin range per filter.
    support: Box<[Range<usize>]>,
    centers_hz: Box<[f32]>,
}

impl MelFilterbank {
    /// Build the filterbank for a `fft_size`-point transform at `sample_rate`.
    ///
    /// Fails with [`ConfigError::EmptyFilter`] when a filter would not cover
    /// any bin (too many filters for the spectral resolution).
    pub fn new(num_filters: usize, fft_size: usize, sample_rate: u32) -> Result<Self, ConfigError> {
        if num_filters == 0 {
            return Err(ConfigError::Zero { field: "features.num_filters" });
        }
        if sample_rate == 0 {
            return Err(ConfigError::Zero { field: "capture.sample_rate" });
        }
        if !fft_size.is_power_of_two() || fft_size < 2 {
            return Err(ConfigError::FftSizeNotPowerOfTwo(fft_size));
        }

        let bins = fft_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let mel_max = hz_to_mel(nyquist);
        let step = mel_max / (num_filters + 1) as f32;

        // fractional bin position of every Mel point
        let points_hz: Vec<f32> = (0..num_filters + 2)
            .map(|i| mel_to_hz(i as f32 * step))
            .collect();
        let points: Vec<f32> = points_hz
            .iter()
            .map(|&hz| hz * fft_size as f32 / sample_rate as f32)
            .collect();

        let mut weights = vec![0.0f32; num_filters * bins];
        let mut support = Vec::with_capacity(num_filters);
        for m in 0..num_filters {
            let (left, center, right) = (points[m], points[m + 1], points[m + 2]);
            let row = &mut weights[m * bins..(m + 1) * bins];
            for (j, w) in row.iter_mut().enumerate() {
                let k = j as f32;
                *w = if k <= left || k >= right {
                    0.0
                } else if k <= center {
                    (k - left) / (center - left)
                } else {
                    (right - k) / (right - center)
                };
            }
            let first = row.iter().position(|&w| w > 0.0);
            let last = row.iter().rposition(|&w| w > 0.0);
            match (first, last) {
                (Some(a), Some(b)) => support.push(a..b + 1),
                _ => return Err(ConfigError::EmptyFilter { index: m }),
            }
        }

        Ok(Self {
            num_filters,
            bins,
            weights: weights.into_boxed_slice(),
            support: support.into_boxed_slice(),
            centers_hz: points_hz[1..=num_filters].into(),
        })
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    /// Power-spectrum bins each row spans (`fft_size/2 + 1`).
    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn row(&self, m: usize) -> &[f32] {
        &self.weights[m * self.bins..(m + 1) * self.bins]
    }

    /// Bins where filter `m` is non-zero.
    #[inline]
    pub fn support(&self, m: usize) -> Range<usize> {
        self.support[m].clone()
    }

    /// Peak frequency of filter `m` in Hz.
    #[inline]
    pub fn center_hz(&self, m: usize) -> f32 {
        self.centers_hz[m]
    }

    /// Weighted sum of `power` under each filter.
    pub fn apply(&self, power: &[f32], out: &mut [f32]) {
        assert_eq!(power.len(), self.bins, "power spectrum length");
        assert_eq!(out.len(), self.num_filters, "mel output length");
        for (m, e) in out.iter_mut().enumerate() {
            let r = self.support(m);
            *e = self.row(m)[r.clone()]
                .iter()
                .zip(&power[r])
                .map(|(w, p)| w * p)
                .sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0f32, 440.0, 1000.0, 8000.0] {
            assert_abs_diff_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 5e-2);
        }
        assert_abs_diff_eq!(hz_to_mel(1000.0), 1000.0, epsilon = 0.5);
    }

    #[test]
    fn every_filter_has_energy_and_zero_outside_support() {
        let fb = MelFilterbank::new(23, 1024, 16_000).unwrap();
        assert_eq!(fb.bins(), 513);
        for m in 0..fb.num_filters() {
            let row = fb.row(m);
            let r = fb.support(m);
            assert!(row.iter().sum::<f32>() > 0.0, "filter {m} is empty");
            assert!(row[..r.start].iter().all(|&w| w == 0.0));
            assert!(row[r.end..].iter().all(|&w| w == 0.0));
            assert!(row.iter().all(|&w| (0.0..=1.0).contains(&w)));
        }
    }

    #[test]
    fn neighbours_cross_at_one_half() {
        let fb = MelFilterbank::new(23, 1024, 16_000).unwrap();
        for m in 0..fb.num_filters() - 1 {
            let (a, b) = (fb.row(m), fb.row(m + 1));
            // between the two centres the falling and rising edges sum to one
            for j in fb.support(m + 1).start..fb.support(m).end {
                assert_abs_diff_eq!(a[j] + b[j], 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn centres_are_increasing_and_below_nyquist() {
        let fb = MelFilterbank::new(26, 512, 16_000).unwrap();
        for m in 1..fb.num_filters() {
            assert!(fb.center_hz(m) > fb.center_hz(m - 1));
        }
        assert!(fb.center_hz(25) < 8_000.0);
    }

    #[test]
    fn too_many_filters_for_resolution_is_rejected() {
        assert!(matches!(
            MelFilterbank::new(40, 16, 16_000),
            Err(ConfigError::EmptyFilter { .. })
        ));
    }

    #[test]
    fn apply_weights_the_spectrum() {
        let fb = MelFilterbank::new(8, 256, 16_000).unwrap();
        let power = vec![1.0f32; fb.bins()];
        let mut out = vec![0.0; 8];
        fb.apply(&power, &mut out);
        for (m, &e) in out.iter().enumerate() {
            assert_abs_diff_eq!(e, fb.row(m).iter().sum::<f32>(), epsilon = 1e-5);
        }
    }
}
