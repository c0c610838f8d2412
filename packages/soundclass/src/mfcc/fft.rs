//! Iterative radix-2 Cooley–Tukey FFT.
//!
//! Bit-reversal permutation and twiddle factors are tabulated at construction;
//! [`Radix2Fft::process`] then works in place on split real/imaginary buffers
//! without allocating.

use std::f64::consts::PI;

use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub struct Radix2Fft {
    size: usize,
    bitrev: Box<[u32]>,
    /// `exp(-2πik/N)` for `k < N/2`, split into parts.
    tw_re: Box<[f32]>,
    tw_im: Box<[f32]>,
}

impl Radix2Fft {
    /// Plan a forward transform of `size` points. `size` must be a power of two.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if !size.is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(size));
        }
        let bits = size.trailing_zeros();
        let bitrev = (0..size as u32)
            .map(|i| i.reverse_bits().checked_shr(32 - bits).unwrap_or(0))
            .collect();

        let half = size / 2;
        let (tw_re, tw_im) = (0..half)
            .map(|k| {
                let a = -2.0 * PI * k as f64 / size as f64;
                (a.cos() as f32, a.sin() as f32)
            })
            .unzip::<_, _, Vec<_>, Vec<_>>();

        Ok(Self {
            size,
            bitrev,
            tw_re: tw_re.into_boxed_slice(),
            tw_im: tw_im.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward DFT of `(re, im)` in place. No normalisation is applied.
    pub fn process(&self, re: &mut [f32], im: &mut [f32]) {
        assert_eq!(re.len(), self.size, "fft input length");
        assert_eq!(im.len(), self.size, "fft input length");

        for (i, &j) in self.bitrev.iter().enumerate() {
            let j = j as usize;
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= self.size {
            let half = len / 2;
            let stride = self.size / len;
            for start in (0..self.size).step_by(len) {
                for k in 0..half {
                    let (wr, wi) = (self.tw_re[k * stride], self.tw_im[k * stride]);
                    let (e, o) = (start + k, start + k + half);
                    let tr = wr * re[o] - wi * im[o];
                    let ti = wr * im[o] + wi * re[o];
                    re[o] = re[e] - tr;
                    im[o] = im[e] - ti;
                    re[e] += tr;
                    im[e] += ti;
                }
            }
            len <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rustfft::{FftPlanner, num_complex::Complex32};

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(Radix2Fft::new(0), Err(ConfigError::FftSizeNotPowerOfTwo(0))));
        assert!(matches!(Radix2Fft::new(12), Err(ConfigError::FftSizeNotPowerOfTwo(12))));
        assert!(Radix2Fft::new(1).is_ok());
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let fft = Radix2Fft::new(64).unwrap();
        let mut re = vec![0.0f32; 64];
        let mut im = vec![0.0f32; 64];
        re[0] = 1.0;
        fft.process(&mut re, &mut im);
        for k in 0..64 {
            assert!((re[k] - 1.0).abs() < 1e-6 && im[k].abs() < 1e-6, "bin {k}");
        }
    }

    #[test]
    fn cosine_concentrates_in_its_bin() {
        for &(n, bin) in &[(8usize, 1usize), (256, 17), (1024, 40)] {
            let fft = Radix2Fft::new(n).unwrap();
            let mut re: Vec<f32> = (0..n)
                .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32).cos())
                .collect();
            let mut im = vec![0.0f32; n];
            fft.process(&mut re, &mut im);

            let power: Vec<f32> = re.iter().zip(&im).map(|(r, i)| r * r + i * i).collect();
            let expected = (n as f32 / 2.0).powi(2);
            let peak = power[bin];
            assert!(((peak - expected) / expected).abs() < 1e-3, "n={n} peak={peak}");
            for (k, &p) in power.iter().enumerate().take(n / 2 + 1) {
                if k != bin {
                    assert!(p < expected * 1e-6, "n={n} leakage at {k}: {p}");
                }
            }
        }
    }

    #[test]
    fn matches_reference_fft_on_random_input() {
        let n = 512;
        let mut rng = StdRng::seed_from_u64(7);
        let input: Vec<f32> = (0..n).map(|_| rng.random_range(-1.0f32..1.0)).collect();

        let mut re = input.clone();
        let mut im = vec![0.0f32; n];
        Radix2Fft::new(n).unwrap().process(&mut re, &mut im);

        let mut reference: Vec<Complex32> = input.iter().map(|&x| Complex32::new(x, 0.0)).collect();
        FftPlanner::<f32>::new().plan_fft_forward(n).process(&mut reference);

        for k in 0..n {
            assert!((re[k] - reference[k].re).abs() < 1e-3, "re[{k}]");
            assert!((im[k] - reference[k].im).abs() < 1e-3, "im[{k}]");
        }
    }
}
