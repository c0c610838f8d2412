use std::f64::consts::PI;

use crate::config::ConfigError;

/// Orthonormal DCT-II projection from `num_filters` log energies onto
/// `num_coeffs` cepstral coefficients.
///
/// `D[c][m] = s_c · cos(π·c·(2m+1) / (2M))`, with `s_0 = √(1/M)` and
/// `s_c = √(2/M)` otherwise. Precomputed once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct DctMatrix {
    num_coeffs: usize,
    num_filters: usize,
    weights: Box<[f32]>,
}

impl DctMatrix {
    pub fn new(num_coeffs: usize, num_filters: usize) -> Result<Self, ConfigError> {
        if num_coeffs == 0 {
            return Err(ConfigError::Zero { field: "features.num_coeffs" });
        }
        if num_coeffs > num_filters {
            return Err(ConfigError::TooManyCoeffs {
                coeffs: num_coeffs,
                filters: num_filters,
            });
        }
        let m_len = num_filters as f64;
        let mut weights = Vec::with_capacity(num_coeffs * num_filters);
        for c in 0..num_coeffs {
            let scale = if c == 0 { (1.0 / m_len).sqrt() } else { (2.0 / m_len).sqrt() };
            for m in 0..num_filters {
                let arg = PI * c as f64 * (2 * m + 1) as f64 / (2.0 * m_len);
                weights.push((scale * arg.cos()) as f32);
            }
        }
        Ok(Self {
            num_coeffs,
            num_filters,
            weights: weights.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn num_coeffs(&self) -> usize {
        self.num_coeffs
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    #[inline]
    pub fn row(&self, c: usize) -> &[f32] {
        &self.weights[c * self.num_filters..(c + 1) * self.num_filters]
    }

    /// `out = D · input`
    pub fn project(&self, input: &[f32], out: &mut [f32]) {
        assert_eq!(input.len(), self.num_filters, "dct input length");
        assert_eq!(out.len(), self.num_coeffs, "dct output length");
        for (c, o) in out.iter_mut().enumerate() {
            *o = self.row(c).iter().zip(input).map(|(w, x)| w * x).sum();
        }
    }
}
