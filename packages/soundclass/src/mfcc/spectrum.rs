use super::fft::Radix2Fft;
use super::window::{HammingWindow, pre_emphasis};
use crate::config::ConfigError;

/// Complex FFT workspace of exactly `fft_size` points.
#[derive(Debug, Clone)]
pub struct SpectralBuffer {
    re: Box<[f32]>,
    im: Box<[f32]>,
}

impl SpectralBuffer {
    pub fn new(fft_size: usize) -> Self {
        Self {
            re: vec![0.0; fft_size].into_boxed_slice(),
            im: vec![0.0; fft_size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.re.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    pub fn re(&self) -> &[f32] {
        &self.re
    }

    pub fn im(&self) -> &[f32] {
        &self.im
    }

    /// `|X[k]|²` for the `fft_size/2 + 1` non-negative frequency bins.
    pub fn power_into(&self, out: &mut [f32]) {
        assert_eq!(out.len(), self.re.len() / 2 + 1, "power spectrum length");
        for (p, (&r, &i)) in out.iter_mut().zip(self.re.iter().zip(self.im.iter())) {
            *p = r * r + i * i;
        }
    }
}

/// Pre-emphasis → Hamming → zero-pad → FFT for one analysis window.
///
/// Tables are immutable after construction so one instance can be shared
/// between pipelines.
#[derive(Debug, Clone)]
pub struct SpectralTransform {
    fft: Radix2Fft,
    window: HammingWindow,
    alpha: f32,
}

impl SpectralTransform {
    pub fn new(window_len: usize, fft_size: usize, pre_emphasis: f32) -> Result<Self, ConfigError> {
        if window_len == 0 {
            return Err(ConfigError::Zero { field: "features.window_length" });
        }
        let fft = Radix2Fft::new(fft_size)?;
        if fft_size < window_len {
            return Err(ConfigError::FftTooShort { fft_size, window: window_len });
        }
        Ok(Self {
            fft,
            window: HammingWindow::new(window_len),
            alpha: pre_emphasis,
        })
    }

    #[inline]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    /// Number of non-negative frequency bins.
    #[inline]
    pub fn bins(&self) -> usize {
        self.fft.size() / 2 + 1
    }

    /// Transform exactly `window_len` samples into `spec`.
    pub fn transform(&self, samples: &[f32], spec: &mut SpectralBuffer) {
        let n = self.window.len();
        assert_eq!(samples.len(), n, "analysis window length");
        assert_eq!(spec.len(), self.fft.size(), "spectral buffer length");

        // 1) pre-emphasis straight into the real part, then window
        pre_emphasis(samples, &mut spec.re[..n], self.alpha);
        self.window.apply(&mut spec.re[..n]);

        // 2) zero-pad
        spec.re[n..].fill(0.0);
        spec.im.fill(0.0);

        // 3) FFT
        self.fft.process(&mut spec.re, &mut spec.im);
    }
}
