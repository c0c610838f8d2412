//! Frame → feature vector.
//!
//! [`FeatureExtractor`] owns the read-only DSP tables (window, FFT plan,
//! filterbank, DCT) and is meant to be built once and shared behind an `Arc`.
//! Everything that changes per cycle lives in a [`FeatureScratch`] owned by
//! the caller, so extraction never allocates.

use tracing::debug;

use super::dct::DctMatrix;
use super::filterbank::MelFilterbank;
use super::normalizer::{FeatureNormalizer, NormalizationError};
use super::spectrum::{SpectralBuffer, SpectralTransform};
use crate::audio::{AudioFrame, Sample};
use crate::config::{ConfigError, FeatureMode, SoundClassConfig};

/// Log Mel energies followed by the DCT: `out = D · ln(F · power + floor)`.
///
/// `mel` receives the intermediate log energies.
pub fn project(
    power: &[f32],
    filterbank: &MelFilterbank,
    dct: &DctMatrix,
    log_floor: f32,
    mel: &mut [f32],
    out: &mut [f32],
) {
    filterbank.apply(power, mel);
    for e in mel.iter_mut() {
        // NaN-safe: `max` picks the floor
        *e = (*e + log_floor).max(log_floor).ln();
    }
    dct.project(mel, out);
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    mode: FeatureMode,
    frame_len: usize,
    hop: usize,
    log_floor: f32,
    transform: SpectralTransform,
    filterbank: MelFilterbank,
    dct: DctMatrix,
}

/// Per-pipeline working memory for [`FeatureExtractor`].
#[derive(Debug, Clone)]
pub struct FeatureScratch {
    samples: Box<[f32]>,
    spectrum: SpectralBuffer,
    power: Box<[f32]>,
    mel: Box<[f32]>,
    coeffs: Box<[f32]>,
    features: Box<[f32]>,
}

impl FeatureScratch {
    /// Log Mel energies of the most recent analysis window.
    pub fn mel_energies(&self) -> &[f32] {
        &self.mel
    }

    /// Power spectrum of the most recent analysis window.
    pub fn power(&self) -> &[f32] {
        &self.power
    }

    /// Output of the last extraction.
    pub fn features(&self) -> &[f32] {
        &self.features
    }
}

impl FeatureExtractor {
    pub fn new(cfg: &SoundClassConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let f = &cfg.features;
        let window = cfg.window_length();
        let transform = SpectralTransform::new(window, f.fft_size, f.pre_emphasis)?;
        let filterbank = MelFilterbank::new(f.num_filters, f.fft_size, cfg.capture.sample_rate)?;
        let dct = DctMatrix::new(f.num_coeffs, f.num_filters)?;
        debug!(
            mode = %f.mode,
            window,
            hop = cfg.hop_length(),
            fft = f.fft_size,
            filters = f.num_filters,
            coeffs = f.num_coeffs,
            "feature tables ready"
        );
        Ok(Self {
            mode: f.mode,
            frame_len: cfg.capture.frame_length,
            hop: cfg.hop_length(),
            log_floor: f.log_floor,
            transform,
            filterbank,
            dct,
        })
    }

    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn window_len(&self) -> usize {
        self.transform.window_len()
    }

    pub fn hop_len(&self) -> usize {
        self.hop
    }

    pub fn filterbank(&self) -> &MelFilterbank {
        &self.filterbank
    }

    pub fn dct(&self) -> &DctMatrix {
        &self.dct
    }

    /// Length of the vector [`FeatureExtractor::extract`] produces.
    pub fn feature_len(&self) -> usize {
        match self.mode {
            FeatureMode::Mfcc => self.dct.num_coeffs(),
            FeatureMode::RawSamples => self.frame_len,
        }
    }

    /// Analysis windows that fit in one frame.
    pub fn windows_per_frame(&self) -> usize {
        (self.frame_len - self.window_len()) / self.hop + 1
    }

    /// Allocate working memory sized for this extractor.
    pub fn scratch(&self) -> FeatureScratch {
        FeatureScratch {
            samples: vec![0.0; self.frame_len].into_boxed_slice(),
            spectrum: SpectralBuffer::new(self.transform.fft_size()),
            power: vec![0.0; self.transform.bins()].into_boxed_slice(),
            mel: vec![0.0; self.filterbank.num_filters()].into_boxed_slice(),
            coeffs: vec![0.0; self.dct.num_coeffs()].into_boxed_slice(),
            features: vec![0.0; self.feature_len()].into_boxed_slice(),
        }
    }

    /// Turn one complete frame into the classifier's feature vector.
    ///
    /// MFCC mode averages the cepstra of every analysis window in the frame;
    /// raw-sample mode min-max scales the samples.
    ///
    /// # Panics
    /// If `frame` is incomplete or its length differs from the configured
    /// frame length.
    pub fn extract<'s>(
        &self,
        frame: &AudioFrame,
        scratch: &'s mut FeatureScratch,
    ) -> Result<&'s [f32], NormalizationError> {
        assert!(frame.is_complete(), "feature extraction on a partial frame");
        assert_eq!(frame.len(), self.frame_len, "frame length");

        match self.mode {
            FeatureMode::RawSamples => {
                FeatureNormalizer::min_max(frame.samples(), &mut scratch.features)?;
            }
            FeatureMode::Mfcc => {
                for (dst, &s) in scratch.samples.iter_mut().zip(frame.samples()) {
                    *dst = s.into_f32();
                }
                scratch.features.fill(0.0);
                let windows = self.windows_per_frame();
                for w in 0..windows {
                    let start = w * self.hop;
                    self.cepstrum_at(start, scratch);
                    for (acc, &c) in scratch.features.iter_mut().zip(scratch.coeffs.iter()) {
                        *acc += c;
                    }
                }
                let inv = 1.0 / windows as f32;
                scratch.features.iter_mut().for_each(|c| *c *= inv);
            }
        }
        Ok(&scratch.features)
    }

    /// Cepstrum of every analysis window in an arbitrary-length signal.
    ///
    /// Used for offline inspection; allocates one vector per window.
    pub fn cepstrogram(&self, signal: &[f32]) -> Vec<Vec<f32>> {
        let win = self.window_len();
        if signal.len() < win {
            return Vec::new();
        }
        let mut scratch = self.scratch();
        let mut samples = vec![0.0f32; win];
        (0..=(signal.len() - win) / self.hop)
            .map(|w| {
                samples.copy_from_slice(&signal[w * self.hop..w * self.hop + win]);
                self.transform.transform(&samples, &mut scratch.spectrum);
                scratch.spectrum.power_into(&mut scratch.power);
                let mut out = vec![0.0; self.dct.num_coeffs()];
                project(
                    &scratch.power,
                    &self.filterbank,
                    &self.dct,
                    self.log_floor,
                    &mut scratch.mel,
                    &mut out,
                );
                out
            })
            .collect()
    }

    fn cepstrum_at(&self, start: usize, scratch: &mut FeatureScratch) {
        let win = self.window_len();
        let FeatureScratch {
            samples,
            spectrum,
            power,
            mel,
            coeffs,
            ..
        } = scratch;
        self.transform.transform(&samples[start..start + win], spectrum);
        spectrum.power_into(power);
        project(power, &self.filterbank, &self.dct, self.log_floor, mel, coeffs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use approx::assert_abs_diff_eq;

    fn tone(freq: f32, len: usize, amp: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                (amp * (2.0 * std::f32::consts::PI * freq * t).sin() * 32_767.0) as i16
            })
            .collect()
    }

    #[test]
    fn project_is_deterministic() {
        let ex = FeatureExtractor::new(&SoundClassConfig::default()).unwrap();
        let power: Vec<f32> = (0..513).map(|k| (k as f32 * 0.37).sin().abs() * 10.0).collect();
        let mut mel = vec![0.0; 23];
        let (mut a, mut b) = (vec![0.0; 13], vec![0.0; 13]);
        project(&power, ex.filterbank(), ex.dct(), 1e-10, &mut mel, &mut a);
        project(&power, ex.filterbank(), ex.dct(), 1e-10, &mut mel, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn silence_is_finite() {
        let ex = FeatureExtractor::new(&SoundClassConfig::default()).unwrap();
        let mut scratch = ex.scratch();
        let frame = AudioFrame::from_samples(&[0; 1024]);
        let feats = ex.extract(&frame, &mut scratch).unwrap();
        assert!(feats.iter().all(|c| c.is_finite()));
        // every log energy hits the floor
        let floor = 1e-10f32.ln();
        for &e in scratch.mel_energies() {
            assert_abs_diff_eq!(e, floor, epsilon = 1e-3);
        }
    }

    #[test]
    fn tone_at_filter_centre_wins_that_band() {
        let ex = FeatureExtractor::new(&SoundClassConfig::default()).unwrap();
        let mut scratch = ex.scratch();
        for m in [4usize, 10, 17] {
            let f = ex.filterbank().center_hz(m);
            let frame = AudioFrame::from_samples(&tone(f, 1024, 0.5));
            ex.extract(&frame, &mut scratch).unwrap();
            let argmax = scratch
                .mel_energies()
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            assert_eq!(argmax, Some(m), "tone at {f} Hz");
        }
    }

    #[test]
    fn single_window_mean_equals_its_cepstrum() {
        let ex = FeatureExtractor::new(&SoundClassConfig::default()).unwrap();
        assert_eq!(ex.windows_per_frame(), 1);
        let samples = tone(440.0, 1024, 0.3);
        let frame = AudioFrame::from_samples(&samples);
        let mut scratch = ex.scratch();
        let feats = ex.extract(&frame, &mut scratch).unwrap().to_vec();

        let signal: Vec<f32> = samples.iter().map(|&s| s.into_f32()).collect();
        let gram = ex.cepstrogram(&signal);
        assert_eq!(gram.len(), 1);
        for (a, b) in feats.iter().zip(&gram[0]) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn overlapping_windows_are_averaged() {
        let cfg = SoundClassConfig {
            features: FeatureConfig {
                fft_size: 512,
                num_filters: 26,
                window_length: Some(400),
                hop_length: Some(200),
                ..FeatureConfig::default()
            },
            ..SoundClassConfig::default()
        };
        let ex = FeatureExtractor::new(&cfg).unwrap();
        // (1024 - 400) / 200 + 1
        assert_eq!(ex.windows_per_frame(), 4);

        let samples = tone(1000.0, 1024, 0.4);
        let mut scratch = ex.scratch();
        let feats = ex
            .extract(&AudioFrame::from_samples(&samples), &mut scratch)
            .unwrap()
            .to_vec();

        let signal: Vec<f32> = samples.iter().map(|&s| s.into_f32()).collect();
        let gram = ex.cepstrogram(&signal);
        assert_eq!(gram.len(), 4);
        for c in 0..13 {
            let mean = gram.iter().map(|w| w[c]).sum::<f32>() / 4.0;
            assert_abs_diff_eq!(feats[c], mean, epsilon = 1e-4);
        }
    }

    #[test]
    fn raw_mode_scales_samples() {
        let cfg = SoundClassConfig {
            features: FeatureConfig {
                mode: FeatureMode::RawSamples,
                ..FeatureConfig::default()
            },
            ..SoundClassConfig::default()
        };
        let ex = FeatureExtractor::new(&cfg).unwrap();
        assert_eq!(ex.feature_len(), 1024);
        let samples: Vec<i16> = (0..1024).map(|i| i as i16 - 512).collect();
        let mut scratch = ex.scratch();
        let feats = ex.extract(&AudioFrame::from_samples(&samples), &mut scratch).unwrap();
        assert_abs_diff_eq!(feats[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(feats[1023], 1.0, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "partial frame")]
    fn partial_frame_panics() {
        let ex = FeatureExtractor::new(&SoundClassConfig::default()).unwrap();
        let mut scratch = ex.scratch();
        let frame = AudioFrame::new(1024);
        let _ = ex.extract(&frame, &mut scratch);
    }
}
