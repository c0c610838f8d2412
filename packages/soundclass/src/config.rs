//! Runtime configuration
//!
//! All tunables of the pipeline live in one [`SoundClassConfig`], loaded from
//! a TOML file with four optional tables:
//!
//! ```toml
//! [capture]
//! sample_rate = 16000
//! frame_length = 1024
//! warmup_samples = 512
//! read_timeout_ms = 1000
//! read_retries = 2
//!
//! [features]
//! mode = "mfcc"          # or "raw_samples"
//! fft_size = 1024
//! num_filters = 23
//! num_coeffs = 13
//!
//! [classifier]
//! model_path = "sounds.scm"
//!
//! [recording]
//! root = "recordings"
//! duration_secs = 5
//! ```
//!
//! Missing keys fall back to the defaults in [`crate::constants`]. Every
//! constructor that consumes a config calls [`SoundClassConfig::validate`], so
//! precondition violations surface once, at startup, as a [`ConfigError`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CLASS_LABELS, DEFAULT_FFT_SIZE, DEFAULT_FRAME_LENGTH, DEFAULT_MEL_FILTERS,
    DEFAULT_MFCC_COEFFS, DEFAULT_READ_RETRIES, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RECORD_SECONDS,
    DEFAULT_SAMPLE_RATE, DEFAULT_WARMUP_SAMPLES, LOG_FLOOR, PRE_EMPHASIS,
};

/// Construction-time precondition failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("fft size {0} is not a power of two")]
    FftSizeNotPowerOfTwo(usize),

    #[error("fft size {fft_size} is shorter than the analysis window ({window})")]
    FftTooShort { fft_size: usize, window: usize },

    #[error("analysis window ({window}) is longer than the frame ({frame})")]
    WindowTooLong { window: usize, frame: usize },

    #[error("feature tables expect {tables}-sample frames but capture delivers {capture}")]
    FrameMismatch { tables: usize, capture: usize },

    #[error("hop length ({hop}) exceeds the analysis window ({window})")]
    HopTooLong { hop: usize, window: usize },

    #[error("{coeffs} cepstral coefficients requested from only {filters} mel filters")]
    TooManyCoeffs { coeffs: usize, filters: usize },

    #[error("mel filter {index} covers no fft bin; raise fft_size or lower num_filters")]
    EmptyFilter { index: usize },

    #[error("pre-emphasis coefficient {0} is outside [0, 1)")]
    PreEmphasis(f32),

    #[error("classifier expects {expected} inputs but the {mode} front-end produces {produced}")]
    ContractMismatch {
        mode: FeatureMode,
        expected: usize,
        produced: usize,
    },

    #[error("the class label table is empty")]
    NoLabels,
}

/* ───────────────────────────── sections ───────────────────────────── */

/// Which feature vector the classifier is fed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureMode {
    /// `num_coeffs` cepstral coefficients, averaged over the frame's analysis windows.
    #[default]
    Mfcc,
    /// The frame's samples, min-max scaled to `[0, 1]`.
    RawSamples,
}

/// `[capture]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate requested from the device (Hz).
    pub sample_rate: u32,
    /// Samples per captured frame.
    pub frame_length: usize,
    /// Samples thrown away after a cold start.
    pub warmup_samples: usize,
    /// Upper bound on one read (milliseconds).
    pub read_timeout_ms: u64,
    /// Extra attempts after a timed-out read.
    pub read_retries: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_length: DEFAULT_FRAME_LENGTH,
            warmup_samples: DEFAULT_WARMUP_SAMPLES,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_retries: DEFAULT_READ_RETRIES,
        }
    }
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// `[features]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub mode: FeatureMode,
    pub fft_size: usize,
    pub num_filters: usize,
    pub num_coeffs: usize,
    pub pre_emphasis: f32,
    pub log_floor: f32,
    /// Analysis window in samples; `None` analyses the whole frame at once.
    pub window_length: Option<usize>,
    /// Hop between analysis windows; `None` means non-overlapping windows.
    pub hop_length: Option<usize>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            mode: FeatureMode::Mfcc,
            fft_size: DEFAULT_FFT_SIZE,
            num_filters: DEFAULT_MEL_FILTERS,
            num_coeffs: DEFAULT_MFCC_COEFFS,
            pre_emphasis: PRE_EMPHASIS,
            log_floor: LOG_FLOOR,
            window_length: None,
            hop_length: None,
        }
    }
}

/// `[classifier]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Model file used by `classify`/`listen` when no `--model` is given.
    pub model_path: Option<PathBuf>,
    /// Label table written into models created by `init-model`.
    pub labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            labels: DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// `[recording]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Dataset root; clips go to `<root>/<category>/rec_<n>.wav`.
    pub root: PathBuf,
    pub duration_secs: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("recordings"),
            duration_secs: DEFAULT_RECORD_SECONDS,
        }
    }
}

/* ───────────────────────────── top level ──────────────────────────── */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundClassConfig {
    pub capture: CaptureConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub recording: RecordingConfig,
}

impl SoundClassConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Analysis window length, resolved against the frame length.
    pub fn window_length(&self) -> usize {
        self.features
            .window_length
            .unwrap_or(self.capture.frame_length)
    }

    /// Hop between analysis windows, resolved against the window length.
    pub fn hop_length(&self) -> usize {
        self.features.hop_length.unwrap_or_else(|| self.window_length())
    }

    /// Length of the feature vector the front-end hands to the classifier.
    pub fn feature_len(&self) -> usize {
        match self.features.mode {
            FeatureMode::Mfcc => self.features.num_coeffs,
            FeatureMode::RawSamples => self.capture.frame_length,
        }
    }

    /// Check every structural precondition of the pipeline.
    ///
    /// Filterbank coverage (every filter spans at least one bin) depends on the
    /// generated geometry and is checked when the filterbank is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.capture;
        let f = &self.features;

        for (field, value) in [
            ("capture.sample_rate", c.sample_rate as usize),
            ("capture.frame_length", c.frame_length),
            ("capture.read_timeout_ms", c.read_timeout_ms as usize),
            ("features.fft_size", f.fft_size),
            ("features.num_filters", f.num_filters),
            ("features.num_coeffs", f.num_coeffs),
            ("recording.duration_secs", self.recording.duration_secs as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        let window = self.window_length();
        let hop = self.hop_length();
        if window == 0 {
            return Err(ConfigError::Zero { field: "features.window_length" });
        }
        if hop == 0 {
            return Err(ConfigError::Zero { field: "features.hop_length" });
        }
        if window > c.frame_length {
            return Err(ConfigError::WindowTooLong { window, frame: c.frame_length });
        }
        if hop > window {
            return Err(ConfigError::HopTooLong { hop, window });
        }
        if !f.fft_size.is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(f.fft_size));
        }
        if f.fft_size < window {
            return Err(ConfigError::FftTooShort { fft_size: f.fft_size, window });
        }
        if f.num_coeffs > f.num_filters {
            return Err(ConfigError::TooManyCoeffs {
                coeffs: f.num_coeffs,
                filters: f.num_filters,
            });
        }
        if !(0.0..1.0).contains(&f.pre_emphasis) {
            return Err(ConfigError::PreEmphasis(f.pre_emphasis));
        }
        if self.classifier.labels.is_empty() {
            return Err(ConfigError::NoLabels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = SoundClassConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, SoundClassConfig::default());
        assert_eq!(cfg.window_length(), 1024);
        assert_eq!(cfg.hop_length(), 1024);
        assert_eq!(cfg.feature_len(), 13);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let cfg = SoundClassConfig::from_toml_str(
            r#"
            [features]
            mode = "raw_samples"
            window_length = 400
            hop_length = 200
            fft_size = 512
            "#,
        )
        .unwrap();
        assert_eq!(cfg.features.mode, FeatureMode::RawSamples);
        assert_eq!(cfg.features.num_filters, 23);
        assert_eq!(cfg.capture.sample_rate, 16_000);
        assert_eq!(cfg.feature_len(), 1024);
        assert_eq!(cfg.hop_length(), 200);
    }

    #[test]
    fn non_power_of_two_fft_is_rejected() {
        let err = SoundClassConfig::from_toml_str("[features]\nfft_size = 1000\n").unwrap_err();
        assert!(matches!(err, ConfigError::FftSizeNotPowerOfTwo(1000)));
    }

    #[test]
    fn fft_shorter_than_window_is_rejected() {
        let err = SoundClassConfig::from_toml_str("[features]\nfft_size = 512\n").unwrap_err();
        assert!(matches!(err, ConfigError::FftTooShort { fft_size: 512, window: 1024 }));
    }

    #[test]
    fn more_coeffs_than_filters_is_rejected() {
        let err = SoundClassConfig::from_toml_str(
            "[features]\nnum_filters = 10\nnum_coeffs = 13\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TooManyCoeffs { coeffs: 13, filters: 10 }));
    }

    #[test]
    fn zero_frame_length_is_rejected() {
        let err = SoundClassConfig::from_toml_str("[capture]\nframe_length = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "capture.frame_length" }));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = SoundClassConfig::from_toml_str("[features]\nmode = \"spectrogram\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
