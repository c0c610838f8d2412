//! Compile-time defaults for the capture, feature and classifier stages.
//!
//! Every value below is only a *default*: the TOML configuration
//! ([`crate::config::SoundClassConfig`]) can override all of them and the
//! pipeline never reads these constants directly once configured.

/* ───────────────────────────── capture ───────────────────────────── */

/// DEFAULT_SAMPLE_RATE is the microphone sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// DEFAULT_FRAME_LENGTH is the number of samples in one captured frame (64 ms @ 16 kHz).
pub const DEFAULT_FRAME_LENGTH: usize = 1024;

/// DEFAULT_WARMUP_SAMPLES is how many samples are discarded after a cold start
/// before the first frame is kept.
pub const DEFAULT_WARMUP_SAMPLES: usize = 512;

/// DEFAULT_READ_TIMEOUT_MS bounds a single device read.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

/// DEFAULT_READ_RETRIES is the number of extra attempts after a timed-out read.
pub const DEFAULT_READ_RETRIES: u32 = 2;

/* ───────────────────────── spectral front-end ────────────────────── */

/// DEFAULT_FFT_SIZE is the transform length; the analysis window is zero-padded up to it.
pub const DEFAULT_FFT_SIZE: usize = 1024;

/// DEFAULT_MEL_FILTERS is the number of triangular Mel filters.
pub const DEFAULT_MEL_FILTERS: usize = 23;

/// DEFAULT_MFCC_COEFFS is the number of cepstral coefficients kept (c0 included).
pub const DEFAULT_MFCC_COEFFS: usize = 13;

/// PRE_EMPHASIS is the first-order high-pass coefficient.
pub const PRE_EMPHASIS: f32 = 0.97;

/// LOG_FLOOR is added to every Mel energy before the logarithm.
pub const LOG_FLOOR: f32 = 1e-10;

/// MIN_MAX_EPSILON keeps min-max scaling finite on constant input.
pub const MIN_MAX_EPSILON: f32 = 1e-6;

/// Mel scale: `MEL_SCALE · log10(1 + hz / MEL_BREAK_HZ)`.
pub const MEL_SCALE: f32 = 2595.0;
/// Corner frequency of the Mel scale in Hz.
pub const MEL_BREAK_HZ: f32 = 700.0;

/* ──────────────────────────── classifier ─────────────────────────── */

/// MODEL_FORMAT_VERSION is the version tag written into every model file.
pub const MODEL_FORMAT_VERSION: u8 = 1;

/// DEFAULT_CLASS_LABELS is the label table used when neither the model file
/// nor the configuration provides one.
pub const DEFAULT_CLASS_LABELS: [&str; 6] = ["Alarm", "Bell", "Crying Baby", "Noise", "Rain", "Rooster"];

/* ──────────────────────────── recording ──────────────────────────── */

/// DEFAULT_RECORD_SECONDS is the length of a dataset recording.
pub const DEFAULT_RECORD_SECONDS: u32 = 5;

/// Samples pulled from the source per read while recording.
pub(crate) const RECORD_CHUNK_SAMPLES: usize = 1024;

/// Longest accepted category name (it becomes a directory name).
pub const MAX_CATEGORY_LEN: usize = 32;

/// Duration in milliseconds covered by `samples` at `sample_rate`.
pub const fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64 * 1_000) / sample_rate as u64
}
