//! soundclass – public crate root
//! ==============================
//! MFCC front-end and sound classification pipeline for fixed-length mono PCM
//! frames (1024 samples @ 16 kHz by default).
//!
//! * [`audio`] acquires complete frames from a microphone, a WAV file or a
//!   buffer, with warm-up discard and bounded timeout retries.
//! * [`mfcc`] turns a frame into a fixed-length feature vector: pre-emphasis,
//!   Hamming window, radix-2 FFT, Mel filterbank, log, DCT-II.
//! * [`classifier`] defines the inference seam plus a Candle-backed
//!   implementation and its on-disk model format.
//! * [`pipeline`] drives acquire → extract → normalise → classify as a small
//!   state machine that always returns to idle.
//
//  ───────────────────────────────────────────────────────────────────────────
//  Everything on the per-frame path works on preallocated buffers; only
//  construction and the offline helpers allocate.
//  ───────────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod audio;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod mfcc;
pub mod pipeline;
pub mod recorder;
pub mod report;

/* ─────────────────────────  re-exports  ─────────────────────────────── */
pub use audio::{AcquisitionError, AudioFrame, BufferSource, PcmSource, SampleAcquirer, WavSource};
pub use classifier::{
    CandleClassifier, ClassLabels, ClassificationError, Classifier, ClassifierInput,
    ClassifierModel, InputType, ModelType, TensorDescriptor,
};
pub use config::{ConfigError, FeatureMode, SoundClassConfig};
pub use mfcc::{FeatureExtractor, FeatureNormalizer, NormalizationError};
pub use pipeline::{Pipeline, PipelineError, PipelineState, Prediction, SharedPipeline};
pub use recorder::{RecordError, Recorder, RecordingHandle, RecordingSummary};
pub use report::PredictionResponse;
