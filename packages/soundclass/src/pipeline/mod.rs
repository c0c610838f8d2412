//! Acquire → extract → normalise → classify.
//!
//! A [`Pipeline`] owns one capture source, one classifier and every buffer a
//! cycle needs; after construction the steady-state loop performs no heap
//! allocation on the feature path. One cycle walks the state machine
//!
//! ```text
//! Idle ─▶ Capturing ─▶ Processing ─▶ Classifying ─▶ Idle
//!              │             │              │
//!              └──── failure: report, back to Idle ─┘
//! ```
//!
//! and always returns to `Idle`, whatever the outcome. Failures of one cycle
//! never poison the next.

mod shared;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::audio::{AcquisitionError, AudioFrame, PcmSource, SampleAcquirer};
use crate::classifier::{ClassLabels, ClassificationError, Classifier, ClassifierInput};
use crate::config::{ConfigError, SoundClassConfig};
use crate::constants::samples_to_ms;
use crate::mfcc::{FeatureExtractor, FeatureNormalizer, FeatureScratch, NormalizationError};

pub use shared::SharedPipeline;

/* ------------------------------------------------------------------------- */
/*  Errors & results                                                         */
/* ------------------------------------------------------------------------- */

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("acquisition: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("normalisation: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("classification: {0}")]
    Classification(#[from] ClassificationError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("a capture cycle is already in progress")]
    Busy,
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum PipelineState {
    #[default]
    Idle,
    Capturing,
    Processing,
    Classifying,
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub index: usize,
    pub label: Arc<str>,
}

/// Running counters, mostly for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Cycles started.
    pub cycles: u64,
    /// Frames that reached feature extraction.
    pub frames_processed: u64,
    /// Inputs handed to the classifier.
    pub classifications: u64,
    pub acquisition_failures: u64,
    pub classification_failures: u64,
}

/* ------------------------------------------------------------------------- */
/*  Pipeline                                                                 */
/* ------------------------------------------------------------------------- */

pub struct Pipeline<S, C> {
    // ─── stages ───
    acquirer: SampleAcquirer<S>,
    extractor: Arc<FeatureExtractor>,
    classifier: C,
    labels: ClassLabels,

    // ─── preallocated buffers ───
    frame: AudioFrame,
    scratch: FeatureScratch,
    input: ClassifierInput,

    // ─── runtime state ───
    state: PipelineState,
    stats: PipelineStats,
}

impl<S: PcmSource, C: Classifier> Pipeline<S, C> {
    /// Build a pipeline with its own feature tables.
    pub fn new(
        cfg: &SoundClassConfig,
        source: S,
        classifier: C,
        labels: ClassLabels,
    ) -> Result<Self, PipelineError> {
        let extractor = Arc::new(FeatureExtractor::new(cfg)?);
        Self::with_extractor(cfg, extractor, source, classifier, labels)
    }

    /// Build a pipeline that shares already-built feature tables.
    ///
    /// Checks the classifier's input contract against the configured
    /// front-end; any mismatch is a [`ConfigError`].
    pub fn with_extractor(
        cfg: &SoundClassConfig,
        extractor: Arc<FeatureExtractor>,
        source: S,
        classifier: C,
        labels: ClassLabels,
    ) -> Result<Self, PipelineError> {
        cfg.validate()?;
        let desc = classifier.input_descriptor().clone();
        desc.validate()?;
        if desc.len != extractor.feature_len() {
            return Err(ConfigError::ContractMismatch {
                mode: extractor.mode(),
                expected: desc.len,
                produced: extractor.feature_len(),
            }
            .into());
        }
        if extractor.frame_len() != cfg.capture.frame_length {
            return Err(ConfigError::FrameMismatch {
                tables: extractor.frame_len(),
                capture: cfg.capture.frame_length,
            }
            .into());
        }
        if source.sample_rate() != cfg.capture.sample_rate {
            warn!(
                source = source.sample_rate(),
                configured = cfg.capture.sample_rate,
                "source sample rate differs from configuration"
            );
        }
        info!(
            frame = cfg.capture.frame_length,
            frame_ms = samples_to_ms(cfg.capture.frame_length, cfg.capture.sample_rate),
            mode = %extractor.mode(),
            inputs = desc.len,
            dtype = %desc.dtype,
            classes = labels.len(),
            "pipeline ready"
        );

        Ok(Self {
            acquirer: SampleAcquirer::new(source, &cfg.capture),
            scratch: extractor.scratch(),
            frame: AudioFrame::new(cfg.capture.frame_length),
            input: ClassifierInput::for_descriptor(&desc),
            extractor,
            classifier,
            labels,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        })
    }

    /* ---------------- accessors ------------------- */

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn extractor(&self) -> &Arc<FeatureExtractor> {
        &self.extractor
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn source(&self) -> &S {
        self.acquirer.source()
    }

    /// Features computed in the most recent cycle that reached extraction.
    pub fn last_features(&self) -> &[f32] {
        self.scratch.features()
    }

    /// Force a warm-up discard before the next frame (e.g. after a pause).
    pub fn reset_capture(&mut self) {
        self.acquirer.reset();
    }

    pub fn into_parts(self) -> (S, C) {
        (self.acquirer.into_source(), self.classifier)
    }

    /* ---------------- cycle ----------------------- */

    /// Run one capture → classify cycle.
    ///
    /// Whatever happens, the pipeline is back in [`PipelineState::Idle`] when
    /// this returns.
    #[instrument(level = "debug", skip(self), fields(cycle = self.stats.cycles + 1))]
    pub fn run_cycle(&mut self) -> Result<Prediction, PipelineError> {
        self.stats.cycles += 1;
        let outcome = self.cycle();
        self.transition(PipelineState::Idle);
        match &outcome {
            Ok(p) => debug!(index = p.index, label = %p.label, "cycle complete"),
            Err(PipelineError::Acquisition(e)) => {
                self.stats.acquisition_failures += 1;
                warn!(error = %e, "acquisition failed");
            }
            Err(PipelineError::Classification(e)) => {
                self.stats.classification_failures += 1;
                warn!(error = %e, "classification failed");
            }
            Err(e) => warn!(error = %e, "cycle failed"),
        }
        outcome
    }

    /// Cycle until `stop` is raised, handing every outcome to `on_cycle`.
    ///
    /// Returns the number of cycles run. Failed cycles do not end the loop.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut on_cycle: F) -> u64
    where
        F: FnMut(&Result<Prediction, PipelineError>),
    {
        let mut n = 0;
        while !stop.load(Ordering::Acquire) {
            let outcome = self.run_cycle();
            on_cycle(&outcome);
            n += 1;
        }
        info!(cycles = n, "pipeline stopped");
        n
    }

    fn cycle(&mut self) -> Result<Prediction, PipelineError> {
        // Idle → Capturing: lazy device init
        self.transition(PipelineState::Capturing);
        self.acquirer.ensure_ready()?;
        self.acquirer.acquire(&mut self.frame)?;

        // Capturing → Processing: only with a complete frame
        self.transition(PipelineState::Processing);
        self.stats.frames_processed += 1;
        let features = self.extractor.extract(&self.frame, &mut self.scratch)?;
        FeatureNormalizer::to_classifier_input(
            features,
            self.classifier.input_descriptor(),
            &mut self.input,
        )?;

        // Processing → Classifying
        self.transition(PipelineState::Classifying);
        self.stats.classifications += 1;
        let index = self.classifier.classify(&self.input)?;
        let label = self.labels.name(index)?;
        Ok(Prediction { index, label })
    }

    #[inline]
    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state");
            self.state = next;
        }
    }
}
