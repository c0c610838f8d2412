use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{Pipeline, PipelineError, PipelineStats, Prediction};
use crate::audio::PcmSource;
use crate::classifier::Classifier;

/// Cloneable handle that lets several request handlers trigger cycles on one
/// pipeline.
///
/// At most one cycle is in flight at a time. A request that arrives while
/// another cycle holds the pipeline is rejected with
/// [`PipelineError::Busy`] instead of queueing behind it.
pub struct SharedPipeline<S, C> {
    inner: Arc<Mutex<Pipeline<S, C>>>,
}

impl<S, C> Clone for SharedPipeline<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PcmSource, C: Classifier> SharedPipeline<S, C> {
    pub fn new(pipeline: Pipeline<S, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// Run one cycle, or fail fast if one is already running.
    pub fn predict(&self) -> Result<Prediction, PipelineError> {
        let Some(mut pipeline) = self.inner.try_lock() else {
            debug!("rejecting request: cycle in flight");
            return Err(PipelineError::Busy);
        };
        pipeline.run_cycle()
    }

    /// `true` while a cycle holds the pipeline.
    pub fn is_busy(&self) -> bool {
        self.inner.is_locked()
    }

    /// Counters snapshot; waits for an in-flight cycle to finish.
    pub fn stats(&self) -> PipelineStats {
        self.inner.lock().stats()
    }
}
