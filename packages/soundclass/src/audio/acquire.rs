//! Frame acquisition: lazy device start-up, warm-up discard and bounded retries.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::frame::AudioFrame;
use super::source::{AcquisitionError, PcmSource};
use crate::config::CaptureConfig;

/// Pulls complete [`AudioFrame`]s out of a [`PcmSource`].
///
/// * The first frame after a cold start is preceded by `warmup_samples`
///   discarded samples (the device settles during that time).
/// * A timed-out fill is retried `retries` times. Every retry restarts the
///   fill from scratch, so a returned frame never mixes two attempts.
/// * On failure the frame is left empty.
pub struct SampleAcquirer<S> {
    source: S,
    warmup_samples: usize,
    warmed_up: bool,
    timeout: Duration,
    retries: u32,
}

impl<S: PcmSource> SampleAcquirer<S> {
    pub fn new(source: S, cfg: &CaptureConfig) -> Self {
        Self {
            source,
            warmup_samples: cfg.warmup_samples,
            warmed_up: false,
            timeout: cfg.read_timeout(),
            retries: cfg.read_retries,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Initialise the device if it is not running yet.
    pub fn ensure_ready(&mut self) -> Result<(), AcquisitionError> {
        if self.source.is_ready() {
            return Ok(());
        }
        info!(rate = self.source.sample_rate(), "initialising capture device");
        self.source.init()?;
        self.warmed_up = false;
        Ok(())
    }

    /// Treat the next acquisition as a cold start.
    pub fn reset(&mut self) {
        self.warmed_up = false;
    }

    /// Fill `frame` completely or fail.
    pub fn acquire(&mut self, frame: &mut AudioFrame) -> Result<(), AcquisitionError> {
        if !self.source.is_ready() {
            return Err(AcquisitionError::DeviceNotReady);
        }

        if !self.warmed_up && self.warmup_samples > 0 {
            let warmup = self.warmup_samples;
            let res = self.retrying(|src, timeout| discard(src, frame, warmup, timeout));
            frame.clear();
            res?;
            debug!(samples = warmup, "discarded warm-up audio");
        }
        self.warmed_up = true;

        let res = self.retrying(|src, timeout| fill(src, frame, timeout));
        if res.is_err() {
            frame.clear();
        }
        res
    }

    /// Run `op` until it succeeds, fails with something other than a timeout,
    /// or the retry budget is spent.
    fn retrying<T>(
        &mut self,
        mut op: impl FnMut(&mut S, Duration) -> Result<T, AcquisitionError>,
    ) -> Result<T, AcquisitionError> {
        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            match op(&mut self.source, self.timeout) {
                Err(AcquisitionError::Timeout { .. }) if attempt < attempts => {
                    warn!(attempt, attempts, "capture read timed out, retrying");
                    attempt += 1;
                }
                Err(AcquisitionError::Timeout { .. }) => {
                    return Err(AcquisitionError::Timeout { attempts });
                }
                other => return other,
            }
        }
    }
}

fn fill<S: PcmSource>(
    source: &mut S,
    frame: &mut AudioFrame,
    timeout: Duration,
) -> Result<(), AcquisitionError> {
    frame.clear();
    while !frame.is_complete() {
        let n = source.read(frame.unfilled_mut(), timeout)?;
        if n == 0 {
            return Err(AcquisitionError::ShortRead {
                got: frame.filled(),
                expected: frame.len(),
            });
        }
        frame.advance(n);
    }
    Ok(())
}

fn discard<S: PcmSource>(
    source: &mut S,
    scratch: &mut AudioFrame,
    samples: usize,
    timeout: Duration,
) -> Result<(), AcquisitionError> {
    let buf = scratch.scratch_mut();
    let mut left = samples;
    while left > 0 {
        let chunk = left.min(buf.len());
        let n = source.read(&mut buf[..chunk], timeout)?;
        if n == 0 {
            return Err(AcquisitionError::ShortRead {
                got: samples - left,
                expected: samples,
            });
        }
        left -= n;
    }
    Ok(())
}
