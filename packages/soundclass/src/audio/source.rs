//! PCM sources: the boundary between the pipeline and whatever produces audio.
//!
//! A source delivers signed 16-bit mono samples at a fixed rate. Reads are
//! bounded by a timeout; a source that cannot deliver anything in time must
//! return [`AcquisitionError::Timeout`] instead of blocking forever.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::audio_types::{Sample, SampleFormat};

/// Failures while pulling samples from a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("read timed out ({attempts} attempt(s))")]
    Timeout { attempts: u32 },

    #[error("capture device is not initialised")]
    DeviceNotReady,

    #[error("stream ended after {got} of {expected} samples")]
    ShortRead { got: usize, expected: usize },

    #[error("device: {0}")]
    Device(String),
}

/// Anything the acquirer can pull mono `i16` PCM from.
pub trait PcmSource: Send {
    /// `true` once [`PcmSource::init`] has succeeded.
    fn is_ready(&self) -> bool;

    /// Bring the device up. Idempotent.
    fn init(&mut self) -> Result<(), AcquisitionError>;

    /// Fill at most `buf.len()` samples, waiting no longer than `timeout`.
    ///
    /// Returns the number of samples written; `Ok(0)` means the stream has ended.
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> Result<usize, AcquisitionError>;

    /// Rate the samples are delivered at (Hz).
    fn sample_rate(&self) -> u32;
}

impl<S: PcmSource + ?Sized> PcmSource for Box<S> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
    fn init(&mut self) -> Result<(), AcquisitionError> {
        (**self).init()
    }
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> Result<usize, AcquisitionError> {
        (**self).read(buf, timeout)
    }
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/* ───────────────────────────── in-memory ──────────────────────────── */

/// Serves a fixed sample buffer, optionally looping over it.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Vec<i16>,
    pos: usize,
    sample_rate: u32,
    looping: bool,
    ready: bool,
}

impl BufferSource {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            pos: 0,
            sample_rate,
            looping: false,
            ready: false,
        }
    }

    /// Restart from the beginning instead of ending the stream.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Samples not yet handed out (ignores looping).
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.pos
    }
}

impl PcmSource for BufferSource {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn init(&mut self) -> Result<(), AcquisitionError> {
        self.ready = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], _timeout: Duration) -> Result<usize, AcquisitionError> {
        if !self.ready {
            return Err(AcquisitionError::DeviceNotReady);
        }
        if self.pos == self.samples.len() && self.looping && !self.samples.is_empty() {
            self.pos = 0;
        }
        let n = buf.len().min(self.samples.len() - self.pos);
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/* ───────────────────────────── WAV file ───────────────────────────── */

/// Streams a mono WAV file (16-bit int or 32-bit float) as `i16` samples.
pub struct WavSource {
    reader: hound::WavReader<BufReader<File>>,
    format: SampleFormat,
    sample_rate: u32,
    ready: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)
            .map_err(|e| AcquisitionError::Device(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(AcquisitionError::Device(format!(
                "{}: expected mono audio, found {} channels",
                path.display(),
                spec.channels
            )));
        }
        let format = SampleFormat::from_wav_spec(&spec).ok_or_else(|| {
            AcquisitionError::Device(format!(
                "{}: unsupported sample format ({:?}, {} bit)",
                path.display(),
                spec.sample_format,
                spec.bits_per_sample
            ))
        })?;
        debug!(path = %path.display(), rate = spec.sample_rate, ?format, "opened wav source");
        Ok(Self {
            reader,
            format,
            sample_rate: spec.sample_rate,
            ready: false,
        })
    }

    /// Total samples in the file.
    pub fn total_samples(&self) -> u32 {
        self.reader.len()
    }
}

impl PcmSource for WavSource {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn init(&mut self) -> Result<(), AcquisitionError> {
        self.ready = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], _timeout: Duration) -> Result<usize, AcquisitionError> {
        if !self.ready {
            return Err(AcquisitionError::DeviceNotReady);
        }
        let mut n = 0;
        match self.format {
            SampleFormat::I16 => {
                for (dst, s) in buf.iter_mut().zip(self.reader.samples::<i16>()) {
                    *dst = s.map_err(|e| AcquisitionError::Device(e.to_string()))?;
                    n += 1;
                }
            }
            SampleFormat::F32 => {
                for (dst, s) in buf.iter_mut().zip(self.reader.samples::<f32>()) {
                    *dst = i16::from_f32(s.map_err(|e| AcquisitionError::Device(e.to_string()))?);
                    n += 1;
                }
            }
        }
        Ok(n)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Read a whole mono WAV file into memory as `i16`.
pub fn read_wav(path: impl AsRef<Path>) -> Result<(Vec<i16>, u32), AcquisitionError> {
    let mut src = WavSource::open(path)?;
    src.init()?;
    let mut out = vec![0i16; src.total_samples() as usize];
    let n = src.read(&mut out, Duration::ZERO)?;
    out.truncate(n);
    Ok((out, src.sample_rate))
}
