//! Dataset recorder.
//!
//! Captures a fixed-length clip from a [`PcmSource`] on a background thread and
//! writes it as 16-bit mono WAV to `<root>/<category>/rec_<n>.wav`, where `n`
//! is one past the highest clip number already in that directory. Existing
//! clips are never overwritten. Only one recording runs at a time; the flag is
//! released when the clip has been finalised, successfully or not.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use arrayvec::ArrayString;
use tracing::{info, warn};

use crate::audio::{AcquisitionError, PcmSource};
use crate::config::SoundClassConfig;
use crate::constants::{MAX_CATEGORY_LEN, RECORD_CHUNK_SAMPLES};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("recording already in progress")]
    AlreadyRecording,
    #[error("invalid category name {0:?}")]
    InvalidCategory(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
    #[error("capture: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("recording thread panicked")]
    Panicked,
}

pub type Category = ArrayString<MAX_CATEGORY_LEN>;

/// Result of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub samples: usize,
}

pub struct Recorder {
    root: PathBuf,
    sample_rate: u32,
    samples: usize,
    timeout: Duration,
    retries: u32,
    recording: Arc<AtomicBool>,
}

impl Recorder {
    pub fn new(cfg: &SoundClassConfig) -> Self {
        Self {
            root: cfg.recording.root.clone(),
            sample_rate: cfg.capture.sample_rate,
            samples: cfg.recording.duration_secs as usize * cfg.capture.sample_rate as usize,
            timeout: cfg.capture.read_timeout(),
            retries: cfg.capture.read_retries,
            recording: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the clip length.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Start recording `category` from `source` on a background thread.
    ///
    /// Fails immediately with [`RecordError::AlreadyRecording`] if another
    /// clip is still being captured.
    pub fn start<S: PcmSource + 'static>(
        &self,
        category: &str,
        source: S,
    ) -> Result<RecordingHandle, RecordError> {
        let category = parse_category(category)?;
        if self
            .recording
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecordError::AlreadyRecording);
        }
        let flag = FlagGuard(Arc::clone(&self.recording));

        let path = next_recording_path(&self.root, &category)?;
        let file = create_clip(&path)?;
        info!(path = %path.display(), samples = self.samples, "recording started");

        let job = CaptureJob {
            path: path.clone(),
            file,
            sample_rate: self.sample_rate,
            samples: self.samples,
            timeout: self.timeout,
            retries: self.retries,
        };
        let thread = std::thread::Builder::new()
            .name("soundclass-rec".into())
            .spawn(move || {
                let _flag = flag;
                job.run(source)
            })?;

        Ok(RecordingHandle { path, thread })
    }
}

/// Join handle for a recording in progress.
pub struct RecordingHandle {
    path: PathBuf,
    thread: JoinHandle<Result<RecordingSummary, RecordError>>,
}

impl RecordingHandle {
    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the clip to be written.
    pub fn join(self) -> Result<RecordingSummary, RecordError> {
        self.thread.join().map_err(|_| RecordError::Panicked)?
    }
}

/// Clears the recording flag when dropped.
struct FlagGuard(Arc<AtomicBool>);

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct CaptureJob {
    path: PathBuf,
    file: File,
    sample_rate: u32,
    samples: usize,
    timeout: Duration,
    retries: u32,
}

impl CaptureJob {
    fn run<S: PcmSource>(self, mut source: S) -> Result<RecordingSummary, RecordError> {
        if !source.is_ready() {
            if let Err(e) = source.init() {
                drop(self.file);
                fs::remove_file(&self.path)?;
                return Err(e.into());
            }
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(BufWriter::new(self.file), spec)?;
        let mut buf = [0i16; RECORD_CHUNK_SAMPLES];
        let mut written = 0;
        let mut timeouts = 0;

        while written < self.samples {
            let want = (self.samples - written).min(buf.len());
            match source.read(&mut buf[..want], self.timeout) {
                Ok(0) => {
                    warn!(written, wanted = self.samples, "source ended early");
                    break;
                }
                Ok(n) => {
                    timeouts = 0;
                    for &s in &buf[..n] {
                        writer.write_sample(s)?;
                    }
                    written += n;
                }
                Err(AcquisitionError::Timeout { .. }) if timeouts < self.retries => {
                    timeouts += 1;
                    warn!(attempt = timeouts, "recording read timed out, retrying");
                }
                Err(AcquisitionError::Timeout { .. }) => {
                    writer.finalize()?;
                    return Err(AcquisitionError::Timeout { attempts: timeouts + 1 }.into());
                }
                Err(e) => {
                    writer.finalize()?;
                    return Err(e.into());
                }
            }
        }
        writer.finalize()?;
        info!(path = %self.path.display(), samples = written, "recording saved");
        Ok(RecordingSummary {
            path: self.path,
            samples: written,
        })
    }
}

/// Category names become directory names: ASCII letters, digits, `_`, `-`
/// and spaces, at most [`MAX_CATEGORY_LEN`] bytes.
pub fn parse_category(name: &str) -> Result<Category, RecordError> {
    let trimmed = name.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '));
    if !valid {
        return Err(RecordError::InvalidCategory(name.to_string()));
    }
    ArrayString::from(trimmed).map_err(|_| RecordError::InvalidCategory(name.to_string()))
}

/// `<root>/<category>/rec_<n>.wav` with `n` one past the highest existing
/// `rec_<k>.wav`. Creates the category directory if needed.
pub fn next_recording_path(root: &Path, category: &str) -> Result<PathBuf, RecordError> {
    let dir = root.join(category);
    fs::create_dir_all(&dir)?;
    let mut highest = 0u64;
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if let Some(k) = entry.file_name().to_str().and_then(clip_number) {
            highest = highest.max(k);
        }
    }
    Ok(dir.join(format!("rec_{}.wav", highest + 1)))
}

/// `rec_12.wav` → `12`.
fn clip_number(name: &str) -> Option<u64> {
    let stem = name.strip_prefix("rec_")?;
    let (digits, ext) = stem.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case("wav") {
        return None;
    }
    digits.parse().ok()
}

/// Claim `path` for a new clip; an existing file is an error, never truncated.
fn create_clip(path: &Path) -> Result<File, RecordError> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_validation() {
        assert_eq!(parse_category(" Crying Baby ").unwrap().as_str(), "Crying Baby");
        assert!(matches!(parse_category("../etc"), Err(RecordError::InvalidCategory(_))));
        assert!(matches!(parse_category(""), Err(RecordError::InvalidCategory(_))));
        let long = "x".repeat(MAX_CATEGORY_LEN + 1);
        assert!(matches!(parse_category(&long), Err(RecordError::InvalidCategory(_))));
    }

    #[test]
    fn numbering_follows_highest_clip() {
        let dir = tempfile::tempdir().unwrap();
        let first = next_recording_path(dir.path(), "Bell").unwrap();
        assert_eq!(first, dir.path().join("Bell").join("rec_1.wav"));

        let bell = dir.path().join("Bell");
        fs::write(bell.join("rec_4.wav"), b"").unwrap();
        fs::write(bell.join("rec_x.wav"), b"").unwrap();
        fs::write(bell.join("rec_9.txt"), b"").unwrap();
        fs::write(bell.join("take.wav"), b"").unwrap();
        let next = next_recording_path(dir.path(), "Bell").unwrap();
        assert_eq!(next.file_name().unwrap(), "rec_5.wav");
    }

    #[test]
    fn clip_numbers() {
        assert_eq!(clip_number("rec_12.wav"), Some(12));
        assert_eq!(clip_number("rec_3.WAV"), Some(3));
        assert_eq!(clip_number("rec_.wav"), None);
        assert_eq!(clip_number("clip_3.wav"), None);
    }

    #[test]
    fn existing_clip_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec_1.wav");
        fs::write(&path, b"keep").unwrap();
        let err = create_clip(&path).unwrap_err();
        assert!(matches!(err, RecordError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read(&path).unwrap(), b"keep");
    }
}
