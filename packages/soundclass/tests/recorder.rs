//! Dataset recorder: file layout, numbering and the one-at-a-time rule.

use std::path::Path;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use soundclass::{AcquisitionError, BufferSource, PcmSource, RecordError, Recorder, SoundClassConfig};

const RATE: u32 = 16_000;

fn recorder(root: &Path, samples: usize) -> Recorder {
    let mut cfg = SoundClassConfig::default();
    cfg.recording.root = root.to_path_buf();
    cfg.capture.read_timeout_ms = 5;
    Recorder::new(&cfg).with_samples(samples)
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i % 2000) as i16 - 1000).collect()
}

fn read_back(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut r = hound::WavReader::open(path).unwrap();
    let spec = r.spec();
    let samples = r.samples::<i16>().map(Result::unwrap).collect();
    (spec, samples)
}

/// Holds its first read until released.
struct GatedSource {
    inner: BufferSource,
    entered: Sender<()>,
    gate: Option<Receiver<()>>,
}

impl PcmSource for GatedSource {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }
    fn init(&mut self) -> Result<(), AcquisitionError> {
        self.inner.init()
    }
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> Result<usize, AcquisitionError> {
        if let Some(gate) = self.gate.take() {
            let _ = self.entered.send(());
            gate.recv_timeout(Duration::from_secs(10))
                .map_err(|_| AcquisitionError::Device("gate never opened".into()))?;
        }
        self.inner.read(buf, timeout)
    }
    fn sample_rate(&self) -> u32 {
        RATE
    }
}

struct DeadSource;

impl PcmSource for DeadSource {
    fn is_ready(&self) -> bool {
        true
    }
    fn init(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }
    fn read(&mut self, _buf: &mut [i16], _timeout: Duration) -> Result<usize, AcquisitionError> {
        Err(AcquisitionError::Timeout { attempts: 1 })
    }
    fn sample_rate(&self) -> u32 {
        RATE
    }
}

#[test]
fn writes_numbered_mono_clips() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 2_000);
    let audio = ramp(2_500);

    let first = rec
        .start("Rain", BufferSource::new(audio.clone(), RATE))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(first.path, dir.path().join("Rain").join("rec_1.wav"));
    assert_eq!(first.samples, 2_000);

    let (spec, samples) = read_back(&first.path);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(samples, &audio[..2_000]);

    let second = rec
        .start("Rain", BufferSource::new(audio, RATE))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(second.path.file_name().unwrap(), "rec_2.wav");
    assert!(!rec.is_recording());
}

#[test]
fn deleted_clip_does_not_free_a_taken_number() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 256);
    let clip = |level: i16| {
        rec.start("Rooster", BufferSource::new(vec![level; 256], RATE))
            .unwrap()
            .join()
            .unwrap()
    };

    let first = clip(1);
    let second = clip(2);
    std::fs::remove_file(&first.path).unwrap();
    let third = clip(3);

    assert_eq!(third.path.file_name().unwrap(), "rec_3.wav");
    assert_ne!(third.path, second.path);
    assert_eq!(read_back(&second.path).1, vec![2i16; 256]);
    assert_eq!(read_back(&third.path).1, vec![3i16; 256]);
}

#[test]
fn second_start_is_rejected_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 1_024);
    let (entered_tx, entered_rx) = bounded(1);
    let (gate_tx, gate_rx) = bounded(1);
    let source = GatedSource {
        inner: BufferSource::new(ramp(4_096), RATE),
        entered: entered_tx,
        gate: Some(gate_rx),
    };

    let handle = rec.start("Bell", source).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(rec.is_recording());

    let again = rec.start("Bell", BufferSource::new(ramp(1_024), RATE));
    assert!(matches!(again, Err(RecordError::AlreadyRecording)));

    gate_tx.send(()).unwrap();
    let summary = handle.join().unwrap();
    assert_eq!(summary.samples, 1_024);
    assert!(!rec.is_recording());

    // the flag is free again
    rec.start("Bell", BufferSource::new(ramp(1_024), RATE))
        .unwrap()
        .join()
        .unwrap();
}

#[test]
fn invalid_category_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 100);
    let res = rec.start("../escape", BufferSource::new(ramp(100), RATE));
    assert!(matches!(res, Err(RecordError::InvalidCategory(_))));
    assert!(!rec.is_recording());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn short_source_keeps_what_was_captured() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 5_000);
    let summary = rec
        .start("Noise", BufferSource::new(ramp(1_500), RATE))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(summary.samples, 1_500);
    assert_eq!(read_back(&summary.path).1.len(), 1_500);
}

#[test]
fn exhausted_timeouts_fail_and_release_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(dir.path(), 1_000);
    let err = rec.start("Alarm", DeadSource).unwrap().join().unwrap_err();
    assert!(matches!(
        err,
        RecordError::Acquisition(AcquisitionError::Timeout { attempts: 3 })
    ));
    assert!(!rec.is_recording());
}
