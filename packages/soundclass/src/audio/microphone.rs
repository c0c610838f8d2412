//! Live capture through `cpal`.
//!
//! `cpal::Stream` is not `Send` on every host, so the stream lives on its own
//! thread for its whole life. The audio callback downmixes to mono, converts to
//! `i16` and forwards chunks over a bounded crossbeam channel; [`PcmSource::read`]
//! drains that channel with the caller's timeout.

use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{error, info, warn};

use super::audio_types::Sample;
use super::source::{AcquisitionError, PcmSource};

/// Chunks buffered between the audio callback and the reader (~4 s at 16 kHz).
const CHUNK_QUEUE: usize = 64;

pub struct MicrophoneSource {
    device_name: Option<String>,
    sample_rate: u32,
    stream: Option<StreamThread>,
    pending: Vec<i16>,
    pending_pos: usize,
}

struct StreamThread {
    data_rx: Receiver<Vec<i16>>,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    /// `device_name = None` picks the host's default input.
    pub fn new(device_name: Option<String>, sample_rate: u32) -> Self {
        Self {
            device_name,
            sample_rate,
            stream: None,
            pending: Vec::new(),
            pending_pos: 0,
        }
    }

    /// Names of the input devices the default host exposes.
    pub fn list_devices() -> Result<Vec<String>, AcquisitionError> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(device_err)?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl PcmSource for MicrophoneSource {
    fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    fn init(&mut self) -> Result<(), AcquisitionError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (data_tx, data_rx) = bounded::<Vec<i16>>(CHUNK_QUEUE);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), AcquisitionError>>(1);

        let device_name = self.device_name.clone();
        let rate = self.sample_rate;
        let handle = std::thread::Builder::new()
            .name("soundclass-mic".into())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), rate, data_tx) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // park until the source is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| AcquisitionError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => return Err(AcquisitionError::Device("capture thread exited".into())),
        }

        self.stream = Some(StreamThread {
            data_rx,
            shutdown_tx,
            handle: Some(handle),
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> Result<usize, AcquisitionError> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(AcquisitionError::DeviceNotReady);
        };
        if self.pending_pos == self.pending.len() {
            match stream.data_rx.recv_timeout(timeout) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pending_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AcquisitionError::Timeout { attempts: 1 });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AcquisitionError::Device("input stream closed".into()));
                }
            }
        }
        let n = buf.len().min(self.pending.len() - self.pending_pos);
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        Ok(n)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn device_err(e: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::Device(e.to_string())
}

fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    tx: Sender<Vec<i16>>,
) -> Result<cpal::Stream, AcquisitionError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(device_err)?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AcquisitionError::Device(format!("no input device named {name:?}")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| AcquisitionError::Device("no default input device".into()))?,
    };
    let supported = device.default_input_config().map_err(device_err)?;
    let channels = supported.channels() as usize;
    let config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(
        device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
        channels,
        sample_rate,
        format = ?supported.sample_format(),
        "opening input stream"
    );

    let on_err = |err: cpal::StreamError| error!("audio stream error: {err}");
    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(&tx, data, channels);
            },
            on_err,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&tx, data, channels);
            },
            on_err,
            None,
        ),
        other => {
            return Err(AcquisitionError::Device(format!(
                "unsupported device sample format {other:?}"
            )));
        }
    }
    .map_err(device_err)?;
    stream.play().map_err(device_err)?;
    Ok(stream)
}

/// Downmix interleaved `data` to mono `i16` and hand it to the reader.
fn forward<T: Sample>(tx: &Sender<Vec<i16>>, data: &[T], channels: usize) {
    // an empty chunk would read as end-of-stream
    if data.is_empty() {
        return;
    }
    let mono: Vec<i16> = if channels <= 1 {
        data.iter().map(|&s| i16::from_f32(s.into_f32())).collect()
    } else {
        data.chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s.into_f32()).sum();
                i16::from_f32(sum / frame.len() as f32)
            })
            .collect()
    };
    if tx.try_send(mono).is_err() {
        warn!("capture queue full, dropping audio chunk");
    }
}
