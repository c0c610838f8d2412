pub mod acquire;
pub mod audio_types;
pub mod frame;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod source;

/* handy re-exports */
pub use acquire::SampleAcquirer;
pub use audio_types::{Sample, SampleFormat};
pub use frame::AudioFrame;
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;
pub use source::{AcquisitionError, BufferSource, PcmSource, WavSource, read_wav};
