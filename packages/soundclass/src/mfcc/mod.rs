//! Spectral front-end: pre-emphasis → Hamming → FFT → Mel filterbank → log → DCT.

mod dct;
mod extractor;
mod fft;
mod filterbank;
mod normalizer;
mod spectrum;
mod window;

pub use dct::DctMatrix;
pub use extractor::{FeatureExtractor, FeatureScratch, project};
pub use fft::Radix2Fft;
pub use filterbank::{MelFilterbank, hz_to_mel, mel_to_hz};
pub use normalizer::{FeatureNormalizer, NormalizationError};
pub(crate) use normalizer::check_quant_params;
pub use spectrum::{SpectralBuffer, SpectralTransform};
pub use window::{HammingWindow, pre_emphasis};
