//! Audio sample-format primitives used by the sources, the recorder and the
//! raw-sample normaliser.
//
//  • `SampleFormat` mirrors what a WAV header can tell us.
//  • `Sample` is implemented via a macro for every scalar we accept; the
//    conversions map full scale onto [-1, 1] and saturate on the way back.

/* ─────────────────────────────── ENUMS ─────────────────────────────── */

/// PCM sample encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit signed integer samples.
    I16,
    /// 32-bit floating point samples.
    F32,
}

impl SampleFormat {
    /// Format described by a WAV header, if we can consume it.
    pub fn from_wav_spec(spec: &hound::WavSpec) -> Option<Self> {
        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => Some(Self::I16),
            (hound::SampleFormat::Float, 32) => Some(Self::F32),
            _ => None,
        }
    }
}

/* ──────────────────────────── TRAIT CORE ───────────────────────────── */

/// A scalar type accepted by the front-end.
///
/// *All* conversions are inline and panic-free.
pub trait Sample: Copy + PartialOrd + Send + 'static {
    /// Full-scale value mapped onto `[-1, 1]`.
    fn into_f32(self) -> f32;
    /// Inverse of [`Sample::into_f32`], saturating outside `[-1, 1]`.
    fn from_f32(v: f32) -> Self;
}

/* ───────────────────── blanket impl via macro ──────────────────────── */

macro_rules! with_sample_type {
    ($ty:ty, $to_f32:expr, $from_f32:expr) => {
        impl Sample for $ty {
            #[inline]
            fn into_f32(self) -> f32 {
                $to_f32(self)
            }
            #[inline]
            fn from_f32(v: f32) -> Self {
                $from_f32(v)
            }
        }
    };
}

/// `-i16::MIN`: makes -32768 map exactly onto -1.0.
const I16_FULL_SCALE: f32 = 32_768.0;

/* i16 */
with_sample_type!(
    i16,
    |v: i16| v as f32 / I16_FULL_SCALE,
    |v: f32| (v * I16_FULL_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
);
/* f32 */
with_sample_type!(f32, |v: f32| v, |v: f32| v.clamp(-1.0, 1.0));
