//! Feature scaling and int8 quantisation.
//!
//! The classifier declares what it wants through a
//! [`TensorDescriptor`]: a length, an element type and, for `i8` inputs, the
//! affine `(scale, zero_point)` pair. `FeatureNormalizer` is the only place
//! that maps front-end output onto that contract.
//!
//! ```rust
//! use soundclass::mfcc::FeatureNormalizer;
//!
//! let mut scaled = [0f32; 3];
//! FeatureNormalizer::min_max(&[-2i16, 0, 2], &mut scaled)?;
//! assert!((scaled[0] - 0.0).abs() < 1e-5 && (scaled[2] - 1.0).abs() < 1e-5);
//!
//! let q = FeatureNormalizer::quantize(0.5, 0.25, -3);
//! assert_eq!(q, -1);
//! # Ok::<(), soundclass::mfcc::NormalizationError>(())
//! ```

use crate::audio::Sample;
use crate::classifier::{ClassifierInput, InputType, TensorDescriptor};
use crate::constants::MIN_MAX_EPSILON;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("feature length {got} does not match classifier input length {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("input descriptor says {expected} but the staging buffer holds {got}")]
    DtypeMismatch { expected: InputType, got: InputType },

    #[error("classifier input descriptor has zero length")]
    EmptyInput,

    #[error("quantisation scale {0} must be finite and positive")]
    InvalidScale(f32),

    #[error("zero point {0} is outside the int8 range")]
    InvalidZeroPoint(i32),
}

/// Stateless helper for feature scaling.
pub struct FeatureNormalizer;

impl FeatureNormalizer {
    /// Min-max scale `raw` into `[0, 1]`.
    ///
    /// `(x - min) / max(max - min, ε)`: constant input maps to all zeros
    /// instead of NaN.
    pub fn min_max<T: Sample>(raw: &[T], out: &mut [f32]) -> Result<(), NormalizationError> {
        if raw.len() != out.len() {
            return Err(NormalizationError::LengthMismatch {
                expected: out.len(),
                got: raw.len(),
            });
        }
        let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
        for (o, &s) in out.iter_mut().zip(raw) {
            let v = s.into_f32();
            lo = lo.min(v);
            hi = hi.max(v);
            *o = v;
        }
        let range = (hi - lo).max(MIN_MAX_EPSILON);
        for o in out.iter_mut() {
            *o = (*o - lo) / range;
        }
        Ok(())
    }

    /// `clamp(round(x / scale) + zero_point, -128, 127)`
    #[inline]
    pub fn quantize(x: f32, scale: f32, zero_point: i32) -> i8 {
        let q = (x / scale).round() as i32 + zero_point;
        q.clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    /// `(q - zero_point) · scale`
    #[inline]
    pub fn dequantize(q: i8, scale: f32, zero_point: i32) -> f32 {
        (q as i32 - zero_point) as f32 * scale
    }

    /// Quantise a whole vector.
    pub fn quantize_into(
        features: &[f32],
        out: &mut [i8],
        scale: f32,
        zero_point: i32,
    ) -> Result<(), NormalizationError> {
        check_quant_params(scale, zero_point)?;
        if features.len() != out.len() {
            return Err(NormalizationError::LengthMismatch {
                expected: out.len(),
                got: features.len(),
            });
        }
        for (q, &x) in out.iter_mut().zip(features) {
            *q = Self::quantize(x, scale, zero_point);
        }
        Ok(())
    }

    /// Dequantise a whole vector.
    pub fn dequantize_into(
        quantized: &[i8],
        out: &mut [f32],
        scale: f32,
        zero_point: i32,
    ) -> Result<(), NormalizationError> {
        check_quant_params(scale, zero_point)?;
        if quantized.len() != out.len() {
            return Err(NormalizationError::LengthMismatch {
                expected: out.len(),
                got: quantized.len(),
            });
        }
        for (x, &q) in out.iter_mut().zip(quantized) {
            *x = Self::dequantize(q, scale, zero_point);
        }
        Ok(())
    }

    /// Write `features` into the classifier's staging buffer, quantising when
    /// the descriptor asks for `i8`. No allocation.
    pub fn to_classifier_input(
        features: &[f32],
        desc: &TensorDescriptor,
        input: &mut ClassifierInput,
    ) -> Result<(), NormalizationError> {
        if features.len() != desc.len {
            return Err(NormalizationError::LengthMismatch {
                expected: desc.len,
                got: features.len(),
            });
        }
        match input {
            ClassifierInput::F32(buf) if desc.dtype == InputType::F32 => {
                if buf.len() != desc.len {
                    return Err(NormalizationError::LengthMismatch {
                        expected: desc.len,
                        got: buf.len(),
                    });
                }
                buf.copy_from_slice(features);
                Ok(())
            }
            ClassifierInput::I8(buf) if desc.dtype == InputType::I8 => {
                Self::quantize_into(features, buf, desc.scale, desc.zero_point)
            }
            other => Err(NormalizationError::DtypeMismatch {
                expected: desc.dtype,
                got: other.dtype(),
            }),
        }
    }

    /// Cepstral mean normalisation: subtract the per-coefficient mean so every
    /// column of `frames` has zero mean.
    pub fn mean_centre(frames: &mut [Vec<f32>]) {
        let Some(first) = frames.first() else {
            return;
        };
        let mut mean = vec![0f32; first.len()];

        // --- accumulate column-wise sum ----------------------------------
        for f in frames.iter() {
            debug_assert_eq!(f.len(), mean.len(), "ragged feature frames");
            for (m, &v) in mean.iter_mut().zip(f) {
                *m += v;
            }
        }

        // --- sums → means, then subtract ---------------------------------
        let n_inv = 1.0 / frames.len() as f32;
        mean.iter_mut().for_each(|m| *m *= n_inv);
        for f in frames.iter_mut() {
            for (v, m) in f.iter_mut().zip(&mean) {
                *v -= m;
            }
        }
    }
}

pub(crate) fn check_quant_params(scale: f32, zero_point: i32) -> Result<(), NormalizationError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(NormalizationError::InvalidScale(scale));
    }
    if !(i8::MIN as i32..=i8::MAX as i32).contains(&zero_point) {
        return Err(NormalizationError::InvalidZeroPoint(zero_point));
    }
    Ok(())
}

/* --------------------------------------------------------------------- */
/*  Unit-tests                                                           */

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn min_max_spans_unit_interval() {
        let raw = [-1000i16, 0, 500, 3000];
        let mut out = [0f32; 4];
        FeatureNormalizer::min_max(&raw, &mut out).unwrap();
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[3], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.25, epsilon = 1e-4);
    }

    #[test]
    fn constant_input_is_finite_zero() {
        let mut out = [f32::NAN; 16];
        FeatureNormalizer::min_max(&[1234i16; 16], &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));

        FeatureNormalizer::min_max(&[0.3f32; 16], &mut out).unwrap();
        assert!(out.iter().all(|&v| v.is_finite() && v == 0.0));
    }

    #[test]
    fn min_max_rejects_wrong_length() {
        let mut out = [0f32; 3];
        assert_eq!(
            FeatureNormalizer::min_max(&[1i16, 2], &mut out),
            Err(NormalizationError::LengthMismatch { expected: 3, got: 2 })
        );
    }

    #[test]
    fn quantize_round_trip_within_one_step() {
        let (scale, zp) = (0.05f32, 7);
        for i in -100..100 {
            let x = i as f32 * 0.0371;
            let q = FeatureNormalizer::quantize(x, scale, zp);
            let back = FeatureNormalizer::dequantize(q, scale, zp);
            assert!((back - x).abs() <= scale, "x={x} back={back}");
        }
    }

    #[test]
    fn quantize_saturates() {
        assert_eq!(FeatureNormalizer::quantize(1e6, 0.1, 0), 127);
        assert_eq!(FeatureNormalizer::quantize(-1e6, 0.1, 0), -128);
        assert_eq!(FeatureNormalizer::quantize(0.0, 0.1, -128), -128);
    }

    #[test]
    fn classifier_input_follows_descriptor() {
        let feats = [0.0f32, 0.5, -0.5];

        let desc = TensorDescriptor::float(3);
        let mut input = ClassifierInput::for_descriptor(&desc);
        FeatureNormalizer::to_classifier_input(&feats, &desc, &mut input).unwrap();
        assert_eq!(input, ClassifierInput::F32(vec![0.0, 0.5, -0.5]));

        let desc = TensorDescriptor::int8(3, 0.25, 1);
        let mut input = ClassifierInput::for_descriptor(&desc);
        FeatureNormalizer::to_classifier_input(&feats, &desc, &mut input).unwrap();
        assert_eq!(input, ClassifierInput::I8(vec![1, 3, -1]));
    }

    #[test]
    fn classifier_input_length_mismatch_is_an_error() {
        let desc = TensorDescriptor::float(4);
        let mut input = ClassifierInput::for_descriptor(&desc);
        assert_eq!(
            FeatureNormalizer::to_classifier_input(&[0.0; 3], &desc, &mut input),
            Err(NormalizationError::LengthMismatch { expected: 4, got: 3 })
        );
    }

    #[test]
    fn bad_scale_is_rejected() {
        let mut out = [0i8; 2];
        assert_eq!(
            FeatureNormalizer::quantize_into(&[0.0, 1.0], &mut out, 0.0, 0),
            Err(NormalizationError::InvalidScale(0.0))
        );
    }

    #[test]
    fn mean_centre_zeroes_column_means() {
        let mut frames = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]];
        FeatureNormalizer::mean_centre(&mut frames);
        for j in 0..3 {
            let s: f32 = frames.iter().map(|f| f[j]).sum();
            assert!(s.abs() < 1e-5);
        }
    }
}
