//! Classifier boundary.
//!
//! The pipeline only knows the [`Classifier`] trait: a model that declares its
//! input contract ([`TensorDescriptor`]) and maps one staged input vector to a
//! class index. [`CandleClassifier`] is the bundled implementation; tests and
//! embedders can plug in anything else.

mod model;
mod nn;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::config::ConfigError;
use crate::constants::DEFAULT_CLASS_LABELS;
use crate::mfcc::{NormalizationError, check_quant_params};

pub use model::{ClassifierModel, ModelIoError, ModelLoad, ModelSave, ModelType, ModelWeights, TensorData};
pub use nn::{CandleClassifier, ModelError};

/* ------------------------------------------------------------------------- */
/*  Errors                                                                   */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier invocation failed: {0}")]
    Invocation(String),

    #[error("class index {index} is outside the label table ({classes} classes)")]
    IndexOutOfRange { index: usize, classes: usize },

    #[error("classifier expected {expected} inputs, got {got}")]
    InputMismatch { expected: usize, got: usize },
}

/* ------------------------------------------------------------------------- */
/*  Input contract                                                           */
/* ------------------------------------------------------------------------- */

/// Element type of the classifier input tensor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputType {
    F32,
    I8,
}

/// Shape and encoding of the classifier input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    /// Number of elements.
    pub len: usize,
    pub dtype: InputType,
    /// Quantisation step; ignored for `f32`.
    pub scale: f32,
    /// Quantisation offset; ignored for `f32`.
    pub zero_point: i32,
}

impl TensorDescriptor {
    pub fn float(len: usize) -> Self {
        Self {
            len,
            dtype: InputType::F32,
            scale: 1.0,
            zero_point: 0,
        }
    }

    pub fn int8(len: usize, scale: f32, zero_point: i32) -> Self {
        Self {
            len,
            dtype: InputType::I8,
            scale,
            zero_point,
        }
    }

    /// Reject descriptors no input could satisfy.
    pub fn validate(&self) -> Result<(), NormalizationError> {
        if self.len == 0 {
            return Err(NormalizationError::EmptyInput);
        }
        if self.dtype == InputType::I8 {
            check_quant_params(self.scale, self.zero_point)?;
        }
        Ok(())
    }
}

/// Staged classifier input, allocated once per descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassifierInput {
    F32(Vec<f32>),
    I8(Vec<i8>),
}

impl ClassifierInput {
    pub fn for_descriptor(desc: &TensorDescriptor) -> Self {
        match desc.dtype {
            InputType::F32 => Self::F32(vec![0.0; desc.len]),
            InputType::I8 => Self::I8(vec![0; desc.len]),
        }
    }

    pub fn dtype(&self) -> InputType {
        match self {
            Self::F32(_) => InputType::F32,
            Self::I8(_) => InputType::I8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/* ------------------------------------------------------------------------- */
/*  Trait                                                                    */
/* ------------------------------------------------------------------------- */

/// A model that turns one staged input vector into a class index.
pub trait Classifier: Send {
    /// Input contract; fixed for the classifier's lifetime.
    fn input_descriptor(&self) -> &TensorDescriptor;

    /// Run inference. The returned index is *not* range-checked here.
    fn classify(&mut self, input: &ClassifierInput) -> Result<usize, ClassificationError>;

    /// Label table shipped with the model, if any.
    fn labels(&self) -> Option<&[String]> {
        None
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn input_descriptor(&self) -> &TensorDescriptor {
        (**self).input_descriptor()
    }
    fn classify(&mut self, input: &ClassifierInput) -> Result<usize, ClassificationError> {
        (**self).classify(input)
    }
    fn labels(&self) -> Option<&[String]> {
        (**self).labels()
    }
}

/* ------------------------------------------------------------------------- */
/*  Labels                                                                   */
/* ------------------------------------------------------------------------- */

/// Immutable, ordered class-name table. Cloning is cheap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabels {
    names: Arc<[Arc<str>]>,
}

impl ClassLabels {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Err(ConfigError::NoLabels);
        }
        Ok(Self {
            names: names.iter().map(|s| Arc::from(s.as_ref())).collect(),
        })
    }

    /// The built-in six-class table.
    pub fn defaults() -> Self {
        Self {
            names: DEFAULT_CLASS_LABELS.iter().map(|&s| Arc::from(s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `index`, or [`ClassificationError::IndexOutOfRange`].
    pub fn name(&self, index: usize) -> Result<Arc<str>, ClassificationError> {
        self.names
            .get(index)
            .cloned()
            .ok_or(ClassificationError::IndexOutOfRange {
                index,
                classes: self.names.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_ref())
    }
}

/// Index of the largest finite logit.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}
