use candle_core::Module; // <-- brings `forward()` into scope
use candle_core::{DType, Device, Result as CandleResult, Tensor, Var};
use candle_nn::{Linear, VarBuilder, VarMap};
use indexmap::IndexMap;
use tracing::debug;

use super::model::{ClassifierModel, ModelType, ModelWeights, TensorData};
use super::{ClassificationError, Classifier, ClassifierInput, TensorDescriptor, argmax};
use crate::constants::MODEL_FORMAT_VERSION;
use crate::mfcc::{FeatureNormalizer, NormalizationError};

/* ------------------------------------------------------------------------- */
/*  Error handling                                                           */
/* ------------------------------------------------------------------------- */

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("model weight '{0}' missing in checkpoint")]
    MissingWeight(String),
    #[error("tensor data malformed: {0}")]
    TensorData(String),
    #[error("input descriptor: {0}")]
    Descriptor(#[from] NormalizationError),
    #[error("model has no labels")]
    NoLabels,
    #[error("unsupported model format version {found} (expected {expected})")]
    Version { found: u8, expected: u8 },
}

/* ------------------------------------------------------------------------- */
/*  Public struct                                                            */
/* ------------------------------------------------------------------------- */

/// Fully connected network evaluated with candle on the CPU.
///
/// `i8` inputs are dequantised with the descriptor's own `(scale, zero_point)`
/// before the forward pass, so a quantised contract and float weights can be
/// mixed freely.
pub struct CandleClassifier {
    net: Box<dyn ModelImpl>,
    descriptor: TensorDescriptor,
    labels: Vec<String>,
    m_type: ModelType,
    // staging buffer reused between calls
    staging: Vec<f32>,
}

impl CandleClassifier {
    /* ---------------- constructors ---------------- */

    /// Rebuild the network stored in `model`.
    pub fn new(model: &ClassifierModel) -> Result<Self, ModelError> {
        if model.version() != MODEL_FORMAT_VERSION {
            return Err(ModelError::Version {
                found: model.version(),
                expected: MODEL_FORMAT_VERSION,
            });
        }
        if model.labels.is_empty() {
            return Err(ModelError::NoLabels);
        }
        model.input.validate()?;

        let var_map = VarMap::new();
        let net = init_model(
            model.m_type,
            &var_map,
            model.input.len,
            model.labels.len(),
        )?;
        try_load_weights(&var_map, &model.weights)?;
        debug!(
            m_type = %model.m_type,
            inputs = model.input.len,
            classes = model.labels.len(),
            "classifier loaded"
        );

        Ok(Self {
            net,
            descriptor: model.input.clone(),
            labels: model.labels.clone(),
            m_type: model.m_type,
            staging: vec![0.0; model.input.len],
        })
    }

    /// A randomly initialised, untrained model; handy for wiring up a device
    /// before real weights exist.
    pub fn fresh_model(
        m_type: ModelType,
        input: TensorDescriptor,
        labels: Vec<String>,
    ) -> Result<ClassifierModel, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::NoLabels);
        }
        input.validate()?;
        let var_map = VarMap::new();
        init_model(m_type, &var_map, input.len, labels.len())?;
        let weights = get_tensors_data(&var_map)?;
        Ok(ClassifierModel::new(labels, input, m_type, weights))
    }

    pub fn m_type(&self) -> ModelType {
        self.m_type
    }

    /* ---------------- inference ------------------ */

    /// Raw network outputs for one input vector.
    pub fn logits(&mut self, input: &ClassifierInput) -> Result<Vec<f32>, ModelError> {
        let desc = &self.descriptor;
        match input {
            ClassifierInput::F32(v) => {
                if v.len() != desc.len {
                    return Err(NormalizationError::LengthMismatch {
                        expected: desc.len,
                        got: v.len(),
                    }
                    .into());
                }
                self.staging.copy_from_slice(v);
            }
            ClassifierInput::I8(q) => {
                FeatureNormalizer::dequantize_into(q, &mut self.staging, desc.scale, desc.zero_point)?;
            }
        }
        let xs = Tensor::from_slice(&self.staging, (1, desc.len), &Device::Cpu)?;
        let logits = self.net.forward(&xs)?;
        Ok(logits.get(0)?.to_vec1::<f32>()?)
    }
}

/* ------------------------------------------------------------------------- */
/*  Classifier impl                                                          */
/* ------------------------------------------------------------------------- */

impl Classifier for CandleClassifier {
    fn input_descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    fn classify(&mut self, input: &ClassifierInput) -> Result<usize, ClassificationError> {
        if input.len() != self.descriptor.len {
            return Err(ClassificationError::InputMismatch {
                expected: self.descriptor.len,
                got: input.len(),
            });
        }
        let logits = self
            .logits(input)
            .map_err(|e| ClassificationError::Invocation(e.to_string()))?;
        argmax(&logits)
            .ok_or_else(|| ClassificationError::Invocation("network produced no finite output".into()))
    }

    fn labels(&self) -> Option<&[String]> {
        Some(&self.labels)
    }
}

/* ------------------------------------------------------------------------- */
/*  Utilities                                                                */
/* ------------------------------------------------------------------------- */

fn get_tensors_data(vm: &VarMap) -> Result<ModelWeights, ModelError> {
    let data = vm
        .data()
        .lock()
        .map_err(|_| ModelError::TensorData("mutex".into()))?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    let mut map = IndexMap::with_capacity(names.len());
    for name in names {
        map.insert(name.clone(), TensorData::try_from(&data[name])?);
    }
    Ok(ModelWeights::from(map))
}

fn try_load_weights(vm: &VarMap, ckpt: &ModelWeights) -> Result<(), ModelError> {
    for (name, var) in vm
        .data()
        .lock()
        .map_err(|_| ModelError::TensorData("mutex".into()))?
        .iter_mut()
    {
        match ckpt.get(name) {
            Some(td) => {
                let t = Tensor::try_from(td)?;
                var.set(&t)?;
            }
            None => return Err(ModelError::MissingWeight(name.clone())),
        }
    }
    Ok(())
}

/* ------------------------------------------------------------------------- */
/*  Model factory                                                            */
/* ------------------------------------------------------------------------- */

fn init_model(
    m_type: ModelType,
    var_map: &VarMap,
    inputs: usize,
    n_labels: usize,
) -> Result<Box<dyn ModelImpl>, ModelError> {
    let vs = VarBuilder::from_varmap(var_map, DType::F32, &Device::Cpu);
    let boxed: Box<dyn ModelImpl> = match m_type {
        ModelType::Tiny => Box::new(TinyModel::new(vs, inputs, n_labels)?),
        ModelType::Small => Box::new(SmallModel::new(vs, inputs, n_labels)?),
        ModelType::Medium => Box::new(MediumModel::new(vs, inputs, n_labels)?),
    };
    Ok(boxed)
}

/* ------------------------------------------------------------------------- */
/*  Linear-stack architectures                                               */
/* ------------------------------------------------------------------------- */

struct TinyModel {
    ln1: Linear,
    ln2: Linear,
}

struct SmallModel {
    ln1: Linear,
    ln2: Linear,
    ln3: Linear,
}

struct MediumModel {
    ln1: Linear,
    ln2: Linear,
    ln3: Linear,
}

/// Hidden width `inp / div`, never below 8.
const fn inter(inp: usize, div: usize) -> usize {
    let result = inp / div;
    if result < 8 { 8 } else { result }
}

macro_rules! impl_model {
    ($ty:ident, $layers:expr) => {
        impl ModelImpl for $ty {
            fn new(vs: VarBuilder, inp: usize, labels: usize) -> CandleResult<Self> {
                let (i1, i2) = $layers(inp);
                let ln1 = candle_nn::linear(inp, i1, vs.pp("ln1"))?;
                let ln2 = candle_nn::linear(i1, i2, vs.pp("ln2"))?;
                let ln3 = candle_nn::linear(i2, labels, vs.pp("ln3"))?;
                Ok(Self { ln1, ln2, ln3 })
            }

            fn forward(&self, xs: &Tensor) -> CandleResult<Tensor> {
                let xs = self.ln1.forward(xs)?.relu()?;
                let xs = self.ln2.forward(&xs)?.relu()?;
                self.ln3.forward(&xs)
            }
        }
    };
}

/* -- architectures ------------------------------------------------------ */

impl ModelImpl for TinyModel {
    fn new(vs: VarBuilder, inp: usize, labels: usize) -> CandleResult<Self> {
        let i = inter(inp, 2);
        Ok(Self {
            ln1: candle_nn::linear(inp, i, vs.pp("ln1"))?,
            ln2: candle_nn::linear(i, labels, vs.pp("ln2"))?,
        })
    }
    fn forward(&self, xs: &Tensor) -> CandleResult<Tensor> {
        let xs = self.ln1.forward(xs)?.relu()?;
        self.ln2.forward(&xs)
    }
}

impl_model!(SmallModel, |i| {
    let i1 = inter(i, 2);
    (i1, std::cmp::max(i1 / 2, 4))
});
impl_model!(MediumModel, |i| (inter(i, 1) * 2, inter(i, 1)));

/* ------------------------------------------------------------------------- */
/*  Traits & conversions                                                    */
/* ------------------------------------------------------------------------- */

trait ModelImpl: Send + Sync {
    fn new(vs: VarBuilder, inp: usize, labels: usize) -> CandleResult<Self>
    where
        Self: Sized;
    fn forward(&self, xs: &Tensor) -> CandleResult<Tensor>;
}

/* ---------------- TensorData conversions -------------------------------- */

impl TryFrom<&Var> for TensorData {
    type Error = ModelError;
    fn try_from(var: &Var) -> Result<Self, Self::Error> {
        let values = var.as_tensor().flatten_all()?.to_vec1::<f32>()?;
        Ok(TensorData {
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            dims: var.dims().to_vec(),
            d_type: "f32".to_owned(),
        })
    }
}

impl TryFrom<&TensorData> for Tensor {
    type Error = ModelError;

    fn try_from(td: &TensorData) -> Result<Self, Self::Error> {
        if td.d_type != "f32" {
            return Err(ModelError::TensorData(format!("unsupported dtype {}", td.d_type)));
        }
        let expected = td.dims.iter().product::<usize>() * std::mem::size_of::<f32>();
        if td.bytes.len() != expected {
            return Err(ModelError::TensorData(format!(
                "{} bytes for shape {:?} (need {expected})",
                td.bytes.len(),
                td.dims
            )));
        }
        Tensor::from_raw_buffer(&td.bytes, DType::F32, &td.dims, &Device::Cpu).map_err(ModelError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ModelLoad, ModelSave};

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class{i}")).collect()
    }

    #[test]
    fn fresh_model_reloads_to_identical_outputs() {
        for m_type in [ModelType::Tiny, ModelType::Small, ModelType::Medium] {
            let model = CandleClassifier::fresh_model(m_type, TensorDescriptor::float(13), labels(6)).unwrap();
            let buf = model.save_to_buffer().unwrap();
            let reloaded = ClassifierModel::load_from_buffer(&buf).unwrap();

            let mut a = CandleClassifier::new(&model).unwrap();
            let mut b = CandleClassifier::new(&reloaded).unwrap();
            let input = ClassifierInput::F32((0..13).map(|i| i as f32 * 0.1 - 0.6).collect());

            let la = a.logits(&input).unwrap();
            let lb = b.logits(&input).unwrap();
            assert_eq!(la.len(), 6);
            assert_eq!(la, lb, "{m_type}");
            assert_eq!(a.classify(&input), b.classify(&input));
            assert_eq!(b.labels(), Some(&labels(6)[..]));
        }
    }

    #[test]
    fn weights_are_sorted_by_name() {
        let model = CandleClassifier::fresh_model(ModelType::Small, TensorDescriptor::float(16), labels(3)).unwrap();
        let names: Vec<&String> = model.weights.iter().map(|(k, _)| k).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 6); // 3 layers × (weight, bias)
    }

    #[test]
    fn int8_input_is_dequantised_with_descriptor_params() {
        let desc = TensorDescriptor::int8(8, 0.25, 3);
        let model = CandleClassifier::fresh_model(ModelType::Tiny, desc, labels(4)).unwrap();
        let mut clf = CandleClassifier::new(&model).unwrap();

        let q: Vec<i8> = vec![3, 7, -1, 0, 11, 3, 5, -5];
        let floats: Vec<f32> = q.iter().map(|&v| (v as i32 - 3) as f32 * 0.25).collect();

        let from_q = clf.logits(&ClassifierInput::I8(q)).unwrap();
        let from_f = clf.logits(&ClassifierInput::F32(floats)).unwrap();
        for (a, b) in from_q.iter().zip(&from_f) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_weight_is_reported() {
        let mut model = CandleClassifier::fresh_model(ModelType::Tiny, TensorDescriptor::float(13), labels(2)).unwrap();
        model.weights.0.shift_remove("ln2.bias");
        assert!(matches!(
            CandleClassifier::new(&model),
            Err(ModelError::MissingWeight(name)) if name == "ln2.bias"
        ));
    }

    #[test]
    fn truncated_tensor_is_rejected() {
        let mut model = CandleClassifier::fresh_model(ModelType::Tiny, TensorDescriptor::float(13), labels(2)).unwrap();
        if let Some(td) = model.weights.0.get_mut("ln1.weight") {
            td.bytes.truncate(8);
        }
        assert!(matches!(CandleClassifier::new(&model), Err(ModelError::TensorData(_))));
    }

    #[test]
    fn wrong_input_length_is_a_classification_error() {
        let model = CandleClassifier::fresh_model(ModelType::Tiny, TensorDescriptor::float(13), labels(2)).unwrap();
        let mut clf = CandleClassifier::new(&model).unwrap();
        assert_eq!(
            clf.classify(&ClassifierInput::F32(vec![0.0; 12])),
            Err(ClassificationError::InputMismatch { expected: 13, got: 12 })
        );
    }
}
