//! On-disk classifier model: CBOR-serialised metadata plus weight tensors.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read},
    path::Path,
};

use ciborium::{de, ser};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::{EnumString, IntoStaticStr};

use super::TensorDescriptor;
use crate::constants::MODEL_FORMAT_VERSION;

/* --------------------------------------------------------------------- */
/*  Error type                                                           */

#[derive(Debug, thiserror::Error)]
pub enum ModelIoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cbor: {0}")]
    Cbor(String),
    #[error("unsupported model format version {found} (expected {expected})")]
    Version { found: u8, expected: u8 },
}

type IoResult<T> = Result<T, ModelIoError>;

fn cbor_err(e: impl std::fmt::Display) -> ModelIoError {
    ModelIoError::Cbor(e.to_string())
}

/* --------------------------------------------------------------------- */
/*  Traits                                                               */

/// Anything serialisable can be stored as a CBOR model file.
pub trait ModelSave: Serialize {
    /// Stages the bytes in a sibling `.tmp` file and renames it over `path`.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> IoResult<()> {
        let dest = path.as_ref();
        let staging = dest.with_extension("tmp");
        let mut out = BufWriter::new(File::create(&staging)?);
        ser::into_writer(self, &mut out).map_err(cbor_err)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&staging, dest)?;
        Ok(())
    }

    fn save_to_buffer(&self) -> IoResult<Vec<u8>> {
        let mut buf = Vec::new();
        ser::into_writer(self, &mut buf).map_err(cbor_err)?;
        Ok(buf)
    }
}

/// Counterpart of [`ModelSave`].
pub trait ModelLoad: DeserializeOwned + Sized {
    fn load_from_file<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        Self::load_from_reader(BufReader::new(File::open(path)?))
    }

    fn load_from_buffer(buf: &[u8]) -> IoResult<Self> {
        Self::load_from_reader(buf)
    }

    fn load_from_reader<R: Read>(reader: R) -> IoResult<Self> {
        de::from_reader(reader).map_err(cbor_err)
    }
}

/* --------------------------------------------------------------------- */
/*  Model file                                                           */

/// Everything needed to rebuild a [`super::CandleClassifier`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifierModel {
    /// File format version header.
    version: u8,

    /// Class names, indexed by network output.
    pub labels: Vec<String>,

    /// Input contract, including quantisation parameters for `i8` inputs.
    pub input: TensorDescriptor,

    /// Network size preset.
    pub m_type: ModelType,

    /// Weight tensors keyed by variable name.
    pub weights: ModelWeights,
}

impl ClassifierModel {
    pub fn new(
        labels: Vec<String>,
        input: TensorDescriptor,
        m_type: ModelType,
        weights: ModelWeights,
    ) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            labels,
            input,
            m_type,
            weights,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Load a model file and refuse unknown format versions.
    pub fn open(path: impl AsRef<Path>) -> IoResult<Self> {
        let model = Self::load_from_file(path)?;
        if model.version != MODEL_FORMAT_VERSION {
            return Err(ModelIoError::Version {
                found: model.version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        Ok(model)
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.weights
            .0
            .values()
            .map(|t| t.dims.iter().product::<usize>())
            .sum()
    }
}

impl ModelLoad for ClassifierModel {}
impl ModelSave for ClassifierModel {}

/* --------------------------------------------------------------------- */
/*  ModelType enum                                                       */

/// Size preset of the fully connected classifier.
///
/// Hidden widths scale with the input length; see the architectures in
/// `classifier::nn`.
#[derive(
    Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// One hidden layer.
    #[default]
    Tiny,
    /// Two hidden layers, narrowing.
    Small,
    /// Two wide hidden layers.
    Medium,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", <&'static str>::from(self))
    }
}

/* --------------------------------------------------------------------- */
/*  Weights map + tensor wrapper                                         */

/// One serialised tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Little-endian element bytes, row-major.
    #[serde(with = "serde_bytes_vec")]
    pub bytes: Vec<u8>,
    pub dims: Vec<usize>,
    /// Element type name; only `"f32"` is produced.
    pub d_type: String,
}

/// Weight tensors in deterministic (sorted) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelWeights(pub IndexMap<String, TensorData>);

impl ModelWeights {
    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TensorData)> {
        self.0.iter()
    }
}

impl From<IndexMap<String, TensorData>> for ModelWeights {
    fn from(map: IndexMap<String, TensorData>) -> Self {
        Self(map)
    }
}

// CBOR byte strings instead of integer arrays for tensor payloads
mod serde_bytes_vec {
    use serde::{Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        d.deserialize_byte_buf(BytesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> ClassifierModel {
        let mut map = IndexMap::new();
        map.insert(
            "ln1.weight".to_string(),
            TensorData {
                bytes: 1.5f32.to_le_bytes().repeat(6),
                dims: vec![2, 3],
                d_type: "f32".into(),
            },
        );
        ClassifierModel::new(
            vec!["Rain".into(), "Bell".into()],
            TensorDescriptor::int8(3, 0.5, -2),
            ModelType::Small,
            map.into(),
        )
    }

    #[test]
    fn buffer_round_trip_keeps_metadata() {
        let buf = sample_model().save_to_buffer().unwrap();
        let back = ClassifierModel::load_from_buffer(&buf).unwrap();
        assert_eq!(back.version(), MODEL_FORMAT_VERSION);
        assert_eq!(back.labels, vec!["Rain", "Bell"]);
        assert_eq!(back.input, TensorDescriptor::int8(3, 0.5, -2));
        assert_eq!(back.m_type, ModelType::Small);
        assert_eq!(back.weights, sample_model().weights);
        assert_eq!(back.parameter_count(), 6);
    }

    #[test]
    fn file_save_is_atomic_and_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.scm");
        sample_model().save_to_file(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        let back = ClassifierModel::open(&path).unwrap();
        assert_eq!(back.labels.len(), 2);
    }

    #[test]
    fn garbage_is_a_cbor_error() {
        assert!(matches!(
            ClassifierModel::load_from_buffer(b"not cbor at all"),
            Err(ModelIoError::Cbor(_))
        ));
    }

    #[test]
    fn model_type_parses_lowercase() {
        assert_eq!("medium".parse::<ModelType>().unwrap(), ModelType::Medium);
        assert_eq!(ModelType::Tiny.to_string(), "tiny");
    }
}
