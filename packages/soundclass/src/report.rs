//! JSON payload returned to whoever asked for a prediction.
//!
//! Success and failure are distinguishable by key:
//! `{"category":"Rain"}` or `{"error":"failed to record audio: …"}`.

use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineError, Prediction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Category { category: String },
    Error { error: String },
}

impl PredictionResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Category { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Prediction> for PredictionResponse {
    fn from(p: &Prediction) -> Self {
        Self::Category {
            category: p.label.to_string(),
        }
    }
}

impl From<&PipelineError> for PredictionResponse {
    fn from(e: &PipelineError) -> Self {
        let error = match e {
            PipelineError::Acquisition(e) => format!("failed to record audio: {e}"),
            PipelineError::Classification(e) => format!("invalid prediction result: {e}"),
            PipelineError::Busy => "busy: a prediction is already in progress".to_string(),
            other => other.to_string(),
        };
        Self::Error { error }
    }
}

impl From<&Result<Prediction, PipelineError>> for PredictionResponse {
    fn from(r: &Result<Prediction, PipelineError>) -> Self {
        match r {
            Ok(p) => p.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AcquisitionError;
    use crate::classifier::ClassificationError;

    #[test]
    fn success_uses_category_key() {
        let p = Prediction {
            index: 4,
            label: "Rain".into(),
        };
        let json = PredictionResponse::from(&Ok(p)).to_json().unwrap();
        assert_eq!(json, r#"{"category":"Rain"}"#);
    }

    #[test]
    fn failures_use_error_key() {
        let acq: Result<Prediction, _> = Err(PipelineError::Acquisition(AcquisitionError::Timeout { attempts: 3 }));
        let resp = PredictionResponse::from(&acq);
        assert!(!resp.is_ok());
        let v: serde_json::Value = serde_json::from_str(&resp.to_json().unwrap()).unwrap();
        assert!(v["error"].as_str().unwrap().starts_with("failed to record audio"));
        assert!(v.get("category").is_none());

        let cls = PipelineError::Classification(ClassificationError::IndexOutOfRange { index: 9, classes: 6 });
        let resp = PredictionResponse::from(&cls);
        assert!(matches!(resp, PredictionResponse::Error { ref error } if error.starts_with("invalid prediction result")));
    }

    #[test]
    fn payloads_parse_back() {
        let back: PredictionResponse = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert_eq!(back, PredictionResponse::Error { error: "x".into() });
    }
}
