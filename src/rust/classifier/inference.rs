use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;

use crate::artifact_manager::{ArtifactError, ArtifactManager};
use crate::error::PipelineError;
use crate::observation::Features;

/// The result for one requested label key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LabelOutcome {
    /// Serialises as the bare predicted value.
    Predicted(String),
    /// Serialises as `{"error": "..."}`.
    Failed { error: String },
}

impl LabelOutcome {
    pub fn prediction(&self) -> Option<&str> {
        match self {
            LabelOutcome::Predicted(value) => Some(value.as_str()),
            LabelOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LabelOutcome::Predicted(_) => None,
            LabelOutcome::Failed { error } => Some(error.as_str()),
        }
    }
}

/// Label key to prediction or per-label error.
pub type Predictions = BTreeMap<String, LabelOutcome>;

/// Predicts each requested label from its own persisted artifact. A label
/// that fails never fails the others.
pub struct InferenceEngine<'a> {
    artifacts: &'a ArtifactManager,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(artifacts: &'a ArtifactManager) -> Self {
        Self { artifacts }
    }

    pub fn infer<S: AsRef<str>>(&self, features: &Features, label_keys: &[S]) -> Predictions {
        label_keys
            .iter()
            .map(|key| {
                let key = key.as_ref();
                let outcome = match self.predict_label(features, key) {
                    Ok(value) => {
                        debug!("Predicted '{}' for label '{}'", value, key);
                        LabelOutcome::Predicted(value)
                    }
                    Err(e) => {
                        warn!("Prediction for label '{}' failed: {}", key, e);
                        LabelOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                (key.to_string(), outcome)
            })
            .collect()
    }

    /// Loads, transforms, predicts and decodes a single label.
    pub fn predict_label(&self, features: &Features, label_key: &str) -> Result<String, PipelineError> {
        let artifact = self.artifacts.load(label_key).map_err(|e| match e {
            ArtifactError::NotFound(_) => PipelineError::from(e),
            other => PipelineError::ArtifactCorruptError(other.to_string()),
        })?;

        let encoded = artifact.transformer.transform(features).map_err(|e| {
            PipelineError::ArtifactCorruptError(format!(
                "artifact for '{}' does not match the request: {}",
                label_key, e
            ))
        })?;
        let class = artifact.classifier.predict(encoded.view())?;
        artifact
            .codec
            .decode(class)
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::ArtifactCorruptError(format!(
                    "class index {} has no label for '{}'",
                    class, label_key
                ))
            })
    }
}
