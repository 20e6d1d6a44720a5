//! Observation records: one day's weather features plus the clothing labels chosen for it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

/// Key under which a recorded payload carries its observation.
pub const CONTAINER_KEY: &str = "training_data";

/// A single feature value: either a number or a category label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl FeatureValue {
    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureValue::Category(_))
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<i32> for FeatureValue {
    fn from(value: i32) -> Self {
        FeatureValue::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Category(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Category(value)
    }
}

/// Feature name to value. Ordered by name, so column order is deterministic.
pub type Features = BTreeMap<String, FeatureValue>;

/// Label key to ground-truth value. `None` marks a missing value.
pub type Labels = BTreeMap<String, Option<String>>;

/// One labeled (or partially labeled) training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub features: Features,
    /// Absent for unlabeled placeholder records.
    #[serde(
        default,
        deserialize_with = "deserialize_labels",
        skip_serializing_if = "Option::is_none"
    )]
    pub labels: Option<Labels>,
}

impl Observation {
    pub fn new(features: Features) -> Self {
        Self { features, labels: None }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(Labels::new)
            .insert(key.into(), Some(value.into()));
        self
    }

    /// Returns the recorded value for `key`, or `None` when the record is
    /// unlabeled, lacks the key, or holds an explicit null.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .and_then(|value| value.as_deref())
    }

    pub fn label_keys(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .flat_map(|labels| labels.keys().map(String::as_str))
    }

    /// Extracts the observation carried under [`CONTAINER_KEY`] in a recorded payload.
    pub fn from_payload(payload: &Value) -> Result<Self, PipelineError> {
        let inner = payload.get(CONTAINER_KEY).ok_or_else(|| {
            PipelineError::SchemaError(format!(
                "Invalid data format. '{}' key is required.",
                CONTAINER_KEY
            ))
        })?;
        Self::from_value(inner)
    }

    /// Parses a bare `{"features": {...}, "labels": {...}}` object.
    pub fn from_value(value: &Value) -> Result<Self, PipelineError> {
        let object = value.as_object().ok_or_else(|| {
            PipelineError::SchemaError(format!("'{}' must be an object", CONTAINER_KEY))
        })?;
        let features = object
            .get("features")
            .ok_or_else(|| PipelineError::SchemaError("'features' key is required".into()))
            .and_then(parse_features)?;
        let labels = match object.get("labels") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_labels(value)?),
        };
        Ok(Self { features, labels })
    }
}

/// Parses a JSON object of feature values. Values must be numbers or strings.
pub fn parse_features(value: &Value) -> Result<Features, PipelineError> {
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::SchemaError("'features' must be an object".into()))?;
    if object.is_empty() {
        return Err(PipelineError::SchemaError("'features' cannot be empty".into()));
    }

    let mut features = Features::new();
    for (name, raw) in object {
        if name.is_empty() {
            return Err(PipelineError::SchemaError("Feature names cannot be empty".into()));
        }
        let parsed = match raw {
            Value::Number(n) => n.as_f64().map(FeatureValue::Number),
            Value::String(s) => Some(FeatureValue::Category(s.clone())),
            _ => None,
        };
        let parsed = parsed.ok_or_else(|| {
            PipelineError::SchemaError(format!(
                "Feature '{}' must be a number or a string, got {}",
                name, raw
            ))
        })?;
        features.insert(name.clone(), parsed);
    }
    Ok(features)
}

fn parse_labels(value: &Value) -> Result<Labels, PipelineError> {
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::SchemaError("'labels' must be an object".into()))?;

    let mut labels = Labels::new();
    for (key, raw) in object {
        if key.is_empty() {
            return Err(PipelineError::SchemaError("Label keys cannot be empty".into()));
        }
        let parsed = match raw {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => {
                return Err(PipelineError::SchemaError(format!(
                    "Label '{}' must be a scalar value",
                    key
                )))
            }
        };
        labels.insert(key.clone(), parsed);
    }
    Ok(labels)
}

/// Stored labels go through the same rules as recorded ones, so numbers and
/// booleans in older files load as strings.
fn deserialize_labels<'de, D>(deserializer: D) -> Result<Option<Labels>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_labels(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_parsing() -> Result<(), PipelineError> {
        let payload = json!({
            "training_data": {
                "features": {"temp": 70, "sky": "sunny"},
                "labels": {"top": "t-shirt", "shoes": null}
            }
        });
        let obs = Observation::from_payload(&payload)?;
        assert_eq!(obs.features["temp"], FeatureValue::Number(70.0));
        assert_eq!(obs.features["sky"], FeatureValue::Category("sunny".into()));
        assert_eq!(obs.label("top"), Some("t-shirt"));
        assert_eq!(obs.label("shoes"), None);
        assert_eq!(obs.label_keys().collect::<Vec<_>>(), vec!["shoes", "top"]);
        Ok(())
    }

    #[test]
    fn test_missing_container_key() {
        let result = Observation::from_payload(&json!({"not_training_data": 1}));
        assert!(matches!(result, Err(PipelineError::SchemaError(_))));
    }

    #[test]
    fn test_labels_are_optional() -> Result<(), PipelineError> {
        let obs = Observation::from_payload(&json!({
            "training_data": {"features": {"temp": 55}}
        }))?;
        assert!(obs.labels.is_none());
        assert_eq!(obs.label_keys().count(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_feature_values() {
        for features in [json!({}), json!({"windy": true}), json!({"temp": null}), json!([1, 2])] {
            let result = parse_features(&features);
            assert!(matches!(result, Err(PipelineError::SchemaError(_))), "{}", features);
        }
    }

    #[test]
    fn test_scalar_labels_are_stringified() -> Result<(), PipelineError> {
        let obs = Observation::from_value(&json!({
            "features": {"temp": 30},
            "labels": {"layers": 3, "umbrella": false}
        }))?;
        assert_eq!(obs.label("layers"), Some("3"));
        assert_eq!(obs.label("umbrella"), Some("false"));
        Ok(())
    }

    #[test]
    fn test_stored_scalar_labels_are_stringified() -> Result<(), serde_json::Error> {
        let obs: Observation = serde_json::from_value(json!({
            "features": {"temp": 30},
            "labels": {"layers": 3, "umbrella": true, "top": "parka", "shoes": null}
        }))?;
        assert_eq!(obs.label("layers"), Some("3"));
        assert_eq!(obs.label("umbrella"), Some("true"));
        assert_eq!(obs.label("top"), Some("parka"));
        assert_eq!(obs.label("shoes"), None);

        let unlabeled: Observation = serde_json::from_value(json!({"features": {"temp": 30}}))?;
        assert!(unlabeled.labels.is_none());

        let nested = serde_json::from_value::<Observation>(json!({
            "features": {"temp": 30},
            "labels": {"top": ["parka"]}
        }));
        assert!(nested.is_err());
        Ok(())
    }

    #[test]
    fn test_serialized_shape() -> Result<(), serde_json::Error> {
        let obs = Observation::new(Features::from([
            ("temp".to_string(), FeatureValue::from(40)),
            ("sky".to_string(), FeatureValue::from("cloudy")),
        ]))
        .with_label("top", "jacket");
        let value = serde_json::to_value(&obs)?;
        assert_eq!(
            value,
            json!({"features": {"sky": "cloudy", "temp": 40.0}, "labels": {"top": "jacket"}})
        );
        let back: Observation = serde_json::from_value(value)?;
        assert_eq!(back, obs);
        Ok(())
    }
}
