use serde_json::json;
use wearcast::{
    parse_features, ForestConfig, MaxFeatures, Observation, Pipeline, PipelineError,
    StorageConfig,
};

#[test]
fn test_invalid_forest_configs() {
    let configs = [
        ForestConfig { n_trees: 0, ..ForestConfig::default() },
        ForestConfig { min_samples_split: 1, ..ForestConfig::default() },
        ForestConfig { max_depth: Some(0), ..ForestConfig::default() },
        ForestConfig { max_features: MaxFeatures::Count(0), ..ForestConfig::default() },
    ];
    for config in configs {
        let result = Pipeline::builder().with_forest_config(config.clone());
        assert!(
            matches!(result, Err(PipelineError::ValidationError(_))),
            "{:?} should be rejected",
            config
        );
    }
}

#[test]
fn test_observation_payload_validation() {
    let invalid = [
        json!({"not_training_data": 1}),
        json!({"training_data": 5}),
        json!({"training_data": {"labels": {"top": "jacket"}}}),
        json!({"training_data": {"features": {}}}),
        json!({"training_data": {"features": {"temp": [1, 2]}}}),
        json!({"training_data": {"features": {"temp": 40}, "labels": ["jacket"]}}),
        json!({"training_data": {"features": {"temp": 40}, "labels": {"": "jacket"}}}),
    ];
    for payload in invalid {
        let result = Observation::from_payload(&payload);
        assert!(
            matches!(result, Err(PipelineError::SchemaError(_))),
            "{} should be rejected",
            payload
        );
    }
}

#[test]
fn test_kind_change_is_rejected_on_record() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pipeline = Pipeline::builder()
        .with_storage(StorageConfig::from_root(dir.path()))
        .build()?;
    pipeline.record_observation(&json!({
        "training_data": {"features": {"temp": 70, "sky": "sunny"}, "labels": {"top": "t-shirt"}}
    }))?;

    let result = pipeline.record_observation(&json!({
        "training_data": {"features": {"temp": "warm", "sky": "sunny"}, "labels": {"top": "t-shirt"}}
    }));
    assert!(matches!(result, Err(PipelineError::SchemaError(_))));

    let request = parse_features(&json!({"temp": "warm", "sky": "sunny"}))?;
    let result = pipeline.infer(Some(&request), &["top"]);
    assert!(matches!(result, Err(PipelineError::SchemaError(_))));
    Ok(())
}

#[test]
fn test_new_label_keys_after_first_record_are_trained() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pipeline = Pipeline::builder()
        .with_storage(StorageConfig::from_root(dir.path()))
        .build()?;
    pipeline.record_observation(&json!({
        "training_data": {"features": {"temp": 70}, "labels": {"top": "t-shirt"}}
    }))?;
    pipeline.record_observation(&json!({
        "training_data": {"features": {"temp": 20}, "labels": {"top": "parka", "hat": "beanie"}}
    }))?;

    let report = pipeline.train()?;
    assert!(report.labels.contains_key("hat"));
    assert_eq!(pipeline.artifacts().list_labels()?, vec!["hat", "top"]);
    Ok(())
}
