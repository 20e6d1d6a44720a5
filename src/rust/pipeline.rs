use std::path::PathBuf;

use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::artifact_manager::ArtifactManager;
use crate::classifier::{
    FeatureColumn, FeatureSchema, ForestConfig, InferenceEngine, LabelTrainer, Predictions,
    TrainingReport,
};
use crate::config::StorageConfig;
use crate::error::PipelineError;
use crate::observation::{Features, Observation};
use crate::store::TrainingStore;

/// The three operations exposed to callers: record an observation, train
/// every label, and predict labels for a day's weather.
///
/// No state is cached between calls; each operation reloads what it needs
/// from storage.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use serde_json::json;
/// use wearcast::{Pipeline, StorageConfig};
///
/// let pipeline = Pipeline::builder()
///     .with_storage(StorageConfig::from_root("/tmp/wearcast"))
///     .build()?;
///
/// pipeline.record_observation(&json!({
///     "training_data": {
///         "features": {"temp": 40, "sky": "cloudy"},
///         "labels": {"top": "jacket"}
///     }
/// }))?;
/// pipeline.train()?;
///
/// let features = wearcast::parse_features(&json!({"temp": 42, "sky": "cloudy"}))?;
/// let predictions = pipeline.infer(Some(&features), &["top"])?;
/// println!("{:?}", predictions["top"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: TrainingStore,
    artifacts: ArtifactManager,
    forest_config: ForestConfig,
    storage: StorageConfig,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Pipeline>();
    }
};

/// Summary of what is stored and trained.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub training_file: PathBuf,
    pub artifacts_dir: PathBuf,
    pub records: usize,
    pub schema: Vec<FeatureColumn>,
    pub trained_labels: Vec<String>,
}

impl Pipeline {
    /// Creates a new PipelineBuilder for fluent construction
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn store(&self) -> &TrainingStore {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    pub fn forest_config(&self) -> &ForestConfig {
        &self.forest_config
    }

    /// Appends the observation carried under `training_data` in `payload`.
    ///
    /// Returns the status message and the payload echoed back. A payload
    /// without the container key is a `SchemaError` and the store is not
    /// touched.
    pub fn record_observation(&self, payload: &Value) -> Result<(String, Value), PipelineError> {
        let observation = Observation::from_payload(payload)?;
        let outcome = self.store.append(observation)?;
        Ok((outcome.message, payload.clone()))
    }

    /// Trains one classifier per label key over every stored observation.
    pub fn train(&self) -> Result<TrainingReport, PipelineError> {
        let records = self.store.load()?;
        info!("Training on {} stored observations", records.len());
        LabelTrainer::new(&self.artifacts, self.forest_config.clone()).train(&records)
    }

    /// Predicts each requested label key for `features`.
    ///
    /// Fails as a whole only when no features are supplied, the store is
    /// empty, or the features do not match the stored schema. Otherwise
    /// every label gets its own prediction or error. An empty `label_keys`
    /// requests every trained label.
    pub fn infer<S: AsRef<str>>(
        &self,
        features: Option<&Features>,
        label_keys: &[S],
    ) -> Result<Predictions, PipelineError> {
        let features = features.ok_or_else(|| {
            PipelineError::SchemaError("a 'features' payload is required".into())
        })?;
        let schema = self.store.schema()?.ok_or_else(|| {
            PipelineError::NoDataError(
                "no training data recorded; feature schema is unknown".into(),
            )
        })?;
        schema.validate(features)?;

        let engine = InferenceEngine::new(&self.artifacts);
        if label_keys.is_empty() {
            let trained = self.artifacts.list_labels()?;
            return Ok(engine.infer(features, trained.as_slice()));
        }
        Ok(engine.infer(features, label_keys))
    }

    pub fn info(&self) -> Result<PipelineInfo, PipelineError> {
        let records = self.store.load()?;
        let schema = records
            .first()
            .map(|first| FeatureSchema::infer(&first.features).columns().to_vec())
            .unwrap_or_default();
        Ok(PipelineInfo {
            training_file: self.storage.training_file.clone(),
            artifacts_dir: self.storage.artifacts_dir.clone(),
            records: records.len(),
            schema,
            trained_labels: self.artifacts.list_labels()?,
        })
    }
}

/// A builder for constructing a Pipeline with a fluent interface.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    storage: Option<StorageConfig>,
    forest_config: ForestConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            forest_config: ForestConfig::default(),
        }
    }

    /// Sets where training data and artifacts are stored. Defaults to
    /// [`StorageConfig::from_env`].
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the forest configuration used for every label.
    pub fn with_forest_config(mut self, config: ForestConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        self.forest_config = config;
        Ok(self)
    }

    /// Builds the pipeline, creating the artifact directory if needed.
    ///
    /// Failing to create storage is the one condition callers should treat
    /// as fatal.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.forest_config.validate()?;
        let storage = self.storage.unwrap_or_else(StorageConfig::from_env);

        let artifacts = ArtifactManager::new(&storage.artifacts_dir).map_err(|e| {
            PipelineError::StorageError(format!(
                "failed to create artifact directory {:?}: {}",
                storage.artifacts_dir, e
            ))
        })?;
        info!(
            "Pipeline ready: training data at {:?}, artifacts in {:?}",
            storage.training_file, storage.artifacts_dir
        );

        Ok(Pipeline {
            store: TrainingStore::new(&storage.training_file),
            artifacts,
            forest_config: self.forest_config,
            storage,
        })
    }
}
