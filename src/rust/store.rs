use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::FeatureSchema;
use crate::error::PipelineError;
use crate::observation::Observation;
use crate::persist::{file_lock, path_lock, write_atomic};

/// Version of the training data container written by this build.
pub const STORE_FORMAT_VERSION: u32 = 1;

const FILE_CREATED_MESSAGE: &str = "Training data file created, as it did not previously exist.";
const RECORD_APPENDED_MESSAGE: &str = "Training data updated successfully.";

/// On-disk container: `{"format_version": 1, "training_data": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    /// Containers written before versioning carried no version field.
    #[serde(default = "legacy_format_version")]
    format_version: u32,
    training_data: Vec<Observation>,
}

fn legacy_format_version() -> u32 {
    1
}

/// Result of appending one observation.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The full sequence after the append.
    pub records: Vec<Observation>,
    /// Whether this append created the backing file.
    pub created: bool,
    pub message: String,
}

/// Append-only collection of observations persisted as one JSON file.
///
/// The file is created lazily by the first [`append`](Self::append); reads
/// of a missing file see an empty store. Appends on the same path are
/// serialised across threads and processes and rewrite the file atomically.
#[derive(Debug, Clone)]
pub struct TrainingStore {
    path: PathBuf,
}

impl TrainingStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads every stored observation. A missing file is an empty store and
    /// is not created.
    pub fn load(&self) -> Result<Vec<Observation>, PipelineError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PipelineError::StorageError(format!(
                    "failed to read {:?}: {}",
                    self.path, e
                )))
            }
        };

        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::StorageError(format!(
                "{:?} is not a training data container: {}",
                self.path, e
            ))
        })?;
        if file.format_version != STORE_FORMAT_VERSION {
            return Err(PipelineError::StorageError(format!(
                "unsupported training data format version {} in {:?}",
                file.format_version, self.path
            )));
        }
        Ok(file.training_data)
    }

    /// The feature schema every record must follow, taken from the first
    /// stored record. `None` for an empty store.
    pub fn schema(&self) -> Result<Option<FeatureSchema>, PipelineError> {
        Ok(self
            .load()?
            .first()
            .map(|first| FeatureSchema::infer(&first.features)))
    }

    /// Appends `observation` and rewrites the whole file.
    ///
    /// The load-modify-persist sequence runs under both the in-process path
    /// lock and an exclusive OS lock on `<path>.lock`, so concurrent writers
    /// in other processes cannot drop each other's records.
    ///
    /// Once the store holds a record, later observations must match its
    /// feature schema; a mismatch is a `SchemaError` and leaves the file
    /// untouched.
    pub fn append(&self, observation: Observation) -> Result<AppendOutcome, PipelineError> {
        let lock = path_lock(&self.path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock_error = |e: io::Error| {
            PipelineError::StorageError(format!("failed to lock {:?}: {}", self.path, e))
        };
        let mut process_lock = file_lock(&self.path).map_err(lock_error)?;
        let _process_guard = process_lock.write().map_err(lock_error)?;

        let created = !self.exists();
        let mut records = self.load()?;
        if let Some(first) = records.first() {
            FeatureSchema::infer(&first.features).validate(&observation.features)?;
        }
        records.push(observation);

        let file = StoreFile {
            format_version: STORE_FORMAT_VERSION,
            training_data: records,
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| PipelineError::StorageError(e.to_string()))?;
        write_atomic(&self.path, &bytes).map_err(|e| {
            PipelineError::StorageError(format!("failed to write {:?}: {}", self.path, e))
        })?;

        let mut message = String::new();
        if created {
            log::info!("Created training data file at {:?}", self.path);
            message.push_str(FILE_CREATED_MESSAGE);
            message.push('\t');
        }
        message.push_str(RECORD_APPENDED_MESSAGE);
        message.push('\t');
        log::info!(
            "Appended observation; {} records stored",
            file.training_data.len()
        );

        Ok(AppendOutcome {
            records: file.training_data,
            created,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{FeatureValue, Features};

    fn observation(temp: f64, sky: &str, top: &str) -> Observation {
        Observation::new(Features::from([
            ("temp".to_string(), FeatureValue::Number(temp)),
            ("sky".to_string(), FeatureValue::Category(sky.to_string())),
        ]))
        .with_label("top", top)
    }

    #[test]
    fn test_load_missing_file_does_not_create_it() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = TrainingStore::new(dir.path().join("training_data.json"));
        assert!(store.load()?.is_empty());
        assert!(store.schema()?.is_none());
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn test_append_creates_file_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = TrainingStore::new(dir.path().join("training_data.json"));

        let first = store.append(observation(70.0, "sunny", "t-shirt"))?;
        assert!(first.created);
        assert!(first.message.starts_with(FILE_CREATED_MESSAGE));
        assert_eq!(first.records.len(), 1);

        let second = store.append(observation(40.0, "cloudy", "jacket"))?;
        assert!(!second.created);
        assert_eq!(second.message, format!("{}\t", RECORD_APPENDED_MESSAGE));
        assert_eq!(second.records.len(), 2);
        assert_eq!(store.load()?, second.records);
        Ok(())
    }

    #[test]
    fn test_schema_drift_leaves_store_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("training_data.json");
        let store = TrainingStore::new(&path);
        store.append(observation(70.0, "sunny", "t-shirt"))?;
        let before = fs::read(&path)?;

        let mut drifted = observation(40.0, "cloudy", "jacket");
        drifted.features.insert("wind".into(), FeatureValue::Number(12.0));
        assert!(matches!(store.append(drifted), Err(PipelineError::SchemaError(_))));
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn test_container_versions() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("training_data.json");
        let store = TrainingStore::new(&path);

        fs::write(&path, r#"{"training_data": [{"features": {"temp": 50}}]}"#)?;
        assert_eq!(store.load()?.len(), 1);

        fs::write(
            &path,
            r#"{"training_data": [{"features": {"temp": 50}, "labels": {"layers": 2, "umbrella": false}}]}"#,
        )?;
        let legacy = store.load()?;
        assert_eq!(legacy[0].label("layers"), Some("2"));
        assert_eq!(legacy[0].label("umbrella"), Some("false"));

        fs::write(&path, r#"[{"features": {"temp": 50}}]"#)?;
        assert!(matches!(store.load(), Err(PipelineError::StorageError(_))));

        fs::write(&path, r#"{"format_version": 7, "training_data": []}"#)?;
        assert!(matches!(store.load(), Err(PipelineError::StorageError(_))));
        Ok(())
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("training_data.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = TrainingStore::new(&path);
                std::thread::spawn(move || store.append(observation(i as f64, "sunny", "t-shirt")))
            })
            .collect();
        for handle in handles {
            handle.join().expect("append thread panicked")?;
        }

        assert_eq!(TrainingStore::new(&path).load()?.len(), 8);
        Ok(())
    }
}
