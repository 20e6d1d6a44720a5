use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the storage root.
pub const HOME_ENV_VAR: &str = "WEARCAST_HOME";

const TRAINING_FILE_NAME: &str = "training_data.json";
const ARTIFACTS_DIR_NAME: &str = "models";

/// Where the training data file and the per-label artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub training_file: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl StorageConfig {
    /// Lays out `training_data.json` and `models/` under `root`.
    pub fn from_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            training_file: root.join(TRAINING_FILE_NAME),
            artifacts_dir: root.join(ARTIFACTS_DIR_NAME),
            root,
        }
    }

    /// Uses [`default_root`](Self::default_root).
    pub fn from_env() -> Self {
        Self::from_root(Self::default_root())
    }

    /// Returns the default storage root
    pub fn default_root() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var(HOME_ENV_VAR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("wearcast");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("wearcast");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("wearcast")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
