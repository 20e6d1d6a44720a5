use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::{FeatureTransformer, LabelCodec, RandomForest};
use crate::persist::write_atomic;

/// Version of the artifact bundle layout written by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const ARTIFACT_MAGIC: &str = "wearcast-artifact";
const ARTIFACT_EXTENSION: &str = "artifact";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("No artifact for label '{0}'")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Malformed artifact: {0}")]
    Malformed(String),
    #[error("Hash mismatch for label '{label}': expected {expected}, got {actual}")]
    HashMismatch {
        label: String,
        expected: String,
        actual: String,
    },
    #[error("Unsupported artifact version {found} for label '{label}'")]
    UnsupportedVersion { label: String, found: u32 },
}

/// Everything needed to predict one label key, persisted as a single file so
/// the classifier can never be separated from its codec or transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelArtifact {
    pub format_version: u32,
    pub label_key: String,
    /// Number of records the classifier was fitted on.
    pub trained_records: usize,
    pub transformer: FeatureTransformer,
    pub codec: LabelCodec,
    pub classifier: RandomForest,
}

impl LabelArtifact {
    pub fn new(
        label_key: impl Into<String>,
        trained_records: usize,
        transformer: FeatureTransformer,
        codec: LabelCodec,
        classifier: RandomForest,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            label_key: label_key.into(),
            trained_records,
            transformer,
            codec,
            classifier,
        }
    }
}

/// Stores one artifact bundle per label key under a models directory.
///
/// Each file is a header line `wearcast-artifact v<version> sha256=<hex>`
/// followed by the JSON body the hash covers.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    artifacts_dir: PathBuf,
}

impl ArtifactManager {
    /// Creates the manager, creating `artifacts_dir` if needed.
    pub fn new<P: AsRef<Path>>(artifacts_dir: P) -> io::Result<Self> {
        let artifacts_dir = artifacts_dir.as_ref().to_path_buf();
        fs::create_dir_all(&artifacts_dir)?;
        Ok(Self { artifacts_dir })
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn get_artifact_path(&self, label_key: &str) -> PathBuf {
        self.artifacts_dir
            .join(format!("{}.{}", encode_label_key(label_key), ARTIFACT_EXTENSION))
    }

    pub fn has_artifact(&self, label_key: &str) -> bool {
        self.get_artifact_path(label_key).is_file()
    }

    /// Writes the bundle atomically, replacing any previous one for the label.
    pub fn save(&self, artifact: &LabelArtifact) -> Result<PathBuf, ArtifactError> {
        let body = serde_json::to_vec(artifact)?;
        let hash = sha256_hex(&body);
        let mut bytes = format!("{} v{} sha256={}\n", ARTIFACT_MAGIC, artifact.format_version, hash)
            .into_bytes();
        bytes.extend_from_slice(&body);

        let path = self.get_artifact_path(&artifact.label_key);
        log::info!(
            "Writing artifact for label '{}' to {:?} ({} bytes)",
            artifact.label_key,
            path,
            bytes.len()
        );
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Reads and verifies the bundle for `label_key`.
    pub fn load(&self, label_key: &str) -> Result<LabelArtifact, ArtifactError> {
        let path = self.get_artifact_path(label_key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(label_key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        log::debug!("Read {} bytes from {:?}", bytes.len(), path);

        let body = self.verify_bytes(label_key, &bytes)?;
        let artifact: LabelArtifact = serde_json::from_slice(body)?;
        if artifact.label_key != label_key {
            return Err(ArtifactError::Malformed(format!(
                "file for label '{}' holds label '{}'",
                label_key, artifact.label_key
            )));
        }
        if artifact.codec.len() != artifact.classifier.n_classes()
            || artifact.transformer.output_width() != artifact.classifier.n_features()
        {
            return Err(ArtifactError::Malformed(format!(
                "classifier for label '{}' does not match its codec or transformer",
                label_key
            )));
        }
        Ok(artifact)
    }

    /// Checks the header and checksum without deserialising the body.
    /// Returns `Ok(false)` when the artifact is missing or fails verification.
    pub fn verify(&self, label_key: &str) -> Result<bool, ArtifactError> {
        let path = self.get_artifact_path(label_key);
        if !path.exists() {
            log::info!("No artifact at {:?}", path);
            return Ok(false);
        }
        let bytes = fs::read(&path)?;
        match self.verify_bytes(label_key, &bytes) {
            Ok(_) => Ok(true),
            Err(ArtifactError::IoError(e)) => Err(ArtifactError::IoError(e)),
            Err(e) => {
                log::warn!("Artifact verification failed for '{}': {}", label_key, e);
                Ok(false)
            }
        }
    }

    fn verify_bytes<'a>(&self, label_key: &str, bytes: &'a [u8]) -> Result<&'a [u8], ArtifactError> {
        let split = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| ArtifactError::Malformed("missing header line".into()))?;
        let header = std::str::from_utf8(&bytes[..split])
            .map_err(|_| ArtifactError::Malformed("header is not UTF-8".into()))?;
        let body = &bytes[split + 1..];

        let mut parts = header.split(' ');
        let (magic, version, hash) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(v), Some(h), None) => (m, v, h),
            _ => return Err(ArtifactError::Malformed(format!("bad header '{}'", header))),
        };
        if magic != ARTIFACT_MAGIC {
            return Err(ArtifactError::Malformed(format!("unknown magic '{}'", magic)));
        }
        let version: u32 = version
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ArtifactError::Malformed(format!("bad version '{}'", version)))?;
        if version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                label: label_key.to_string(),
                found: version,
            });
        }
        let expected = hash
            .strip_prefix("sha256=")
            .ok_or_else(|| ArtifactError::Malformed(format!("bad checksum field '{}'", hash)))?;

        let actual = sha256_hex(body);
        if actual != expected {
            log::error!(
                "Artifact hash mismatch for '{}': expected {}, got {}",
                label_key,
                expected,
                actual
            );
            return Err(ArtifactError::HashMismatch {
                label: label_key.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(body)
    }

    pub fn remove(&self, label_key: &str) -> Result<(), ArtifactError> {
        let path = self.get_artifact_path(label_key);
        if path.exists() {
            fs::remove_file(&path)?;
            log::info!("Removed artifact {:?}", path);
        }
        Ok(())
    }

    /// Label keys with an artifact on disk, sorted.
    pub fn list_labels(&self) -> Result<Vec<String>, ArtifactError> {
        let mut labels = Vec::new();
        for entry in fs::read_dir(&self.artifacts_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            if let Some(label) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_label_key)
            {
                labels.push(label);
            }
        }
        labels.sort();
        Ok(labels)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Maps a label key to a file stem: `[A-Za-z0-9_-]` bytes are kept, every
/// other byte becomes `%XX`.
fn encode_label_key(label_key: &str) -> String {
    let mut encoded = String::with_capacity(label_key.len());
    for byte in label_key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_label_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FeatureSchema, ForestConfig};
    use crate::observation::{FeatureValue, Features};

    fn sample_artifact(label: &str) -> Result<LabelArtifact, Box<dyn std::error::Error>> {
        let rows = vec![
            Features::from([("temp".to_string(), FeatureValue::Number(70.0))]),
            Features::from([("temp".to_string(), FeatureValue::Number(40.0))]),
        ];
        let transformer = FeatureTransformer::fit(FeatureSchema::infer(&rows[0]), &rows)?;
        let codec = LabelCodec::fit(&["t-shirt", "jacket"])?;
        let x = transformer.transform_batch(&rows)?;
        let y = codec.encode_all(&["t-shirt", "jacket"])?;
        let config = ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        };
        let classifier = RandomForest::fit(x.view(), &y, codec.len(), &config)?;
        Ok(LabelArtifact::new(label, rows.len(), transformer, codec, classifier))
    }

    #[test]
    fn test_save_and_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ArtifactManager::new(dir.path().join("models"))?;
        let artifact = sample_artifact("top")?;

        assert!(!manager.has_artifact("top"));
        let path = manager.save(&artifact)?;
        assert!(path.ends_with("top.artifact"));
        assert!(manager.has_artifact("top"));
        assert!(manager.verify("top")?);
        assert_eq!(manager.load("top")?, artifact);
        Ok(())
    }

    #[test]
    fn test_missing_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ArtifactManager::new(dir.path())?;
        assert!(matches!(manager.load("shoes"), Err(ArtifactError::NotFound(_))));
        assert!(!manager.verify("shoes")?);
        Ok(())
    }

    #[test]
    fn test_tampered_body_fails_checksum() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ArtifactManager::new(dir.path())?;
        let path = manager.save(&sample_artifact("top")?)?;

        let mut bytes = fs::read(&path)?;
        let last = bytes.len() - 2;
        bytes[last] = b' ';
        fs::write(&path, bytes)?;

        assert!(!manager.verify("top")?);
        assert!(matches!(manager.load("top"), Err(ArtifactError::HashMismatch { .. })));

        fs::write(&path, "corrupted data")?;
        assert!(matches!(manager.load("top"), Err(ArtifactError::Malformed(_))));
        Ok(())
    }

    #[test]
    fn test_label_key_encoding() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(encode_label_key("top"), "top");
        assert_eq!(encode_label_key("rain/coat.v2"), "rain%2Fcoat%2Ev2");
        assert_eq!(decode_label_key("rain%2Fcoat%2Ev2").as_deref(), Some("rain/coat.v2"));
        assert_eq!(decode_label_key("bad%zz"), None);

        let dir = tempfile::tempdir()?;
        let manager = ArtifactManager::new(dir.path())?;
        manager.save(&sample_artifact("rain/coat.v2")?)?;
        manager.save(&sample_artifact("bottom")?)?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;
        assert_eq!(manager.list_labels()?, vec!["bottom", "rain/coat.v2"]);

        manager.remove("bottom")?;
        assert_eq!(manager.list_labels()?, vec!["rain/coat.v2"]);
        Ok(())
    }
}
