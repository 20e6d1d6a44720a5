//! Learns which clothes to wear from the weather.
//!
//! Observations ("today's weather + the clothing chosen for each slot") are
//! appended to a durable training set. Training fits one independent random
//! forest per label key (`"top"`, `"bottom"`, `"shoes"`, ...) and persists
//! each as a self-contained, checksummed artifact. Inference loads the
//! artifact for every requested label and returns a prediction or an error
//! per label.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use serde_json::json;
//! use wearcast::{parse_features, Pipeline, StorageConfig};
//!
//! # let dir = tempfile::tempdir()?;
//! let pipeline = Pipeline::builder()
//!     .with_storage(StorageConfig::from_root(dir.path()))
//!     .build()?;
//!
//! for (temp, sky, top) in [(70, "sunny", "t-shirt"), (40, "cloudy", "jacket")] {
//!     pipeline.record_observation(&json!({
//!         "training_data": {
//!             "features": {"temp": temp, "sky": sky},
//!             "labels": {"top": top}
//!         }
//!     }))?;
//! }
//!
//! let report = pipeline.train()?;
//! println!("In-sample fit: {:?}", report.self_predictions());
//!
//! let features = parse_features(&json!({"temp": 40, "sky": "cloudy"}))?;
//! let predictions = pipeline.infer(Some(&features), &["top", "shoes"])?;
//! assert_eq!(predictions["top"].prediction(), Some("jacket"));
//! assert!(predictions["shoes"].error().is_some());
//! # Ok(())
//! # }
//! ```

pub mod artifact_manager;
pub mod classifier;
pub mod config;
pub mod error;
pub mod observation;
mod persist;
pub mod pipeline;
pub mod store;

pub use artifact_manager::{ArtifactError, ArtifactManager, LabelArtifact};
pub use classifier::{
    ForestConfig, LabelOutcome, MaxFeatures, Predictions, TrainingReport, MISSING_LABEL,
};
pub use config::StorageConfig;
pub use error::PipelineError;
pub use observation::{parse_features, FeatureValue, Features, Labels, Observation};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineInfo};
pub use store::TrainingStore;

pub fn init_logger() {
    env_logger::init();
}
