//! Feature encoding, label codecs, the tree-ensemble classifier and the
//! per-label train/infer pipeline built on them.

mod codec;
mod features;
mod forest;
mod inference;
mod trainer;
mod utils;

pub use codec::{LabelCodec, MISSING_LABEL};
pub use features::{ColumnKind, FeatureColumn, FeatureSchema, FeatureTransformer};
pub use forest::{DecisionTree, ForestConfig, MaxFeatures, RandomForest};
pub use inference::{InferenceEngine, LabelOutcome, Predictions};
pub use trainer::{LabelFit, LabelTrainer, TrainingReport};
