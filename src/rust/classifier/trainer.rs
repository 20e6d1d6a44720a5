use std::collections::{BTreeMap, BTreeSet};

use log::info;
use serde::Serialize;

use super::codec::{LabelCodec, MISSING_LABEL};
use super::features::{FeatureSchema, FeatureTransformer};
use super::forest::{ForestConfig, RandomForest};
use crate::artifact_manager::{ArtifactManager, LabelArtifact};
use crate::error::PipelineError;
use crate::observation::Observation;

/// In-sample fit of one label's classifier.
///
/// These are the model's predictions on the very records it was trained on,
/// a sanity signal that training worked. They say nothing about how the
/// model generalises.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelFit {
    /// Decoded prediction for each stored record, in store order.
    pub self_predictions: Vec<String>,
    /// Fraction of records whose self-prediction equals their stored target.
    pub in_sample_accuracy: f64,
    /// Every class value seen for the label, including `"None"` when some
    /// records lack it.
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub records: usize,
    pub labels: BTreeMap<String, LabelFit>,
}

impl TrainingReport {
    /// Label key to per-record self-predictions.
    pub fn self_predictions(&self) -> BTreeMap<String, Vec<String>> {
        self.labels
            .iter()
            .map(|(key, fit)| (key.clone(), fit.self_predictions.clone()))
            .collect()
    }
}

/// Fits one independent classifier per label key and persists each as a
/// self-contained artifact.
pub struct LabelTrainer<'a> {
    artifacts: &'a ArtifactManager,
    config: ForestConfig,
}

impl<'a> LabelTrainer<'a> {
    pub fn new(artifacts: &'a ArtifactManager, config: ForestConfig) -> Self {
        Self { artifacts, config }
    }

    /// Trains on every record. Fit on everything, report in-sample fit: there
    /// is no held-out split.
    pub fn train(&self, records: &[Observation]) -> Result<TrainingReport, PipelineError> {
        let first = records.first().ok_or_else(|| {
            PipelineError::NoDataError("no training data has been recorded".into())
        })?;

        let schema = FeatureSchema::infer(&first.features);
        let transformer = FeatureTransformer::fit(schema, records.iter().map(|r| &r.features))?;
        let x = transformer.transform_batch(records.iter().map(|r| &r.features))?;
        info!(
            "Encoded {} records into {} feature columns",
            x.nrows(),
            x.ncols()
        );

        let label_keys: BTreeSet<&str> = records.iter().flat_map(|r| r.label_keys()).collect();
        if label_keys.is_empty() {
            return Err(PipelineError::NoDataError(
                "stored observations carry no label keys".into(),
            ));
        }

        let mut labels = BTreeMap::new();
        for key in label_keys {
            let targets: Vec<&str> = records
                .iter()
                .map(|r| r.label(key).unwrap_or(MISSING_LABEL))
                .collect();
            let codec = LabelCodec::fit(&targets)?;
            let y = codec.encode_all(&targets)?;

            info!(
                "Training label '{}': {} classes over {} records",
                key,
                codec.len(),
                records.len()
            );
            let classifier = RandomForest::fit(x.view(), &y, codec.len(), &self.config)?;

            let predicted = classifier.predict_batch(x.view())?;
            let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
            let in_sample_accuracy = correct as f64 / records.len() as f64;
            let self_predictions = predicted
                .iter()
                .map(|&class| {
                    codec.decode(class).map(str::to_string).ok_or_else(|| {
                        PipelineError::ArtifactCorruptError(format!(
                            "class index {} has no label for '{}'",
                            class, key
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            info!(
                "Label '{}' in-sample accuracy: {:.1}%",
                key,
                in_sample_accuracy * 100.0
            );

            let classes = codec.classes().to_vec();
            let artifact =
                LabelArtifact::new(key, records.len(), transformer.clone(), codec, classifier);
            self.artifacts.save(&artifact)?;

            labels.insert(
                key.to_string(),
                LabelFit {
                    self_predictions,
                    in_sample_accuracy,
                    classes,
                },
            );
        }

        Ok(TrainingReport {
            records: records.len(),
            labels,
        })
    }
}
