use std::collections::BTreeSet;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::observation::{FeatureValue, Features};

/// How a feature column is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Textual values, one-hot encoded
    Categorical,
    /// Numeric values, passed through unchanged
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// The ordered, typed list of feature columns every record and every
/// inference request must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    /// Classifies each column of a single record: textual values are
    /// categorical, everything else numeric.
    pub fn infer(features: &Features) -> Self {
        let columns = features
            .iter()
            .map(|(name, value)| FeatureColumn {
                name: name.clone(),
                kind: if value.is_categorical() {
                    ColumnKind::Categorical
                } else {
                    ColumnKind::Numeric
                },
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Checks that `features` has exactly this schema's columns with values
    /// of the matching kind.
    pub fn validate(&self, features: &Features) -> Result<(), PipelineError> {
        let missing: Vec<&str> = self
            .names()
            .filter(|name| !features.contains_key(*name))
            .collect();
        let unexpected: Vec<&str> = features
            .keys()
            .map(String::as_str)
            .filter(|name| !self.columns.iter().any(|c| c.name == *name))
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PipelineError::SchemaError(format!(
                "feature keys do not match schema (missing: {:?}, unexpected: {:?})",
                missing, unexpected
            )));
        }

        for column in &self.columns {
            let value = &features[&column.name];
            let kind_matches = match column.kind {
                ColumnKind::Categorical => value.is_categorical(),
                ColumnKind::Numeric => !value.is_categorical(),
            };
            if !kind_matches {
                return Err(PipelineError::SchemaError(format!(
                    "feature '{}' must be {}",
                    column.name,
                    match column.kind {
                        ColumnKind::Categorical => "a category string",
                        ColumnKind::Numeric => "a number",
                    }
                )));
            }
        }
        Ok(())
    }
}

/// Column-wise encoder fitted over a training set: one-hot for categorical
/// columns (in sorted category order), passthrough for numeric ones.
///
/// A category never seen during fitting encodes as all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransformer {
    schema: FeatureSchema,
    /// Known categories per column; empty for numeric columns.
    categories: Vec<Vec<String>>,
}

impl FeatureTransformer {
    /// Fits the transformer over every row. Each row must match `schema`.
    pub fn fit<'a, I>(schema: FeatureSchema, rows: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = &'a Features>,
    {
        let mut seen: Vec<BTreeSet<String>> = vec![BTreeSet::new(); schema.len()];
        let mut count = 0usize;
        for (i, row) in rows.into_iter().enumerate() {
            schema.validate(row).map_err(|e| match e {
                PipelineError::SchemaError(msg) => {
                    PipelineError::SchemaError(format!("record {}: {}", i, msg))
                }
                other => other,
            })?;
            for (col, column) in schema.columns().iter().enumerate() {
                if let FeatureValue::Category(value) = &row[&column.name] {
                    seen[col].insert(value.clone());
                }
            }
            count += 1;
        }
        if count == 0 {
            return Err(PipelineError::NoDataError(
                "cannot fit a feature transformer without rows".into(),
            ));
        }

        let categories = seen.into_iter().map(|set| set.into_iter().collect()).collect();
        Ok(Self { schema, categories })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Number of columns produced by [`transform`](Self::transform).
    pub fn output_width(&self) -> usize {
        self.schema
            .columns()
            .iter()
            .zip(&self.categories)
            .map(|(column, cats)| match column.kind {
                ColumnKind::Categorical => cats.len(),
                ColumnKind::Numeric => 1,
            })
            .sum()
    }

    /// Names of the produced columns, `name=category` for one-hot slots.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.output_width());
        for (column, cats) in self.schema.columns().iter().zip(&self.categories) {
            match column.kind {
                ColumnKind::Categorical => {
                    names.extend(cats.iter().map(|c| format!("{}={}", column.name, c)))
                }
                ColumnKind::Numeric => names.push(column.name.clone()),
            }
        }
        names
    }

    pub fn transform(&self, features: &Features) -> Result<Array1<f64>, PipelineError> {
        self.schema.validate(features)?;
        let mut encoded = Array1::zeros(self.output_width());
        let mut offset = 0;
        for (column, cats) in self.schema.columns().iter().zip(&self.categories) {
            match (&features[&column.name], column.kind) {
                (FeatureValue::Category(value), ColumnKind::Categorical) => {
                    if let Ok(pos) = cats.binary_search(value) {
                        encoded[offset + pos] = 1.0;
                    }
                    offset += cats.len();
                }
                (FeatureValue::Number(value), ColumnKind::Numeric) => {
                    encoded[offset] = *value;
                    offset += 1;
                }
                _ => {
                    return Err(PipelineError::SchemaError(format!(
                        "feature '{}' does not match its column kind",
                        column.name
                    )))
                }
            }
        }
        Ok(encoded)
    }

    pub fn transform_batch<'a, I>(&self, rows: I) -> Result<Array2<f64>, PipelineError>
    where
        I: IntoIterator<Item = &'a Features>,
    {
        let encoded = rows
            .into_iter()
            .map(|row| self.transform(row))
            .collect::<Result<Vec<_>, _>>()?;
        let mut matrix = Array2::zeros((encoded.len(), self.output_width()));
        for (mut target, row) in matrix.rows_mut().into_iter().zip(&encoded) {
            target.assign(row);
        }
        Ok(matrix)
    }
}
