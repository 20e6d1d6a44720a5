//! Random forest of CART decision trees over dense `f64` feature matrices.
//!
//! Trees are grown to purity by default on bootstrap samples, choosing each
//! split by Gini impurity among a random subset of features. Class
//! probabilities are averaged across trees and the arg-max is the prediction.
//! Training is deterministic for a given [`ForestConfig::seed`].

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::utils::{argmax, gini};
use crate::error::PipelineError;

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Count(count) => *count,
        };
        n.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows every tree until its leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.n_trees == 0 {
            return Err(PipelineError::ValidationError("n_trees must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(PipelineError::ValidationError(
                "min_samples_split must be at least 2".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(PipelineError::ValidationError("max_depth must be positive".into()));
        }
        if self.max_features == MaxFeatures::Count(0) {
            return Err(PipelineError::ValidationError("max_features must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        config: &ForestConfig,
        rng: StdRng,
    ) -> Self {
        let mut grower = TreeGrower {
            x: x.view(),
            y,
            n_classes,
            config,
            max_features: config.max_features.resolve(x.ncols()),
            nodes: Vec::new(),
            rng,
        };
        grower.grow(samples);
        Self { nodes: grower.nodes }
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> Result<&[f64], PipelineError> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(Node::Leaf { distribution }) => return Ok(distribution.as_slice()),
                Some(Node::Split { feature, threshold, left, right }) => {
                    let value = row.get(*feature).ok_or_else(|| {
                        PipelineError::ArtifactCorruptError(format!(
                            "tree splits on feature {} but input has {}",
                            feature,
                            row.len()
                        ))
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }
        Err(PipelineError::ArtifactCorruptError("malformed decision tree".into()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(0usize, 0usize)];
        // At most one visit per node, even for a cyclic arena.
        let mut budget = self.nodes.len();
        while let Some((index, depth)) = pending.pop() {
            if budget == 0 {
                break;
            }
            budget -= 1;
            deepest = deepest.max(depth);
            if let Some(Node::Split { left, right, .. }) = self.nodes.get(index) {
                pending.push((*left, depth + 1));
                pending.push((*right, depth + 1));
            }
        }
        deepest
    }
}

struct TreeGrower<'a> {
    x: ArrayView2<'a, f64>,
    y: &'a [usize],
    n_classes: usize,
    config: &'a ForestConfig,
    max_features: usize,
    nodes: Vec<Node>,
    rng: StdRng,
}

impl TreeGrower<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += 1;
        }
        counts
    }

    /// Grows the whole tree from the root `samples`. Nodes are expanded from
    /// an explicit work list, so depth is limited by memory, not the stack.
    fn grow(&mut self, samples: Vec<usize>) {
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let mut pending = vec![(0usize, samples, 0usize)];

        while let Some((index, samples, depth)) = pending.pop() {
            let counts = self.class_counts(&samples);
            let total = samples.len();
            self.nodes[index] = Node::Leaf {
                distribution: counts.iter().map(|&c| c as f64 / total as f64).collect(),
            };

            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let depth_reached = self.config.max_depth.map_or(false, |max| depth >= max);
            if pure || depth_reached || total < self.config.min_samples_split {
                continue;
            }

            let Some((feature, threshold)) = self.best_split(&samples) else {
                continue;
            };
            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&s| self.x[[s, feature]] <= threshold);

            let left = self.nodes.len();
            let right = left + 1;
            for _ in 0..2 {
                self.nodes.push(Node::Leaf {
                    distribution: Vec::new(),
                });
            }
            self.nodes[index] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            pending.push((right, right_samples, depth + 1));
            pending.push((left, left_samples, depth + 1));
        }
    }

    /// Returns the (feature, threshold) pair with the lowest weighted child
    /// impurity. Constant features are skipped and do not count toward
    /// `max_features`.
    fn best_split(&mut self, samples: &[usize]) -> Option<(usize, f64)> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);

        let total = samples.len();
        let mut best: Option<(f64, usize, f64)> = None;
        let mut evaluated = 0;

        for feature in features {
            if evaluated >= self.max_features && best.is_some() {
                break;
            }

            let mut pairs: Vec<(f64, usize)> = samples
                .iter()
                .map(|&s| (self.x[[s, feature]], self.y[s]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            if pairs[0].0 == pairs[total - 1].0 {
                continue;
            }
            evaluated += 1;

            let mut left = vec![0usize; self.n_classes];
            let mut right = vec![0usize; self.n_classes];
            for &(_, class) in &pairs {
                right[class] += 1;
            }

            for i in 1..total {
                let (prev_value, prev_class) = pairs[i - 1];
                left[prev_class] += 1;
                right[prev_class] -= 1;

                let value = pairs[i].0;
                if value <= prev_value {
                    continue;
                }
                let impurity = (i as f64 * gini(&left, i)
                    + (total - i) as f64 * gini(&right, total - i))
                    / total as f64;
                if best.map_or(true, |(b, _, _)| impurity < b) {
                    let mut threshold = prev_value + (value - prev_value) / 2.0;
                    if threshold >= value {
                        threshold = prev_value;
                    }
                    best = Some((impurity, feature, threshold));
                }
            }
        }

        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

/// An ensemble of decision trees voting by averaged class probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits a forest on `x` (one row per sample) against class indices `y`.
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        config: &ForestConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(PipelineError::NoDataError("cannot fit a forest without samples".into()));
        }
        if y.len() != n_samples {
            return Err(PipelineError::ValidationError(format!(
                "{} targets for {} samples",
                y.len(),
                n_samples
            )));
        }
        if let Some(&bad) = y.iter().find(|&&class| class >= n_classes) {
            return Err(PipelineError::ValidationError(format!(
                "class index {} out of range for {} classes",
                bad, n_classes
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let trees = (0..config.n_trees)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let samples: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| tree_rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                DecisionTree::fit(x, y, n_classes, samples, config, tree_rng)
            })
            .collect();

        Ok(Self {
            n_classes,
            n_features: x.ncols(),
            trees,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Class probabilities averaged over all trees.
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> Result<Vec<f64>, PipelineError> {
        if row.len() != self.n_features {
            return Err(PipelineError::ArtifactCorruptError(format!(
                "forest expects {} features, input has {}",
                self.n_features,
                row.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::ArtifactCorruptError("forest has no trees".into()));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let distribution = tree.predict_proba(row)?;
            if distribution.len() != self.n_classes {
                return Err(PipelineError::ArtifactCorruptError(
                    "leaf distribution does not match class count".into(),
                ));
            }
            for (acc, p) in proba.iter_mut().zip(distribution) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }

    pub fn predict(&self, row: ArrayView1<f64>) -> Result<usize, PipelineError> {
        Ok(argmax(&self.predict_proba(row)?))
    }

    pub fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<usize>, PipelineError> {
        x.rows().into_iter().map(|row| self.predict(row)).collect()
    }
}
