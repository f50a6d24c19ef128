//! Decision trees
//!
//! Two builders share one flat node layout:
//! - CART classification trees (gini impurity, optional feature subsampling)
//!   used by the random forest. Leaves hold class distributions.
//! - Second-order regression trees fit on gradient/hessian pairs, used by
//!   the boosted classifiers. Leaves hold a single weight `-G / (H + lambda)`.
//!
//! Rows go left when `row[feature] <= threshold`.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Leaf payload reached by `row`
    pub fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Check the layout a deserialized tree must have before traversal
    ///
    /// Nodes are stored in pre-order, so both children of a split sit after
    /// it. Requiring that also rules out cycles.
    pub fn validate(&self, n_features: usize, leaf_len: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            idx, feature, n_features
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", idx));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {} points to invalid child {}", idx, child));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != leaf_len {
                        return Err(format!(
                            "leaf {} holds {} values, expected {}",
                            idx,
                            value.len(),
                            leaf_len
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Candidate split found during a sweep
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Midpoint threshold between two distinct sorted values
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi {
        lo
    } else {
        mid
    }
}

fn sorted_by_feature(x: &[Vec<f64>], samples: &[usize], feature: usize) -> Vec<usize> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
    sorted
}

fn partition(
    x: &[Vec<f64>],
    samples: &[usize],
    feature: usize,
    threshold: f64,
) -> (Vec<usize>, Vec<usize>) {
    samples.iter().partition(|&&i| x[i][feature] <= threshold)
}

// ---------------------------------------------------------------------------
// Classification trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClassificationTreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features drawn per split; all features when equal to the width
    pub max_features: usize,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

struct ClassificationBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    params: &'a ClassificationTreeParams,
    rng: &'a mut StdRng,
    importances: Vec<f64>,
    nodes: Vec<Node>,
}

impl ClassificationBuilder<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1.0;
        }
        counts
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });

        let counts = self.class_counts(&samples);
        let total = samples.len() as f64;
        let impurity = gini(&counts, total);

        let can_split = samples.len() >= self.params.min_samples_split
            && impurity > 0.0
            && self.params.max_depth.map_or(true, |d| depth < d);

        if let Some(split) = can_split
            .then(|| self.best_split(&samples, &counts, impurity))
            .flatten()
        {
            self.importances[split.feature] += split.gain;
            let (left, right) = partition(self.x, &samples, split.feature, split.threshold);
            let left = self.build(left, depth + 1);
            let right = self.build(right, depth + 1);
            self.nodes[idx] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
        } else {
            let value = counts.iter().map(|c| c / total).collect();
            self.nodes[idx] = Node::Leaf { value };
        }

        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let width = self.x[0].len();
        if self.params.max_features >= width {
            return (0..width).collect();
        }
        let mut features =
            rand::seq::index::sample(&mut *self.rng, width, self.params.max_features).into_vec();
        features.sort_unstable();
        features
    }

    fn best_split(
        &mut self,
        samples: &[usize],
        counts: &[f64],
        impurity: f64,
    ) -> Option<SplitCandidate> {
        let total = samples.len() as f64;
        let mut best: Option<SplitCandidate> = None;

        for feature in self.candidate_features() {
            let sorted = sorted_by_feature(self.x, samples, feature);
            let mut left = vec![0.0; self.n_classes];
            let mut right = counts.to_vec();

            for pos in 0..sorted.len() - 1 {
                let class = self.y[sorted[pos]];
                left[class] += 1.0;
                right[class] -= 1.0;

                let lo = self.x[sorted[pos]][feature];
                let hi = self.x[sorted[pos + 1]][feature];
                if lo >= hi {
                    continue;
                }

                let n_left = (pos + 1) as f64;
                let n_right = total - n_left;
                // Weighted impurity decrease
                let gain = total * impurity
                    - n_left * gini(&left, n_left)
                    - n_right * gini(&right, n_right);

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: midpoint(lo, hi),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Fit a CART tree on `samples` (may repeat rows for bootstrap draws)
///
/// Returns the tree and its unnormalized impurity-decrease importances.
pub fn fit_classification_tree(
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    samples: Vec<usize>,
    params: &ClassificationTreeParams,
    rng: &mut StdRng,
) -> (DecisionTree, Vec<f64>) {
    let width = x.first().map_or(0, |r| r.len());
    let mut builder = ClassificationBuilder {
        x,
        y,
        n_classes,
        params,
        rng,
        importances: vec![0.0; width],
        nodes: Vec::new(),
    };
    builder.build(samples, 0);

    (
        DecisionTree {
            nodes: builder.nodes,
        },
        builder.importances,
    )
}

// ---------------------------------------------------------------------------
// Gradient trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GradientTreeParams {
    pub max_depth: usize,
    pub lambda: f64,
    pub min_child_weight: f64,
}

/// Feature orderings computed once per boosting run
pub struct PresortedFeatures {
    order: Vec<Vec<usize>>,
}

impl PresortedFeatures {
    pub fn new(x: &[Vec<f64>]) -> Self {
        let width = x.first().map_or(0, |r| r.len());
        let all: Vec<usize> = (0..x.len()).collect();
        let order = (0..width).map(|f| sorted_by_feature(x, &all, f)).collect();
        Self { order }
    }
}

fn leaf_weight(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= f64::EPSILON {
        0.0
    } else {
        -g / denom
    }
}

fn split_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= f64::EPSILON {
        0.0
    } else {
        g * g / denom
    }
}

struct GradientBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    presorted: &'a PresortedFeatures,
    params: &'a GradientTreeParams,
    /// Node id of each row while building; `usize::MAX` when not in the node
    membership: Vec<usize>,
    importances: Vec<f64>,
    nodes: Vec<Node>,
}

impl GradientBuilder<'_> {
    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });

        let g: f64 = samples.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = samples.iter().map(|&i| self.hess[i]).sum();

        let split = if depth < self.params.max_depth && samples.len() >= 2 {
            for &i in &samples {
                self.membership[i] = idx;
            }
            self.best_split(idx, g, h)
        } else {
            None
        };

        match split {
            Some(split) => {
                self.importances[split.feature] += split.gain;
                let (left, right) = partition(self.x, &samples, split.feature, split.threshold);
                let left = self.build(left, depth + 1);
                let right = self.build(right, depth + 1);
                self.nodes[idx] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[idx] = Node::Leaf {
                    value: vec![leaf_weight(g, h, self.params.lambda)],
                };
            }
        }

        idx
    }

    fn best_split(&self, node: usize, g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let parent = split_score(g, h, lambda);
        let mut best: Option<SplitCandidate> = None;

        for (feature, order) in self.presorted.order.iter().enumerate() {
            let rows: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&i| self.membership[i] == node)
                .collect();

            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..rows.len().saturating_sub(1) {
                gl += self.grad[rows[pos]];
                hl += self.hess[rows[pos]];

                let lo = self.x[rows[pos]][feature];
                let hi = self.x[rows[pos + 1]][feature];
                if lo >= hi {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain =
                    0.5 * (split_score(gl, hl, lambda) + split_score(gr, hr, lambda) - parent);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: midpoint(lo, hi),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Fit a second-order regression tree over every row
///
/// Returns the tree and its unnormalized gain importances.
pub fn fit_gradient_tree(
    x: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    presorted: &PresortedFeatures,
    params: &GradientTreeParams,
) -> (DecisionTree, Vec<f64>) {
    let width = x.first().map_or(0, |r| r.len());
    let mut builder = GradientBuilder {
        x,
        grad,
        hess,
        presorted,
        params,
        membership: vec![usize::MAX; x.len()],
        importances: vec![0.0; width],
        nodes: Vec::new(),
    };
    builder.build((0..x.len()).collect(), 0);

    (
        DecisionTree {
            nodes: builder.nodes,
        },
        builder.importances,
    )
}

/// Scale importances to sum to 1; all-zero stays all-zero
pub fn normalize_importances(importances: &mut [f64]) {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|v| *v /= total);
    }
}
