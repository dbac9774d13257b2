use crate::constants::MIN_BRANCH_FRACTION;
use crate::data::{Attribute, Instance, Schema};
use serde::{Deserialize, Serialize};

/// Merit criterion used to rank candidate splits.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SplitCriterion {
    #[default]
    InfoGain,
    GiniImpurity,
}

impl SplitCriterion {
    /// Merit of partitioning `pre` into the `post` branch distributions.
    /// Higher is better. Information gain returns negative infinity when
    /// fewer than two branches would carry a meaningful share of the
    /// weight.
    pub fn merit_of_split(&self, pre: &[f64], post: &[Vec<f64>]) -> f64 {
        match self {
            SplitCriterion::InfoGain => {
                let total: f64 = post.iter().map(|d| d.iter().sum::<f64>()).sum();
                if total <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let meaningful = post
                    .iter()
                    .filter(|d| d.iter().sum::<f64>() / total > MIN_BRANCH_FRACTION)
                    .count();
                if meaningful < 2 {
                    return f64::NEG_INFINITY;
                }
                entropy(pre) - weighted_entropy(post, total)
            }
            SplitCriterion::GiniImpurity => {
                let total: f64 = post.iter().map(|d| d.iter().sum::<f64>()).sum();
                if total <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let weighted_gini: f64 = post
                    .iter()
                    .map(|d| {
                        let w: f64 = d.iter().sum();
                        if w <= 0.0 {
                            0.0
                        } else {
                            (w / total) * gini(d, w)
                        }
                    })
                    .sum();
                1.0 - weighted_gini
            }
        }
    }

    /// Upper bound on the merit scale, used by the Hoeffding bound.
    pub fn range_of_merit(&self, pre: &[f64]) -> f64 {
        match self {
            SplitCriterion::InfoGain => {
                let n_classes = pre.iter().filter(|v| **v > 0.0).count().max(2);
                (n_classes as f64).log2()
            }
            SplitCriterion::GiniImpurity => 1.0,
        }
    }
}

fn entropy(dist: &[f64]) -> f64 {
    let total: f64 = dist.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut h = 0.0;
    for v in dist {
        if *v > 0.0 {
            let p = v / total;
            h -= p * p.log2();
        }
    }
    h
}

fn weighted_entropy(post: &[Vec<f64>], total: f64) -> f64 {
    post.iter()
        .map(|d| {
            let w: f64 = d.iter().sum();
            if w <= 0.0 {
                0.0
            } else {
                (w / total) * entropy(d)
            }
        })
        .sum()
}

fn gini(dist: &[f64], weight: f64) -> f64 {
    let mut g = 1.0;
    for v in dist {
        let p = v / weight;
        g -= p * p;
    }
    g
}

/// One-sided Hoeffding bound on the true merit gap between two split
/// candidates after `weight_seen` weighted observations.
pub fn hoeffding_bound(range_of_merit: f64, confidence: f64, weight_seen: f64) -> f64 {
    ((range_of_merit * range_of_merit * (1.0 / confidence).ln()) / (2.0 * weight_seen)).sqrt()
}

/// Two-sided bound on the error-rate gap between an incumbent subtree and
/// its alternate, with `p` the incumbent's current error estimate and the
/// widths the two trackers' sample counts.
pub fn alternate_switch_bound(p: f64, confidence: f64, width_main: f64, width_alt: f64) -> f64 {
    let m = 1.0 / width_main + 1.0 / width_alt;
    (2.0 * p * (1.0 - p) * (2.0 / confidence).ln() * m).sqrt()
}

/// The branching test a decision node applies to route an instance.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub enum SplitTest {
    /// One branch per observed value of a nominal attribute.
    NominalMultiway { attribute: usize },
    /// Binary test on a numeric attribute: `value <= threshold` is branch 0.
    NumericThreshold { attribute: usize, threshold: f64 },
}

impl SplitTest {
    pub fn attribute(&self) -> usize {
        match self {
            SplitTest::NominalMultiway { attribute } => *attribute,
            SplitTest::NumericThreshold { attribute, .. } => *attribute,
        }
    }

    /// Branch index the instance filters into. May exceed the child-slot
    /// count for out-of-schema nominal values; callers treat that as an
    /// empty slot.
    pub fn branch_for(&self, instance: &Instance) -> usize {
        match self {
            SplitTest::NominalMultiway { attribute } => instance.feature(*attribute) as usize,
            SplitTest::NumericThreshold { attribute, threshold } => {
                if instance.feature(*attribute) <= *threshold {
                    0
                } else {
                    1
                }
            }
        }
    }

    pub fn max_branches(&self, schema: &Schema) -> usize {
        match self {
            SplitTest::NominalMultiway { attribute } => match schema.attributes[*attribute] {
                Attribute::Nominal { values } => values,
                Attribute::Numeric => 0,
            },
            SplitTest::NumericThreshold { .. } => 2,
        }
    }
}

/// A ranked split candidate: the test (None encodes the "do not split"
/// action), the resulting per-branch class distributions, and its merit.
#[derive(Clone, Debug)]
pub struct SplitCandidate {
    pub test: Option<SplitTest>,
    pub branch_dists: Vec<Vec<f64>>,
    pub merit: f64,
}

impl SplitCandidate {
    pub fn null_split(merit: f64) -> Self {
        SplitCandidate {
            test: None,
            branch_dists: Vec::new(),
            merit,
        }
    }

    pub fn num_branches(&self) -> usize {
        self.branch_dists.len()
    }
}
