//! Leaf estimators
//!
//! Strategies for turning a leaf's accumulated statistics into a class
//! score vector. The adaptive variant keeps a per-leaf record of which of
//! the two base strategies has been right more often and uses that one.
use crate::data::Instance;
use crate::observer::AttributeObserver;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// Leaf prediction strategy.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LeafPrediction {
    /// Majority class from the observed class distribution.
    MajorityClass,
    /// Naive Bayes over the leaf's attribute observers.
    NaiveBayes,
    /// Whichever of the two has the larger historical correct weight at
    /// this leaf.
    #[default]
    NBAdaptive,
}

/// Unnormalized naive-Bayes class scores:
/// `P(c) * prod_i P(x_i | c)` over the non-disabled attributes.
pub fn naive_bayes_votes(
    instance: &Instance,
    class_dist: &[f64],
    observers: &[AttributeObserver],
    disabled_attributes: &HashSet<usize>,
) -> Vec<f64> {
    let total: f64 = class_dist.iter().sum();
    if total <= 0.0 {
        return class_dist.to_vec();
    }
    let mut votes: Vec<f64> = class_dist.iter().map(|w| w / total).collect();
    for (class, vote) in votes.iter_mut().enumerate() {
        if *vote <= 0.0 {
            continue;
        }
        for (i, obs) in observers.iter().enumerate() {
            if disabled_attributes.contains(&i) {
                continue;
            }
            *vote *= obs.probability_given_class(instance.feature(i), class);
        }
    }
    votes
}
