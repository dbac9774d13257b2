//! Tree Configuration
//!
//! Defines the configuration structure for the adaptive tree, its
//! validation, and the JSON persistence trait shared by serializable
//! models.
use crate::errors::AdaptreeError;
use crate::estimator::LeafPrediction;
use crate::split::SplitCriterion;
use crate::utils::validate_float_parameter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_grace_period() -> f64 {
    200.0
}
fn default_split_confidence() -> f64 {
    1e-7
}
fn default_tie_threshold() -> f64 {
    0.05
}
fn default_max_active_leaves() -> usize {
    usize::MAX
}
fn default_seed() -> u64 {
    1
}

/// Configuration for an `AdaptiveTree`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TreeConfig {
    /// Instance weight a leaf must accumulate between split evaluations.
    #[serde(default = "default_grace_period")]
    pub grace_period: f64,
    /// Confidence (delta) for the Hoeffding split bound.
    #[serde(default = "default_split_confidence")]
    pub split_confidence: f64,
    /// Bound below which a split decision is forced despite a merit tie.
    #[serde(default = "default_tie_threshold")]
    pub tie_threshold: f64,
    /// Leaf prediction strategy.
    #[serde(default)]
    pub leaf_prediction: LeafPrediction,
    /// Merit criterion for ranking candidate splits.
    #[serde(default)]
    pub split_criterion: SplitCriterion,
    /// Disable attributes whose merit trails the best by more than the
    /// bound across two scan passes.
    #[serde(default)]
    pub remove_poor_attributes: bool,
    /// Ceiling on active leaves; the least promising leaves are
    /// deactivated once it is exceeded.
    #[serde(default = "default_max_active_leaves")]
    pub max_active_leaves: usize,
    /// Reweight each instance at the leaf by a Poisson(1) draw.
    #[serde(default)]
    pub bootstrap_instances: bool,
    /// Seed for random number generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Log a training summary every N instances; zero disables.
    #[serde(default)]
    pub log_interval: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            grace_period: default_grace_period(),
            split_confidence: default_split_confidence(),
            tie_threshold: default_tie_threshold(),
            leaf_prediction: LeafPrediction::default(),
            split_criterion: SplitCriterion::default(),
            remove_poor_attributes: false,
            max_active_leaves: default_max_active_leaves(),
            bootstrap_instances: false,
            seed: default_seed(),
            log_interval: 0,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), AdaptreeError> {
        if !(self.grace_period >= 1.0) {
            return Err(AdaptreeError::InvalidParameter(
                "grace_period".to_string(),
                "weight of at least 1".to_string(),
                self.grace_period.to_string(),
            ));
        }
        if !(self.split_confidence > 0.0 && self.split_confidence < 1.0) {
            return Err(AdaptreeError::InvalidParameter(
                "split_confidence".to_string(),
                "value strictly between 0 and 1".to_string(),
                self.split_confidence.to_string(),
            ));
        }
        validate_float_parameter(self.tie_threshold, 0.0, 1.0, "tie_threshold")?;
        if self.max_active_leaves == 0 {
            return Err(AdaptreeError::InvalidParameter(
                "max_active_leaves".to_string(),
                "ceiling of at least 1 leaf".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// IO
pub trait ModelIO: Serialize + DeserializeOwned + Sized {
    /// Save a model as a json object to a file.
    ///
    /// * `path` - Path to save the model.
    fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), AdaptreeError> {
        fs::write(path, self.json_dump()?).map_err(|e| AdaptreeError::UnableToWrite(e.to_string()))
    }

    /// Dump a model as a json object.
    fn json_dump(&self) -> Result<String, AdaptreeError> {
        serde_json::to_string(self).map_err(|e| AdaptreeError::UnableToWrite(e.to_string()))
    }

    /// Load a model from a json string.
    fn from_json(json_str: &str) -> Result<Self, AdaptreeError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| AdaptreeError::UnableToRead(e.to_string()))
    }

    /// Load a model from a path to a json model object.
    fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, AdaptreeError> {
        let json_str = fs::read_to_string(path).map_err(|e| AdaptreeError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ModelIO for TreeConfig {}
