mod constants;
mod memory;

// Modules
pub mod config;
pub mod data;
pub mod drift;
pub mod errors;
pub mod estimator;
pub mod node;
pub mod observer;
pub mod split;
pub mod stream;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use config::{ModelIO, TreeConfig};
pub use data::{Attribute, Instance, Schema};
pub use drift::Adwin;
pub use errors::AdaptreeError;
pub use estimator::LeafPrediction;
pub use split::SplitCriterion;
pub use stream::DriftGenerator;
pub use tree::AdaptiveTree;
