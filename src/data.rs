use crate::errors::AdaptreeError;
use serde::{Deserialize, Serialize};

/// Kind of a single attribute in a stream schema.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Attribute {
    /// A categorical attribute taking values `0..values`.
    Nominal { values: usize },
    /// A real-valued attribute.
    Numeric,
}

/// Describes the shape of every instance a stream produces: the ordered
/// attribute list and the number of classes.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Schema {
    pub attributes: Vec<Attribute>,
    pub n_classes: usize,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>, n_classes: usize) -> Result<Self, AdaptreeError> {
        if n_classes < 2 {
            return Err(AdaptreeError::InvalidSchema(format!(
                "at least 2 classes required, got {}",
                n_classes
            )));
        }
        if attributes.is_empty() {
            return Err(AdaptreeError::InvalidSchema("no attributes".to_string()));
        }
        if let Some(bad) = attributes
            .iter()
            .position(|a| matches!(a, Attribute::Nominal { values } if *values < 2))
        {
            return Err(AdaptreeError::InvalidSchema(format!(
                "nominal attribute {} has fewer than 2 values",
                bad
            )));
        }
        Ok(Schema { attributes, n_classes })
    }

    /// Convenience constructor for an all-nominal schema where every
    /// attribute takes the same number of values.
    pub fn nominal(n_attributes: usize, values: usize, n_classes: usize) -> Result<Self, AdaptreeError> {
        Schema::new(vec![Attribute::Nominal { values }; n_attributes], n_classes)
    }

    /// Convenience constructor for an all-numeric schema.
    pub fn numeric(n_attributes: usize, n_classes: usize) -> Result<Self, AdaptreeError> {
        Schema::new(vec![Attribute::Numeric; n_attributes], n_classes)
    }

    pub fn n_attributes(&self) -> usize {
        self.attributes.len()
    }
}

/// A single labeled observation: a fixed-length feature vector, a class
/// label, and an instance weight. Immutable once handed to the engine;
/// the engine clones and reweights a local copy where it needs to.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Instance {
    values: Vec<f64>,
    label: usize,
    weight: f64,
}

impl Instance {
    pub fn new(values: Vec<f64>, label: usize) -> Self {
        Instance {
            values,
            label,
            weight: 1.0,
        }
    }

    pub fn with_weight(values: Vec<f64>, label: usize, weight: f64) -> Self {
        Instance { values, label, weight }
    }

    /// Value of the ith attribute.
    pub fn feature(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn class_label(&self) -> usize {
        self.label
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}
