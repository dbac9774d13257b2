//! Stream
//!
//! Synthetic labeled-stream generator used by tests and benches. Attribute
//! vectors are drawn from per-attribute multinomials and the label is a
//! deterministic function of the attribute-value combination, so a stream
//! is stationary until one of the drift methods is called.
use crate::data::{Instance, Schema};
use crate::errors::AdaptreeError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct DriftGenerator {
    schema: Schema,
    n_values: usize,
    /// p(x) per attribute.
    px: Vec<Vec<f64>>,
    /// Class per attribute-value combination index.
    pygx: Vec<usize>,
    rng: StdRng,
    instances_generated: u64,
}

impl DriftGenerator {
    pub fn new(n_attributes: usize, n_values: usize, n_classes: usize, seed: u64) -> Result<Self, AdaptreeError> {
        let schema = Schema::nominal(n_attributes, n_values, n_classes)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let px = (0..n_attributes).map(|_| random_distribution(n_values, &mut rng)).collect();
        let combinations = n_values.pow(n_attributes as u32);
        let pygx = (0..combinations).map(|_| rng.gen_range(0..n_classes)).collect();
        Ok(DriftGenerator {
            schema,
            n_values,
            px,
            pygx,
            rng,
            instances_generated: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn instances_generated(&self) -> u64 {
        self.instances_generated
    }

    pub fn restart(&mut self) {
        self.instances_generated = 0;
    }

    /// Resample the class-conditional mapping: an abrupt concept drift.
    pub fn drift_concept(&mut self) {
        let n_classes = self.schema.n_classes;
        for class in self.pygx.iter_mut() {
            *class = self.rng.gen_range(0..n_classes);
        }
    }

    /// Resample the attribute marginals: covariate drift, the
    /// class-conditional mapping stays fixed.
    pub fn drift_covariate(&mut self) {
        for row in self.px.iter_mut() {
            let fresh = random_distribution(self.n_values, &mut self.rng);
            *row = fresh;
        }
    }

    pub fn next_instance(&mut self) -> Instance {
        let n_attributes = self.schema.n_attributes();
        let mut values = Vec::with_capacity(n_attributes);
        for a in 0..n_attributes {
            // invert the multinomial cdf: smallest index whose cumulative
            // probability exceeds the uniform draw
            let draw = self.rng.gen::<f64>();
            let mut chosen = 0;
            let mut cumulative = self.px[a][0];
            while draw > cumulative && chosen + 1 < self.n_values {
                chosen += 1;
                cumulative += self.px[a][chosen];
            }
            values.push(chosen as f64);
        }
        let label = self.pygx[self.combination_index(&values)];
        self.instances_generated += 1;
        Instance::new(values, label)
    }

    fn combination_index(&self, values: &[f64]) -> usize {
        let mut index = 0;
        for value in values {
            index = index * self.n_values + *value as usize;
        }
        index
    }
}

fn random_distribution(n: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut weights: Vec<f64> = (0..n).map(|_| rng.gen::<f64>().max(1e-9)).collect();
    let total: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= total;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = DriftGenerator::new(3, 3, 3, 42).unwrap();
        let mut b = DriftGenerator::new(3, 3, 3, 42).unwrap();
        for _ in 0..100 {
            assert_eq!(a.next_instance(), b.next_instance());
        }
        assert_eq!(a.instances_generated(), 100);
    }

    #[test]
    fn test_labels_follow_mapping() {
        let mut generator = DriftGenerator::new(3, 3, 3, 1).unwrap();
        let instances: Vec<Instance> = (0..200).map(|_| generator.next_instance()).collect();
        for instance in &instances {
            let values: Vec<f64> = (0..3).map(|i| instance.feature(i)).collect();
            let index = generator.combination_index(&values);
            assert_eq!(instance.class_label(), generator.pygx[index]);
        }
    }

    #[test]
    fn test_concept_drift_changes_mapping() {
        let mut generator = DriftGenerator::new(4, 3, 3, 2).unwrap();
        let before = generator.pygx.clone();
        generator.drift_concept();
        assert_ne!(before, generator.pygx);
        // schema unchanged, instances still well-formed
        let instance = generator.next_instance();
        assert!(instance.class_label() < 3);
    }

    #[test]
    fn test_values_within_schema() {
        let mut generator = DriftGenerator::new(2, 4, 2, 3).unwrap();
        generator.drift_covariate();
        for _ in 0..500 {
            let instance = generator.next_instance();
            for i in 0..2 {
                let v = instance.feature(i);
                assert!(v >= 0.0 && v < 4.0);
            }
        }
    }
}
