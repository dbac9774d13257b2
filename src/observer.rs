use crate::constants::NUM_SPLIT_POINTS;
use crate::data::Attribute;
use crate::split::{SplitCandidate, SplitCriterion, SplitTest};
use crate::utils::normal_cdf;
use serde::{Deserialize, Serialize};

/// Running per-class statistics for one attribute of a leaf, sufficient to
/// evaluate candidate splits on that attribute and to score naive-Bayes
/// conditional probabilities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AttributeObserver {
    Nominal(NominalObserver),
    Numeric(NumericObserver),
}

impl AttributeObserver {
    pub fn for_attribute(attribute: &Attribute, n_classes: usize) -> Self {
        match attribute {
            Attribute::Nominal { values } => AttributeObserver::Nominal(NominalObserver::new(*values, n_classes)),
            Attribute::Numeric => AttributeObserver::Numeric(NumericObserver::new(n_classes)),
        }
    }

    pub fn observe(&mut self, value: f64, class: usize, weight: f64) {
        match self {
            AttributeObserver::Nominal(o) => o.observe(value, class, weight),
            AttributeObserver::Numeric(o) => o.observe(value, class, weight),
        }
    }

    /// P(value | class) under this observer's model of the attribute.
    pub fn probability_given_class(&self, value: f64, class: usize) -> f64 {
        match self {
            AttributeObserver::Nominal(o) => o.probability_given_class(value, class),
            AttributeObserver::Numeric(o) => o.probability_given_class(value, class),
        }
    }

    /// Best split candidate on this attribute, if the observer has seen
    /// enough spread to propose one.
    pub fn best_suggestion(
        &self,
        criterion: SplitCriterion,
        pre_dist: &[f64],
        attribute: usize,
    ) -> Option<SplitCandidate> {
        match self {
            AttributeObserver::Nominal(o) => o.best_suggestion(criterion, pre_dist, attribute),
            AttributeObserver::Numeric(o) => o.best_suggestion(criterion, pre_dist, attribute),
        }
    }
}

/// Per-class weight counts for each value of a nominal attribute.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NominalObserver {
    counts: Vec<Vec<f64>>,
    n_values: usize,
}

impl NominalObserver {
    pub fn new(n_values: usize, n_classes: usize) -> Self {
        NominalObserver {
            counts: vec![vec![0.0; n_values]; n_classes],
            n_values,
        }
    }

    pub fn observe(&mut self, value: f64, class: usize, weight: f64) {
        let v = value as usize;
        if v < self.n_values && class < self.counts.len() {
            self.counts[class][v] += weight;
        }
    }

    /// Laplace-smoothed conditional probability.
    pub fn probability_given_class(&self, value: f64, class: usize) -> f64 {
        let v = value as usize;
        if class >= self.counts.len() || v >= self.n_values {
            return 0.0;
        }
        let class_total: f64 = self.counts[class].iter().sum();
        (self.counts[class][v] + 1.0) / (class_total + self.n_values as f64)
    }

    fn best_suggestion(&self, criterion: SplitCriterion, pre_dist: &[f64], attribute: usize) -> Option<SplitCandidate> {
        let n_classes = self.counts.len();
        let mut branch_dists = vec![vec![0.0; n_classes]; self.n_values];
        for (class, per_value) in self.counts.iter().enumerate() {
            for (value, weight) in per_value.iter().enumerate() {
                branch_dists[value][class] = *weight;
            }
        }
        let merit = criterion.merit_of_split(pre_dist, &branch_dists);
        Some(SplitCandidate {
            test: Some(SplitTest::NominalMultiway { attribute }),
            branch_dists,
            merit,
        })
    }
}

/// Per-class Gaussian sufficient statistics for a numeric attribute, plus
/// the observed value range for proposing thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NumericObserver {
    per_class: Vec<GaussianEstimator>,
    min_seen: f64,
    max_seen: f64,
}

impl NumericObserver {
    pub fn new(n_classes: usize) -> Self {
        NumericObserver {
            per_class: vec![GaussianEstimator::default(); n_classes],
            min_seen: f64::INFINITY,
            max_seen: f64::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, value: f64, class: usize, weight: f64) {
        if value.is_nan() || class >= self.per_class.len() {
            return;
        }
        self.min_seen = self.min_seen.min(value);
        self.max_seen = self.max_seen.max(value);
        self.per_class[class].add(value, weight);
    }

    pub fn probability_given_class(&self, value: f64, class: usize) -> f64 {
        match self.per_class.get(class) {
            Some(est) if est.weight_sum > 0.0 => est.probability_density(value),
            _ => 0.0,
        }
    }

    fn best_suggestion(&self, criterion: SplitCriterion, pre_dist: &[f64], attribute: usize) -> Option<SplitCandidate> {
        if !(self.min_seen < self.max_seen) {
            return None;
        }
        let mut best: Option<SplitCandidate> = None;
        let step = (self.max_seen - self.min_seen) / (NUM_SPLIT_POINTS + 1) as f64;
        for i in 1..=NUM_SPLIT_POINTS {
            let threshold = self.min_seen + step * i as f64;
            if threshold <= self.min_seen || threshold >= self.max_seen {
                continue;
            }
            let branch_dists = self.class_dists_at(threshold);
            let merit = criterion.merit_of_split(pre_dist, &branch_dists);
            if best.as_ref().map_or(true, |b| merit > b.merit) {
                best = Some(SplitCandidate {
                    test: Some(SplitTest::NumericThreshold { attribute, threshold }),
                    branch_dists,
                    merit,
                });
            }
        }
        best
    }

    /// Class distributions on either side of the threshold, assigning each
    /// class's weight by its Gaussian mass below the threshold.
    fn class_dists_at(&self, threshold: f64) -> Vec<Vec<f64>> {
        let n_classes = self.per_class.len();
        let mut lhs = vec![0.0; n_classes];
        let mut rhs = vec![0.0; n_classes];
        for (class, est) in self.per_class.iter().enumerate() {
            if est.weight_sum <= 0.0 {
                continue;
            }
            let sd = est.std_dev();
            let below = if sd > 0.0 {
                est.weight_sum * normal_cdf((threshold - est.mean) / sd)
            } else if threshold >= est.mean {
                est.weight_sum
            } else {
                0.0
            };
            lhs[class] = below;
            rhs[class] = est.weight_sum - below;
        }
        vec![lhs, rhs]
    }
}

/// Incremental weighted Gaussian estimator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GaussianEstimator {
    weight_sum: f64,
    mean: f64,
    variance_sum: f64,
}

impl GaussianEstimator {
    pub fn add(&mut self, value: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        if self.weight_sum > 0.0 {
            self.weight_sum += weight;
            let last_mean = self.mean;
            self.mean += weight * (value - last_mean) / self.weight_sum;
            self.variance_sum += weight * (value - last_mean) * (value - self.mean);
        } else {
            self.mean = value;
            self.weight_sum = weight;
        }
    }

    pub fn variance(&self) -> f64 {
        if self.weight_sum > 1.0 {
            self.variance_sum / (self.weight_sum - 1.0)
        } else {
            0.0
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn probability_density(&self, value: f64) -> f64 {
        if self.weight_sum == 0.0 {
            return 0.0;
        }
        let sd = self.std_dev();
        if sd > 0.0 {
            let diff = value - self.mean;
            (1.0 / ((2.0 * std::f64::consts::PI).sqrt() * sd)) * (-(diff * diff) / (2.0 * sd * sd)).exp()
        } else if value == self.mean {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_estimator_moments() {
        let mut est = GaussianEstimator::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            est.add(v, 1.0);
        }
        assert!((est.mean - 5.0).abs() < 1e-12);
        // sample variance of the fixture is 32/7
        assert!((est.variance() - 32.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_nominal_probability_smoothing() {
        let mut obs = NominalObserver::new(3, 2);
        obs.observe(0.0, 0, 4.0);
        obs.observe(1.0, 0, 2.0);
        // (4 + 1) / (6 + 3)
        assert!((obs.probability_given_class(0.0, 0) - 5.0 / 9.0).abs() < 1e-12);
        // unseen value still gets smoothed mass
        assert!(obs.probability_given_class(2.0, 0) > 0.0);
        assert_eq!(obs.probability_given_class(5.0, 0), 0.0);
    }

    #[test]
    fn test_nominal_suggestion_separates_classes() {
        let mut obs = NominalObserver::new(2, 2);
        for _ in 0..50 {
            obs.observe(0.0, 0, 1.0);
            obs.observe(1.0, 1, 1.0);
        }
        let pre = vec![50.0, 50.0];
        let suggestion = obs
            .best_suggestion(SplitCriterion::InfoGain, &pre, 3)
            .expect("suggestion");
        assert!((suggestion.merit - 1.0).abs() < 1e-9);
        assert_eq!(suggestion.test, Some(SplitTest::NominalMultiway { attribute: 3 }));
        assert_eq!(suggestion.branch_dists.len(), 2);
    }

    #[test]
    fn test_numeric_suggestion_finds_separating_threshold() {
        let mut obs = NumericObserver::new(2);
        for i in 0..100 {
            let jitter = (i % 10) as f64 / 100.0;
            obs.observe(jitter, 0, 1.0);
            obs.observe(10.0 + jitter, 1, 1.0);
        }
        let pre = vec![100.0, 100.0];
        let suggestion = obs
            .best_suggestion(SplitCriterion::InfoGain, &pre, 0)
            .expect("suggestion");
        match suggestion.test {
            Some(SplitTest::NumericThreshold { threshold, .. }) => {
                assert!(threshold > 0.2 && threshold < 10.0);
            }
            other => panic!("unexpected test {:?}", other),
        }
        assert!(suggestion.merit > 0.9);
    }

    #[test]
    fn test_numeric_no_suggestion_without_spread() {
        let mut obs = NumericObserver::new(2);
        for _ in 0..20 {
            obs.observe(1.0, 0, 1.0);
        }
        assert!(obs.best_suggestion(SplitCriterion::InfoGain, &[20.0, 0.0], 0).is_none());
    }
}
