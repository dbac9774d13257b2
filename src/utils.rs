use crate::errors::AdaptreeError;
use rand::rngs::StdRng;
use rand::Rng;

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), AdaptreeError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), AdaptreeError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(AdaptreeError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Index of the largest value in a slice, first match winning ties.
/// An empty slice maps to index 0.
pub fn max_index(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Draw from a Poisson distribution by inverting the cumulative sum of
/// the series expansion of e^lambda.
pub fn poisson(lambda: f64, rng: &mut StdRng) -> u32 {
    let mut product = 1.0;
    let mut sum = 1.0;
    let threshold = rng.gen::<f64>() * lambda.exp();
    let max = 100u32.max(10 * lambda.ceil() as u32);
    let mut i = 1;
    while sum <= threshold && i < max {
        product *= lambda / i as f64;
        sum += product;
        i += 1;
    }
    i - 1
}

/// Standard normal cumulative distribution function, via the
/// Abramowitz-Stegun polynomial approximation of erf.
pub(crate) fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let y = 1.0
        - (((((1.061_405_429 * t - 1.453_152_027) * t) + 1.421_413_741) * t - 0.284_496_736) * t + 0.254_829_592)
            * t
            * (-x * x).exp();
    sign * y
}
