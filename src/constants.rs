/// Minimum error-tracker width on both the incumbent and its alternate
/// before a promote/prune comparison is attempted.
pub const ALTERNATE_MIN_WIDTH: f64 = 300.0;
/// Confidence used by the two-sided alternate comparison bound.
pub const ALTERNATE_SWITCH_CONFIDENCE: f64 = 0.05;
/// Number of candidate thresholds evaluated per numeric attribute.
pub const NUM_SPLIT_POINTS: usize = 10;
/// Smallest fraction of total weight a branch must carry to count
/// towards the information-gain minimum-branch requirement.
pub const MIN_BRANCH_FRACTION: f64 = 0.01;
