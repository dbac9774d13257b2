//! Drift
//!
//! Adaptive-windowing change detector. Every node in the tree owns one of
//! these lazily and feeds it a binary correctness signal per instance; the
//! detector reports when the mean of the signal has shifted significantly,
//! and exposes the current window mean and width for the alternate-subtree
//! comparison bound.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Most buckets a row may hold before its two oldest merge upward.
const MAX_BUCKETS_PER_ROW: usize = 5;
/// Windows narrower than this are never tested for a cut.
const MIN_WINDOW: usize = 16;
/// Smallest sub-window allowed on either side of a candidate cut.
const MIN_SUBWINDOW: f64 = 5.0;
/// Cut tests run every CLOCK insertions.
const CLOCK: u64 = 32;

fn default_delta() -> f64 {
    0.002
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Bucket {
    total: f64,
    variance: f64,
}

/// Exponential-histogram estimator of a bounded signal's mean, with a
/// variance-aware cut test that shrinks the window when the older and the
/// newer part disagree beyond the confidence bound.
///
/// Rows hold buckets of capacity 2^row; row 0 holds the newest
/// single-element buckets. The oldest data lives at the front of the
/// highest row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Adwin {
    #[serde(default = "default_delta")]
    delta: f64,
    rows: Vec<VecDeque<Bucket>>,
    width: usize,
    total: f64,
    var_sum: f64,
    time: u64,
}

impl Default for Adwin {
    fn default() -> Self {
        Adwin::new(default_delta())
    }
}

impl Adwin {
    pub fn new(delta: f64) -> Self {
        Adwin {
            delta,
            rows: vec![VecDeque::new()],
            width: 0,
            total: 0.0,
            var_sum: 0.0,
            time: 0,
        }
    }

    /// Feed one observation. Returns true when a statistically significant
    /// change in the mean was detected (and the window was shrunk).
    pub fn set_input(&mut self, value: f64) -> bool {
        self.insert_element(value);
        self.compress_buckets();
        self.detect_change()
    }

    /// Current estimate of the signal mean over the kept window.
    pub fn estimation(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.total / self.width as f64
        }
    }

    /// Number of observations in the kept window.
    pub fn width(&self) -> f64 {
        self.width as f64
    }

    fn variance(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.var_sum / self.width as f64
        }
    }

    fn insert_element(&mut self, value: f64) {
        self.width += 1;
        if self.width > 1 {
            let prev_mean = self.total / (self.width - 1) as f64;
            self.var_sum += (self.width - 1) as f64 * (value - prev_mean) * (value - prev_mean) / self.width as f64;
        }
        self.total += value;
        self.rows[0].push_back(Bucket {
            total: value,
            variance: 0.0,
        });
    }

    fn compress_buckets(&mut self) {
        let mut row = 0;
        while self.rows[row].len() > MAX_BUCKETS_PER_ROW {
            if row + 1 == self.rows.len() {
                self.rows.push(VecDeque::new());
            }
            let (b1, b2) = match (self.rows[row].pop_front(), self.rows[row].pop_front()) {
                (Some(b1), Some(b2)) => (b1, b2),
                _ => break,
            };
            let n = (1usize << row) as f64;
            let u1 = b1.total / n;
            let u2 = b2.total / n;
            let inc = n * n * (u1 - u2) * (u1 - u2) / (n + n);
            self.rows[row + 1].push_back(Bucket {
                total: b1.total + b2.total,
                variance: b1.variance + b2.variance + inc,
            });
            row += 1;
        }
    }

    fn detect_change(&mut self) -> bool {
        self.time += 1;
        if self.time % CLOCK != 0 || self.width < MIN_WINDOW {
            return false;
        }
        let mut change = false;
        let mut reduce = true;
        while reduce {
            reduce = false;
            let mut n0 = 0.0;
            let mut u0 = 0.0;
            let mut n1 = self.width as f64;
            let mut u1 = self.total;
            'scan: for row in (0..self.rows.len()).rev() {
                let size = (1usize << row) as f64;
                let n_buckets = self.rows[row].len();
                for k in 0..n_buckets {
                    // never cut past the newest bucket
                    if row == 0 && k == n_buckets.saturating_sub(1) {
                        break 'scan;
                    }
                    let total = self.rows[row][k].total;
                    n0 += size;
                    n1 -= size;
                    u0 += total;
                    u1 -= total;
                    if n1 < MIN_SUBWINDOW {
                        break 'scan;
                    }
                    if n0 >= MIN_SUBWINDOW && self.cut_expression(n0, n1, u0, u1) {
                        change = true;
                        if self.width > 0 {
                            self.drop_oldest_bucket();
                            reduce = true;
                        }
                        break 'scan;
                    }
                }
            }
        }
        change
    }

    fn cut_expression(&self, n0: f64, n1: f64, u0: f64, u1: f64) -> bool {
        let n = self.width as f64;
        let dd = (2.0 * n.ln() / self.delta).ln();
        let v = self.variance();
        let m = 1.0 / (n0 - MIN_SUBWINDOW + 1.0) + 1.0 / (n1 - MIN_SUBWINDOW + 1.0);
        let epsilon = (2.0 * m * v * dd).sqrt() + (2.0 / 3.0) * dd * m;
        (u0 / n0 - u1 / n1).abs() > epsilon
    }

    fn drop_oldest_bucket(&mut self) {
        let Some(row) = (0..self.rows.len()).rev().find(|r| !self.rows[*r].is_empty()) else {
            return;
        };
        let Some(bucket) = self.rows[row].pop_front() else {
            return;
        };
        let n1 = (1usize << row) as f64;
        self.width -= 1usize << row;
        self.total -= bucket.total;
        if self.width > 0 {
            let u1 = bucket.total / n1;
            let w = self.width as f64;
            let inc = bucket.variance + n1 * w * (u1 - self.total / w) * (u1 - self.total / w) / (n1 + w);
            self.var_sum = (self.var_sum - inc).max(0.0);
        } else {
            self.var_sum = 0.0;
        }
        while self.rows.len() > 1 && self.rows[self.rows.len() - 1].is_empty() {
            self.rows.pop();
        }
    }
}
