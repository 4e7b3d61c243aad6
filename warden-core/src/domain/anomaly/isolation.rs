// warden-core/src/domain/anomaly/isolation.rs

// Deterministic isolation-style score: instead of random trees we bisect the value range at its
// midpoint until the observation sits alone. Outliers get isolated in very few splits.

use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_9;
const MAX_DEPTH: usize = 48;
/// Most recent training values kept in the model.
pub const MAX_SAMPLE: usize = 256;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct IsolationSample {
    pub values: Vec<f64>,
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationSample {
    pub fn fit(values: &[f64]) -> Self {
        let skip = values.len().saturating_sub(MAX_SAMPLE);
        Self {
            values: values.iter().skip(skip).copied().filter(|v| v.is_finite()).collect(),
        }
    }

    /// Number of midpoint splits needed to isolate `x`, plus the usual c(k) adjustment
    /// when it ends up in a cell it cannot be separated from.
    pub fn path_length(&self, x: f64) -> f64 {
        let mut remaining: Vec<f64> = self.values.clone();
        let mut lo = remaining.iter().copied().fold(x, f64::min);
        let mut hi = remaining.iter().copied().fold(x, f64::max);
        let mut depth = 0usize;

        while !remaining.is_empty() && depth < MAX_DEPTH {
            if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
                break;
            }
            let mid = lo + (hi - lo) / 2.0;
            if x < mid {
                remaining.retain(|v| *v < mid);
                hi = mid;
            } else {
                remaining.retain(|v| *v >= mid);
                lo = mid;
            }
            depth += 1;
        }

        if remaining.is_empty() {
            depth as f64
        } else {
            depth as f64 + average_path(remaining.len() + 1)
        }
    }

    /// s = 2^(-h / c(n)); close to 1 for outliers, around 0.5 or below for ordinary values.
    pub fn score(&self, x: f64) -> f64 {
        let c = average_path(self.values.len());
        if c <= 0.0 {
            return 0.0;
        }
        2f64.powf(-self.path_length(x) / c)
    }

    pub fn median(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}
