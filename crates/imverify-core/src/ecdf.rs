//! Empirical Cumulative Distribution Function (ECDF)
//!
//! The ECDF backs every sample-based quantity in the engine:
//!
//! - resolving sample-percentile thresholds (`>=SFP90`)
//! - ranking observation anomalies for sample-rank climatology bins
//! - error quantiles (E10 ... E90, EIQR) and rank correlation
//!
//! Bad-data values are dropped on construction.

use serde::{Deserialize, Serialize};

use crate::bad_data::{is_valid, BAD_DATA};

/// Empirical Cumulative Distribution Function over the valid values of a sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ecdf {
    /// Sorted valid values
    values: Vec<f64>,
}

impl Ecdf {
    /// Build an ECDF from data, ignoring bad-data values
    ///
    /// Time complexity: O(n log n) for sorting
    pub fn from_data(data: &[f64]) -> Self {
        let mut values: Vec<f64> = data.iter().copied().filter(|x| is_valid(*x)).collect();
        values.sort_by(f64::total_cmp);
        Self { values }
    }

    /// Evaluate the ECDF at a point
    ///
    /// Returns the proportion of values <= x
    /// Time complexity: O(log n)
    pub fn evaluate(&self, x: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let count = self.values.partition_point(|v| *v <= x);
        count as f64 / self.values.len() as f64
    }

    /// Percentile with linear interpolation between order statistics
    ///
    /// `p` is a fraction in [0, 1]. The position is `p * (n - 1)`.
    pub fn percentile(&self, p: f64) -> f64 {
        percentile_sorted(&self.values, p)
    }

    /// Get the median
    pub fn median(&self) -> f64 {
        self.percentile(0.5)
    }

    /// Get the interquartile range (IQR)
    pub fn iqr(&self) -> f64 {
        if self.values.is_empty() {
            return BAD_DATA;
        }
        self.percentile(0.75) - self.percentile(0.25)
    }

    /// Get the number of valid samples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the ECDF is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the sorted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Percentile of an already sorted slice with linear interpolation
///
/// Returns `BAD_DATA` for an empty slice or `p` outside [0, 1].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return BAD_DATA;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = p * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Median of a slice of valid values
pub fn median(data: &[f64]) -> f64 {
    Ecdf::from_data(data).median()
}

/// Average ranks (1-based) with ties sharing the mean rank
///
/// Returns the ranks and the number of tied groups' extra members.
pub fn rank_with_ties(data: &[f64]) -> (Vec<f64>, usize) {
    let n = data.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let mut ranks = vec![0.0; n];
    let mut ties = 0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && data[order[j + 1]] == data[order[i]] {
            j += 1;
        }
        // positions i..=j share rank
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        ties += j - i;
        i = j + 1;
    }
    (ranks, ties)
}
