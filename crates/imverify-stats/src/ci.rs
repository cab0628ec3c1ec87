//! Confidence intervals
//!
//! Every derived statistic is a [`CiInfo`]: a point estimate plus one
//! [`CiBounds`] per configured alpha for each of the normal-theory and
//! bootstrap methods. Bounds that cannot be computed are [`BAD_DATA`].

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

use imverify_core::bad_data::{is_bad_data, is_valid, BAD_DATA};
use imverify_core::config::CiPolicy;
use imverify_core::dist::normal_inv;

/// Lower and upper bound at one significance level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CiBounds {
    pub alpha: f64,
    pub lower: f64,
    pub upper: f64,
}

impl CiBounds {
    /// Bounds that were not computed
    pub fn bad(alpha: f64) -> Self {
        Self {
            alpha,
            lower: BAD_DATA,
            upper: BAD_DATA,
        }
    }

    /// Bounds from two values; either one bad makes both bad
    pub fn new(alpha: f64, lower: f64, upper: f64) -> Self {
        if is_bad_data(lower) || is_bad_data(upper) {
            return Self::bad(alpha);
        }
        let (lower, upper) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        Self {
            alpha,
            lower,
            upper,
        }
    }

    pub fn is_valid(&self) -> bool {
        is_valid(self.lower) && is_valid(self.upper)
    }

    /// Whether these bounds contain `other`
    pub fn contains(&self, other: &CiBounds) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }
}

/// A derived statistic with its confidence intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiInfo {
    pub estimate: f64,
    /// Normal-theory bounds, one per alpha
    pub normal: Vec<CiBounds>,
    /// Bootstrap bounds, one per alpha
    pub bootstrap: Vec<CiBounds>,
}

impl CiInfo {
    /// Estimate with every bound uncomputed
    pub fn new(estimate: f64, alphas: &[f64]) -> Self {
        Self {
            estimate,
            normal: alphas.iter().map(|&a| CiBounds::bad(a)).collect(),
            bootstrap: alphas.iter().map(|&a| CiBounds::bad(a)).collect(),
        }
    }

    /// The bad-data estimate with uncomputed bounds
    pub fn bad(alphas: &[f64]) -> Self {
        Self::new(BAD_DATA, alphas)
    }

    pub fn is_valid(&self) -> bool {
        is_valid(self.estimate)
    }

    /// Fill the normal-theory bounds from `bounds(alpha) -> (lower, upper)`
    pub fn apply_normal<F>(&mut self, policy: CiPolicy, bounds: F)
    where
        F: Fn(f64) -> (f64, f64),
    {
        if policy == CiPolicy::SkipWhenEstimateBad && !self.is_valid() {
            return;
        }
        for ci in &mut self.normal {
            let (lo, hi) = bounds(ci.alpha);
            *ci = CiBounds::new(ci.alpha, lo, hi);
        }
    }

    /// Replace the bootstrap bounds
    pub fn set_bootstrap(&mut self, bounds: Vec<CiBounds>) {
        debug_assert_eq!(bounds.len(), self.bootstrap.len());
        self.bootstrap = bounds;
    }
}

/// Copy bootstrap results onto record fields, in target order
pub(crate) fn attach_bootstrap(fields: Vec<&mut CiInfo>, bounds: Vec<Vec<CiBounds>>) {
    for (field, b) in fields.into_iter().zip(bounds) {
        field.set_bootstrap(b);
    }
}

/// Two-sided standard normal critical value for `alpha`
pub fn z_crit(alpha: f64) -> f64 {
    normal_inv(1.0 - alpha / 2.0)
}

/// Symmetric normal interval `estimate +/- z * se`
pub fn normal_interval(estimate: f64, se: f64, alpha: f64) -> (f64, f64) {
    if is_bad_data(estimate) || is_bad_data(se) || se < 0.0 {
        return (BAD_DATA, BAD_DATA);
    }
    let half = z_crit(alpha) * se;
    (estimate - half, estimate + half)
}

/// Wilson score interval for a proportion `p` observed over `n` trials
pub fn wilson_interval(p: f64, n: f64, alpha: f64) -> (f64, f64) {
    if is_bad_data(p) || n <= 0.0 || !(0.0..=1.0).contains(&p) {
        return (BAD_DATA, BAD_DATA);
    }
    let z = z_crit(alpha);
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let half = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    ((center - half).max(0.0), (center + half).min(1.0))
}

/// Student-t interval for a mean with sample standard deviation `sd`
pub fn mean_interval(mean: f64, sd: f64, n: usize, alpha: f64) -> (f64, f64) {
    if is_bad_data(mean) || is_bad_data(sd) || n < 2 {
        return (BAD_DATA, BAD_DATA);
    }
    let t = match StudentsT::new(0.0, 1.0, (n - 1) as f64) {
        Ok(dist) => dist.inverse_cdf(1.0 - alpha / 2.0),
        Err(_) => return (BAD_DATA, BAD_DATA),
    };
    let half = t * sd / (n as f64).sqrt();
    (mean - half, mean + half)
}

/// Chi-square interval for a standard deviation
pub fn stdev_interval(sd: f64, n: usize, alpha: f64) -> (f64, f64) {
    if is_bad_data(sd) || n < 2 {
        return (BAD_DATA, BAD_DATA);
    }
    let dof = (n - 1) as f64;
    let chi = match ChiSquared::new(dof) {
        Ok(dist) => dist,
        Err(_) => return (BAD_DATA, BAD_DATA),
    };
    let var = sd * sd;
    let lo = (dof * var / chi.inverse_cdf(1.0 - alpha / 2.0)).sqrt();
    let hi = (dof * var / chi.inverse_cdf(alpha / 2.0)).sqrt();
    (lo, hi)
}

/// Fisher z-transform interval for a correlation; needs more than 3 pairs
pub fn correlation_interval(r: f64, n: usize, alpha: f64) -> (f64, f64) {
    if is_bad_data(r) || n <= 3 {
        return (BAD_DATA, BAD_DATA);
    }
    // Perfect correlation has a degenerate interval
    if r.abs() >= 1.0 {
        return (r, r);
    }
    let z = r.atanh();
    let half = z_crit(alpha) / ((n - 3) as f64).sqrt();
    ((z - half).tanh(), (z + half).tanh())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_crit() {
        assert!((z_crit(0.05) - 1.959963984540054).abs() < 1e-8);
    }

    #[test]
    fn test_wilson_interval() {
        let (lo, hi) = wilson_interval(0.5, 100.0, 0.05);
        assert!((lo - 0.4038).abs() < 1e-3);
        assert!((hi - 0.5962).abs() < 1e-3);
        let (lo, hi) = wilson_interval(0.0, 10.0, 0.05);
        assert!(lo.abs() < 1e-12);
        assert!(hi > 0.0 && hi < 0.35);
        assert_eq!(wilson_interval(0.5, 0.0, 0.05), (BAD_DATA, BAD_DATA));
    }

    #[test]
    fn test_mean_interval() {
        let (lo, hi) = mean_interval(10.0, 2.0, 25, 0.05);
        // t(0.975, 24) = 2.0639
        assert!((hi - 10.0 - 2.0639 * 0.4).abs() < 1e-3);
        assert!((10.0 - lo - 2.0639 * 0.4).abs() < 1e-3);
        assert_eq!(mean_interval(1.0, 1.0, 1, 0.05), (BAD_DATA, BAD_DATA));
    }

    #[test]
    fn test_stdev_interval_brackets() {
        let (lo, hi) = stdev_interval(2.0, 30, 0.05);
        assert!(lo < 2.0 && hi > 2.0);
    }

    #[test]
    fn test_correlation_interval() {
        let (lo, hi) = correlation_interval(0.5, 50, 0.05);
        assert!(lo < 0.5 && hi > 0.5);
        assert!(lo > 0.0 && hi < 1.0);
        assert_eq!(correlation_interval(0.5, 3, 0.05), (BAD_DATA, BAD_DATA));
        assert_eq!(correlation_interval(1.0, 10, 0.05), (1.0, 1.0));
    }

    #[test]
    fn test_policy_skip_vs_attempt() {
        let alphas = [0.05, 0.1];
        let mut skipped = CiInfo::bad(&alphas);
        skipped.apply_normal(CiPolicy::SkipWhenEstimateBad, |_| (0.0, 1.0));
        assert!(skipped.normal.iter().all(|b| !b.is_valid()));

        let mut attempted = CiInfo::bad(&alphas);
        attempted.apply_normal(CiPolicy::AlwaysAttempt, |_| (0.0, 1.0));
        assert!(attempted.normal.iter().all(|b| b.is_valid()));
        assert_eq!(attempted.normal[1].alpha, 0.1);
    }

    #[test]
    fn test_bounds_normalized() {
        let b = CiBounds::new(0.05, 2.0, 1.0);
        assert_eq!((b.lower, b.upper), (1.0, 2.0));
        assert!(!CiBounds::new(0.05, BAD_DATA, 1.0).is_valid());
    }
}
