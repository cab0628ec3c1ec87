//! Contingency tables
//!
//! Rows are forecast categories, columns observed categories. Every derived
//! score returns [`BAD_DATA`] instead of dividing by zero or taking the log of
//! a non-positive number.

use serde::{Deserialize, Serialize};

use crate::bad_data::{is_bad_data, safe_div, safe_log, BAD_DATA};
use crate::dist::lambert_w;
use crate::error::{PreconditionError, VerifyResult};

/// 2x2 contingency table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoByTwoTable {
    /// Hits
    pub fy_oy: u64,
    /// False alarms
    pub fy_on: u64,
    /// Misses
    pub fn_oy: u64,
    /// Correct negatives
    pub fn_on: u64,
}

impl TwoByTwoTable {
    pub fn new(fy_oy: u64, fy_on: u64, fn_oy: u64, fn_on: u64) -> Self {
        Self {
            fy_oy,
            fy_on,
            fn_oy,
            fn_on,
        }
    }

    /// Add one classified pair
    #[inline]
    pub fn add(&mut self, fy: bool, oy: bool) {
        match (fy, oy) {
            (true, true) => self.fy_oy += 1,
            (true, false) => self.fy_on += 1,
            (false, true) => self.fn_oy += 1,
            (false, false) => self.fn_on += 1,
        }
    }

    /// Cell-wise sum
    pub fn merge(&self, other: &TwoByTwoTable) -> Self {
        Self {
            fy_oy: self.fy_oy + other.fy_oy,
            fy_on: self.fy_on + other.fy_on,
            fn_oy: self.fn_oy + other.fn_oy,
            fn_on: self.fn_on + other.fn_on,
        }
    }

    pub fn total(&self) -> u64 {
        self.fy_oy + self.fy_on + self.fn_oy + self.fn_on
    }

    /// Forecast yes count
    pub fn fy(&self) -> u64 {
        self.fy_oy + self.fy_on
    }

    /// Observed yes count
    pub fn oy(&self) -> u64 {
        self.fy_oy + self.fn_oy
    }

    /// Forecast no count
    pub fn fno(&self) -> u64 {
        self.fn_oy + self.fn_on
    }

    /// Observed no count
    pub fn on(&self) -> u64 {
        self.fy_on + self.fn_on
    }

    fn cells(&self) -> (f64, f64, f64, f64, f64) {
        (
            self.fy_oy as f64,
            self.fy_on as f64,
            self.fn_oy as f64,
            self.fn_on as f64,
            self.total() as f64,
        )
    }

    /// Base rate (observed event frequency)
    pub fn base_rate(&self) -> f64 {
        safe_div(self.oy() as f64, self.total() as f64)
    }

    /// Forecast mean (forecast event frequency)
    pub fn fmean(&self) -> f64 {
        safe_div(self.fy() as f64, self.total() as f64)
    }

    /// Accuracy
    pub fn accuracy(&self) -> f64 {
        safe_div((self.fy_oy + self.fn_on) as f64, self.total() as f64)
    }

    /// Frequency bias
    pub fn fbias(&self) -> f64 {
        safe_div(self.fy() as f64, self.oy() as f64)
    }

    /// Probability of detecting yes (hit rate)
    pub fn pody(&self) -> f64 {
        safe_div(self.fy_oy as f64, self.oy() as f64)
    }

    /// Probability of detecting no
    pub fn podn(&self) -> f64 {
        safe_div(self.fn_on as f64, self.on() as f64)
    }

    /// Probability of false detection
    pub fn pofd(&self) -> f64 {
        safe_div(self.fy_on as f64, self.on() as f64)
    }

    /// False alarm ratio
    pub fn far(&self) -> f64 {
        safe_div(self.fy_on as f64, self.fy() as f64)
    }

    /// Critical success index
    pub fn csi(&self) -> f64 {
        safe_div(
            self.fy_oy as f64,
            (self.fy_oy + self.fy_on + self.fn_oy) as f64,
        )
    }

    /// Gilbert skill score (equitable threat score)
    pub fn gss(&self) -> f64 {
        let (a, b, c, _, n) = self.cells();
        if n == 0.0 {
            return BAD_DATA;
        }
        let chance = (a + b) * (a + c) / n;
        safe_div(a - chance, a + b + c - chance)
    }

    /// Heidke skill score
    pub fn hss(&self) -> f64 {
        let (a, b, c, d, n) = self.cells();
        if n == 0.0 {
            return BAD_DATA;
        }
        let expected = ((a + b) * (a + c) + (c + d) * (b + d)) / n;
        safe_div(a + d - expected, n - expected)
    }

    /// Heidke skill score against a fixed expected-correct fraction
    pub fn hss_ec(&self, ec_value: f64) -> f64 {
        let (a, _, _, d, n) = self.cells();
        if n == 0.0 || is_bad_data(ec_value) {
            return BAD_DATA;
        }
        let expected = n * ec_value;
        safe_div(a + d - expected, n - expected)
    }

    /// Hanssen-Kuipers discriminant
    pub fn hk(&self) -> f64 {
        let pody = self.pody();
        let pofd = self.pofd();
        if is_bad_data(pody) || is_bad_data(pofd) {
            return BAD_DATA;
        }
        pody - pofd
    }

    /// Odds ratio
    pub fn odds_ratio(&self) -> f64 {
        let (a, b, c, d, _) = self.cells();
        safe_div(a * d, b * c)
    }

    /// Natural log of the odds ratio
    pub fn log_odds(&self) -> f64 {
        let (a, b, c, d, _) = self.cells();
        let parts = [safe_log(a), safe_log(b), safe_log(c), safe_log(d)];
        if parts.iter().any(|v| is_bad_data(*v)) {
            return BAD_DATA;
        }
        parts[0] + parts[3] - parts[1] - parts[2]
    }

    /// Odds ratio skill score (Yule's Q)
    pub fn orss(&self) -> f64 {
        let (a, b, c, d, _) = self.cells();
        safe_div(a * d - b * c, a * d + b * c)
    }

    /// Extreme dependency score
    pub fn eds(&self) -> f64 {
        let (a, _, c, _, n) = self.cells();
        let lp = safe_log(safe_div(a + c, n));
        let lh = safe_log(safe_div(a, n));
        if is_bad_data(lp) || is_bad_data(lh) {
            return BAD_DATA;
        }
        let v = safe_div(2.0 * lp, lh);
        if is_bad_data(v) {
            BAD_DATA
        } else {
            v - 1.0
        }
    }

    /// Symmetric extreme dependency score
    pub fn seds(&self) -> f64 {
        let (a, b, c, _, n) = self.cells();
        let lq = safe_log(safe_div(a + b, n));
        let lp = safe_log(safe_div(a + c, n));
        let lh = safe_log(safe_div(a, n));
        if is_bad_data(lq) || is_bad_data(lp) || is_bad_data(lh) {
            return BAD_DATA;
        }
        let v = safe_div(lq + lp, lh);
        if is_bad_data(v) {
            BAD_DATA
        } else {
            v - 1.0
        }
    }

    /// Extremal dependence index
    pub fn edi(&self) -> f64 {
        let lf = safe_log(self.pofd());
        let lh = safe_log(self.pody());
        if is_bad_data(lf) || is_bad_data(lh) {
            return BAD_DATA;
        }
        safe_div(lf - lh, lf + lh)
    }

    /// Symmetric extremal dependence index
    pub fn sedi(&self) -> f64 {
        let f = self.pofd();
        let h = self.pody();
        if is_bad_data(f) || is_bad_data(h) {
            return BAD_DATA;
        }
        let lf = safe_log(f);
        let lh = safe_log(h);
        let l1f = safe_log(1.0 - f);
        let l1h = safe_log(1.0 - h);
        if [lf, lh, l1f, l1h].iter().any(|v| is_bad_data(*v)) {
            return BAD_DATA;
        }
        safe_div(lf - lh - l1f + l1h, lf + lh + l1f + l1h)
    }

    /// Bias-adjusted Gilbert skill score
    ///
    /// Hits are adjusted to the count expected for an unbiased forecast with
    /// the same false-alarm/hit trade-off, then scored like GSS.
    pub fn bagss(&self) -> f64 {
        let (h, _, _, _, n) = self.cells();
        let f = self.fy() as f64;
        let o = self.oy() as f64;
        let false_alarms = f - h;
        let misses = o - h;
        if n == 0.0 || f == 0.0 || o == 0.0 || false_alarms <= 0.0 || misses <= 0.0 {
            return BAD_DATA;
        }
        let lf = (o / misses).ln();
        let w = lambert_w(o / false_alarms * lf);
        if is_bad_data(w) {
            return BAD_DATA;
        }
        let ha = o - false_alarms / lf * w;
        let chance = o * o / n;
        safe_div(ha - chance, 2.0 * o - ha - chance)
    }
}

/// N x N contingency table for multi-category verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NxNTable {
    n_cat: usize,
    /// Row-major counts; row = forecast category
    cells: Vec<u64>,
}

impl NxNTable {
    /// Create an empty table with `n_cat` categories (at least 2)
    pub fn new(n_cat: usize) -> VerifyResult<Self> {
        if n_cat < 2 {
            return Err(PreconditionError::NonCoveringThresholds {
                message: format!("a multi-category table needs at least 2 categories, got {n_cat}"),
            }
            .into());
        }
        Ok(Self {
            n_cat,
            cells: vec![0; n_cat * n_cat],
        })
    }

    pub fn n_cat(&self) -> usize {
        self.n_cat
    }

    /// Count for forecast category `f` and observed category `o`
    pub fn entry(&self, f: usize, o: usize) -> u64 {
        self.cells[f * self.n_cat + o]
    }

    pub fn increment(&mut self, f: usize, o: usize) {
        self.cells[f * self.n_cat + o] += 1;
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().sum()
    }

    /// Forecast category totals
    pub fn row_totals(&self) -> Vec<u64> {
        (0..self.n_cat)
            .map(|r| (0..self.n_cat).map(|c| self.entry(r, c)).sum())
            .collect()
    }

    /// Observed category totals
    pub fn col_totals(&self) -> Vec<u64> {
        (0..self.n_cat)
            .map(|c| (0..self.n_cat).map(|r| self.entry(r, c)).sum())
            .collect()
    }

    /// Full matrix, row = forecast category
    pub fn matrix(&self) -> Vec<Vec<u64>> {
        self.cells.chunks(self.n_cat).map(|r| r.to_vec()).collect()
    }

    /// Fraction on the diagonal
    pub fn accuracy(&self) -> f64 {
        let diag: u64 = (0..self.n_cat).map(|i| self.entry(i, i)).sum();
        safe_div(diag as f64, self.total() as f64)
    }

    fn marginal_fractions(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let n = self.total() as f64;
        if n == 0.0 {
            return None;
        }
        let pf = self.row_totals().iter().map(|&v| v as f64 / n).collect();
        let po = self.col_totals().iter().map(|&v| v as f64 / n).collect();
        Some((pf, po))
    }

    /// Hanssen-Kuipers discriminant
    pub fn hk(&self) -> f64 {
        let Some((pf, po)) = self.marginal_fractions() else {
            return BAD_DATA;
        };
        let chance: f64 = pf.iter().zip(&po).map(|(a, b)| a * b).sum();
        let oo: f64 = po.iter().map(|p| p * p).sum();
        safe_div(self.accuracy() - chance, 1.0 - oo)
    }

    /// Heidke skill score
    pub fn hss(&self) -> f64 {
        let Some((pf, po)) = self.marginal_fractions() else {
            return BAD_DATA;
        };
        let chance: f64 = pf.iter().zip(&po).map(|(a, b)| a * b).sum();
        safe_div(self.accuracy() - chance, 1.0 - chance)
    }

    /// Heidke skill score against a fixed expected-correct fraction
    ///
    /// `None` uses 1 / N.
    pub fn hss_ec(&self, ec_value: Option<f64>) -> f64 {
        if self.total() == 0 {
            return BAD_DATA;
        }
        let ec = ec_value.unwrap_or(1.0 / self.n_cat as f64);
        safe_div(self.accuracy() - ec, 1.0 - ec)
    }

    /// Gerrity score
    pub fn gerrity(&self) -> f64 {
        let Some((_, po)) = self.marginal_fractions() else {
            return BAD_DATA;
        };
        let k = self.n_cat;
        // a_r, r = 0..k-2, from cumulative observed fractions
        let mut cum = 0.0;
        let mut odds = Vec::with_capacity(k - 1);
        for p in po.iter().take(k - 1) {
            cum += p;
            if cum <= 0.0 || cum >= 1.0 {
                return BAD_DATA;
            }
            odds.push((1.0 - cum) / cum);
        }

        let b = 1.0 / (k as f64 - 1.0);
        let n = self.total() as f64;
        let mut score = 0.0;
        for i in 0..k {
            for j in 0..k {
                let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
                let inv_sum: f64 = odds[..lo].iter().map(|a| 1.0 / a).sum();
                let sum: f64 = odds[hi..].iter().sum();
                let s = b * (inv_sum + sum - (hi - lo) as f64);
                score += s * self.entry(i, j) as f64 / n;
            }
        }
        score
    }

    /// Collapse to a 2x2 table for category `cat` versus all others
    pub fn collapse(&self, cat: usize) -> TwoByTwoTable {
        let mut t = TwoByTwoTable::default();
        for f in 0..self.n_cat {
            for o in 0..self.n_cat {
                let count = self.entry(f, o);
                match (f == cat, o == cat) {
                    (true, true) => t.fy_oy += count,
                    (true, false) => t.fy_on += count,
                    (false, true) => t.fn_oy += count,
                    (false, false) => t.fn_on += count,
                }
            }
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_table() {
        let t = TwoByTwoTable::new(2, 1, 0, 2);
        assert_eq!(t.total(), 5);
        assert!((t.pody() - 1.0).abs() < 1e-12);
        assert!((t.far() - 1.0 / 3.0).abs() < 1e-12);
        assert!((t.base_rate() - 0.4).abs() < 1e-12);
        assert!((t.accuracy() - 0.8).abs() < 1e-12);
        assert!((t.pofd() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_denominators() {
        let t = TwoByTwoTable::new(0, 0, 0, 5);
        assert_eq!(t.csi(), BAD_DATA);
        assert_eq!(t.pody(), BAD_DATA);
        assert_eq!(t.far(), BAD_DATA);
        assert_eq!(t.odds_ratio(), BAD_DATA);
        assert_eq!(t.log_odds(), BAD_DATA);
        assert_eq!(TwoByTwoTable::default().accuracy(), BAD_DATA);
    }

    #[test]
    fn test_skill_scores() {
        // Classic Finley tornado table
        let t = TwoByTwoTable::new(28, 72, 23, 2680);
        assert!((t.gss() - 0.216).abs() < 1e-3);
        assert!((t.hss() - 0.355).abs() < 1e-3);
        assert!((t.hk() - (28.0 / 51.0 - 72.0 / 2752.0)).abs() < 1e-12);
        let or = t.odds_ratio();
        assert!((t.log_odds() - or.ln()).abs() < 1e-9);
        assert!((t.orss() - (or - 1.0) / (or + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_forecast_bagss() {
        // No false alarms: bias adjustment is undefined
        let t = TwoByTwoTable::new(10, 0, 0, 90);
        assert_eq!(t.bagss(), BAD_DATA);
        let t = TwoByTwoTable::new(10, 5, 5, 80);
        let v = t.bagss();
        assert!(v > 0.0 && v < 1.0);
    }

    #[test]
    fn test_unbiased_bagss_matches_gss() {
        // With F == O the adjustment leaves hits unchanged
        let t = TwoByTwoTable::new(20, 10, 10, 60);
        assert!((t.bagss() - t.gss()).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_dependency() {
        let t = TwoByTwoTable::new(10, 5, 5, 80);
        for v in [t.eds(), t.seds(), t.edi(), t.sedi()] {
            assert!(v > -1.0 && v <= 1.0);
        }
    }

    #[test]
    fn test_nxn_table() {
        let mut t = NxNTable::new(3).unwrap();
        for (f, o) in [(0, 0), (1, 1), (2, 2), (0, 1), (2, 2)] {
            t.increment(f, o);
        }
        assert_eq!(t.total(), 5);
        assert_eq!(t.row_totals(), vec![2, 1, 2]);
        assert_eq!(t.col_totals(), vec![1, 2, 2]);
        assert!((t.accuracy() - 0.8).abs() < 1e-12);
        assert_eq!(t.collapse(2), TwoByTwoTable::new(2, 0, 0, 3));
        assert!(NxNTable::new(1).is_err());
    }

    #[test]
    fn test_gerrity_perfect() {
        let mut t = NxNTable::new(3).unwrap();
        for (i, count) in [3, 4, 5].iter().enumerate() {
            for _ in 0..*count {
                t.increment(i, i);
            }
        }
        assert!((t.gerrity() - 1.0).abs() < 1e-12);
        assert!((t.hk() - 1.0).abs() < 1e-12);
        assert!((t.hss() - 1.0).abs() < 1e-12);
    }
}
