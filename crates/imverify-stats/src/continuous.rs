//! Continuous statistics (SL1L2, SAL1L2, CNT)
//!
//! Partial sums are weighted means over valid pairs and aggregate exactly
//! across subsets. CNT adds statistics that need the pairs themselves: rank
//! correlations and error quantiles.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use imverify_core::bad_data::{is_bad_data, safe_div, safe_log, safe_sqrt, BAD_DATA};
use imverify_core::config::{CiPolicy, CntConfig, VerifyConfig};
use imverify_core::ecdf::{rank_with_ties, Ecdf};
use imverify_core::error::VerifyResult;
use imverify_core::pairs::PairStore;
use imverify_core::threshold::{ResolvedThreshold, SetLogic};

use crate::bootstrap::{BootTarget, Resampler};
use crate::ci::{
    attach_bootstrap, correlation_interval, mean_interval, stdev_interval, CiInfo,
};

/// Forecast/observation filtering thresholds applied before continuous statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFilter {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub logic: SetLogic,
}

impl Default for PairFilter {
    fn default() -> Self {
        Self {
            fthresh: ResolvedThreshold::na(),
            othresh: ResolvedThreshold::na(),
            logic: SetLogic::Union,
        }
    }
}

impl PairFilter {
    pub fn new(fthresh: ResolvedThreshold, othresh: ResolvedThreshold, logic: SetLogic) -> Self {
        Self {
            fthresh,
            othresh,
            logic,
        }
    }

    /// Valid pairs selected by the filter
    pub fn apply(&self, pairs: &PairStore) -> PairStore {
        pairs.subset_by_filter(&self.fthresh, &self.othresh, self.logic)
    }
}

/// Weighted means accumulated over a pair subset
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    weight: f64,
    f: f64,
    o: f64,
    fo: f64,
    ff: f64,
    oo: f64,
    abs_err: f64,
}

impl Moments {
    fn from_iter(values: impl Iterator<Item = (f64, f64, f64)>) -> Self {
        let mut m = Moments::default();
        for (f, o, w) in values {
            m.count += 1;
            m.weight += w;
            m.f += w * f;
            m.o += w * o;
            m.fo += w * f * o;
            m.ff += w * f * f;
            m.oo += w * o * o;
            m.abs_err += w * (f - o).abs();
        }
        if m.weight > 0.0 {
            let w = m.weight;
            m.f /= w;
            m.o /= w;
            m.fo /= w;
            m.ff /= w;
            m.oo /= w;
            m.abs_err /= w;
        }
        m
    }
}

/// Merge two weighted means
pub(crate) fn merge_mean(a: f64, wa: f64, b: f64, wb: f64) -> f64 {
    match (wa > 0.0, wb > 0.0) {
        (false, false) => BAD_DATA,
        (true, false) => a,
        (false, true) => b,
        (true, true) => (a * wa + b * wb) / (wa + wb),
    }
}

/// Scalar partial sums (SL1L2) and anomaly partial sums (SAL1L2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sl1l2Info {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub logic: SetLogic,

    pub scount: usize,
    pub sweight: f64,
    pub fbar: f64,
    pub obar: f64,
    pub fobar: f64,
    pub ffbar: f64,
    pub oobar: f64,
    pub mae: f64,

    pub sacount: usize,
    pub saweight: f64,
    pub fabar: f64,
    pub oabar: f64,
    pub foabar: f64,
    pub ffabar: f64,
    pub ooabar: f64,
    pub mae_anom: f64,
}

impl Sl1l2Info {
    fn empty(filter: &PairFilter) -> Self {
        Self {
            fthresh: filter.fthresh.clone(),
            othresh: filter.othresh.clone(),
            logic: filter.logic,
            scount: 0,
            sweight: 0.0,
            fbar: BAD_DATA,
            obar: BAD_DATA,
            fobar: BAD_DATA,
            ffbar: BAD_DATA,
            oobar: BAD_DATA,
            mae: BAD_DATA,
            sacount: 0,
            saweight: 0.0,
            fabar: BAD_DATA,
            oabar: BAD_DATA,
            foabar: BAD_DATA,
            ffabar: BAD_DATA,
            ooabar: BAD_DATA,
            mae_anom: BAD_DATA,
        }
    }

    /// Combine with partial sums from a disjoint subset
    pub fn merge(&self, other: &Sl1l2Info) -> Self {
        let (w1, w2) = (self.sweight, other.sweight);
        let (a1, a2) = (self.saweight, other.saweight);
        Self {
            fthresh: self.fthresh.clone(),
            othresh: self.othresh.clone(),
            logic: self.logic,
            scount: self.scount + other.scount,
            sweight: w1 + w2,
            fbar: merge_mean(self.fbar, w1, other.fbar, w2),
            obar: merge_mean(self.obar, w1, other.obar, w2),
            fobar: merge_mean(self.fobar, w1, other.fobar, w2),
            ffbar: merge_mean(self.ffbar, w1, other.ffbar, w2),
            oobar: merge_mean(self.oobar, w1, other.oobar, w2),
            mae: merge_mean(self.mae, w1, other.mae, w2),
            sacount: self.sacount + other.sacount,
            saweight: a1 + a2,
            fabar: merge_mean(self.fabar, a1, other.fabar, a2),
            oabar: merge_mean(self.oabar, a1, other.oabar, a2),
            foabar: merge_mean(self.foabar, a1, other.foabar, a2),
            ffabar: merge_mean(self.ffabar, a1, other.ffabar, a2),
            ooabar: merge_mean(self.ooabar, a1, other.ooabar, a2),
            mae_anom: merge_mean(self.mae_anom, a1, other.mae_anom, a2),
        }
    }

    /// Mean error
    pub fn me(&self) -> f64 {
        if self.scount == 0 {
            return BAD_DATA;
        }
        self.fbar - self.obar
    }

    /// Mean squared error
    pub fn mse(&self) -> f64 {
        if self.scount == 0 {
            return BAD_DATA;
        }
        self.ffbar - 2.0 * self.fobar + self.oobar
    }

    pub fn rmse(&self) -> f64 {
        safe_sqrt(self.mse().max(0.0))
    }

    /// Bias-corrected mean squared error
    pub fn bcmse(&self) -> f64 {
        if self.scount == 0 {
            return BAD_DATA;
        }
        (self.mse() - self.me() * self.me()).max(0.0)
    }

    /// Pearson correlation from the partial sums
    pub fn pr_corr(&self) -> f64 {
        if self.scount == 0 {
            return BAD_DATA;
        }
        correlation_from_moments(self.fbar, self.obar, self.fobar, self.ffbar, self.oobar)
    }

    /// Centered anomaly correlation from the anomaly partial sums
    pub fn anom_corr(&self) -> f64 {
        if self.sacount == 0 {
            return BAD_DATA;
        }
        correlation_from_moments(self.fabar, self.oabar, self.foabar, self.ffabar, self.ooabar)
    }
}

pub(crate) fn correlation_from_moments(f: f64, o: f64, fo: f64, ff: f64, oo: f64) -> f64 {
    let fvar = ff - f * f;
    let ovar = oo - o * o;
    if fvar <= 0.0 || ovar <= 0.0 {
        return BAD_DATA;
    }
    ((fo - f * o) / (fvar * ovar).sqrt()).clamp(-1.0, 1.0)
}

fn valid_rows(pairs: &PairStore) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
    (0..pairs.len())
        .filter(move |&i| pairs.is_valid_pair(i))
        .map(move |i| (pairs.f()[i], pairs.o()[i], pairs.wgt()[i]))
}

fn anomaly_rows(pairs: &PairStore) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
    (0..pairs.len())
        .filter(move |&i| pairs.is_valid_pair(i) && pairs.has_climo_mean(i))
        .map(move |i| {
            let c = pairs.cmn()[i];
            (pairs.f()[i] - c, pairs.o()[i] - c, pairs.wgt()[i])
        })
}

/// Partial sums over the pairs selected by `filter`
pub fn compute_sl1l2(pairs: &PairStore, filter: &PairFilter) -> Sl1l2Info {
    let sub = filter.apply(pairs);
    let mut info = Sl1l2Info::empty(filter);

    let m = Moments::from_iter(valid_rows(&sub));
    if m.count > 0 && m.weight > 0.0 {
        info.scount = m.count;
        info.sweight = m.weight;
        info.fbar = m.f;
        info.obar = m.o;
        info.fobar = m.fo;
        info.ffbar = m.ff;
        info.oobar = m.oo;
        info.mae = m.abs_err;
    }

    let a = Moments::from_iter(anomaly_rows(&sub));
    if a.count > 0 && a.weight > 0.0 {
        info.sacount = a.count;
        info.saweight = a.weight;
        info.fabar = a.f;
        info.oabar = a.o;
        info.foabar = a.fo;
        info.ffabar = a.ff;
        info.ooabar = a.oo;
        info.mae_anom = a.abs_err;
    }
    debug!(scount = info.scount, sacount = info.sacount, "computed SL1L2");
    info
}

/// Number of derived CNT statistics carrying intervals
pub const CNT_STATS: usize = 30;

/// Fewest valid pairs for a bootstrap interval, in field order
const CNT_MIN_PAIRS: [usize; CNT_STATS] = [
    1, 2, 1, 2, 3, 3, 3, // fbar .. kt_corr
    1, 2, 1, 1, 1, 1, 1, 2, // me .. si
    1, 1, 1, 1, 1, 1, 1, // e10 .. mad
    3, 3, 1, 1, 1, 1, // anom_corr .. msess
    1, 1, // relative_mae, log_bias
];

/// Continuous statistics for one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CntInfo {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub logic: SetLogic,
    pub alpha: Vec<f64>,
    /// Valid pairs used
    pub total: usize,
    /// Pairs entering the rank correlations
    pub ranks: usize,
    pub frank_ties: usize,
    pub orank_ties: usize,

    pub fbar: CiInfo,
    pub fstdev: CiInfo,
    pub obar: CiInfo,
    pub ostdev: CiInfo,
    pub pr_corr: CiInfo,
    pub sp_corr: CiInfo,
    pub kt_corr: CiInfo,
    pub me: CiInfo,
    pub estdev: CiInfo,
    pub mbias: CiInfo,
    pub mae: CiInfo,
    pub mse: CiInfo,
    pub bcmse: CiInfo,
    pub rmse: CiInfo,
    pub si: CiInfo,
    pub e10: CiInfo,
    pub e25: CiInfo,
    pub e50: CiInfo,
    pub e75: CiInfo,
    pub e90: CiInfo,
    pub eiqr: CiInfo,
    pub mad: CiInfo,
    pub anom_corr: CiInfo,
    pub anom_corr_uncntr: CiInfo,
    pub rmsfa: CiInfo,
    pub rmsoa: CiInfo,
    pub me2: CiInfo,
    pub msess: CiInfo,
    /// MAE relative to the observed mean, precipitation only
    pub relative_mae: CiInfo,
    /// ln(FBAR / OBAR), precipitation only
    pub log_bias: CiInfo,
}

impl CntInfo {
    fn fields_mut(&mut self) -> Vec<&mut CiInfo> {
        vec![
            &mut self.fbar,
            &mut self.fstdev,
            &mut self.obar,
            &mut self.ostdev,
            &mut self.pr_corr,
            &mut self.sp_corr,
            &mut self.kt_corr,
            &mut self.me,
            &mut self.estdev,
            &mut self.mbias,
            &mut self.mae,
            &mut self.mse,
            &mut self.bcmse,
            &mut self.rmse,
            &mut self.si,
            &mut self.e10,
            &mut self.e25,
            &mut self.e50,
            &mut self.e75,
            &mut self.e90,
            &mut self.eiqr,
            &mut self.mad,
            &mut self.anom_corr,
            &mut self.anom_corr_uncntr,
            &mut self.rmsfa,
            &mut self.rmsoa,
            &mut self.me2,
            &mut self.msess,
            &mut self.relative_mae,
            &mut self.log_bias,
        ]
    }
}

/// Point estimates for CNT, in field order
#[derive(Debug, Clone, PartialEq)]
pub struct CntEstimates {
    pub values: [f64; CNT_STATS],
    pub total: usize,
    pub anom_total: usize,
    pub ranks: usize,
    pub frank_ties: usize,
    pub orank_ties: usize,
}

pub(crate) fn stdev_from_var(var: f64, n: usize) -> f64 {
    if n < 2 || is_bad_data(var) {
        return BAD_DATA;
    }
    (var.max(0.0) * n as f64 / (n - 1) as f64).sqrt()
}

/// Compute CNT estimates over the valid pairs of `pairs`
pub fn cnt_estimates(pairs: &PairStore, options: &CntConfig) -> CntEstimates {
    let mut v = [BAD_DATA; CNT_STATS];
    let m = Moments::from_iter(valid_rows(pairs));
    let n = m.count;
    let mut out = CntEstimates {
        values: v,
        total: n,
        anom_total: 0,
        ranks: 0,
        frank_ties: 0,
        orank_ties: 0,
    };
    if n == 0 || m.weight <= 0.0 {
        return out;
    }

    let fvar = m.ff - m.f * m.f;
    let ovar = m.oo - m.o * m.o;
    let me = m.f - m.o;
    let mse = m.ff - 2.0 * m.fo + m.oo;
    let evar = mse - me * me;

    v[0] = m.f;
    v[1] = stdev_from_var(fvar, n);
    v[2] = m.o;
    v[3] = stdev_from_var(ovar, n);
    v[4] = correlation_from_moments(m.f, m.o, m.fo, m.ff, m.oo);
    v[7] = me;
    v[8] = stdev_from_var(evar, n);
    v[9] = safe_div(m.f, m.o);
    v[10] = m.abs_err;
    v[11] = mse.max(0.0);
    v[12] = evar.max(0.0);
    v[13] = mse.max(0.0).sqrt();
    v[14] = safe_div(v[8], m.o);

    let (fv, ov): (Vec<f64>, Vec<f64>) = valid_rows(pairs).map(|(f, o, _)| (f, o)).unzip();
    let errors: Vec<f64> = fv.iter().zip(&ov).map(|(f, o)| f - o).collect();
    let ecdf = Ecdf::from_data(&errors);
    v[15] = ecdf.percentile(0.10);
    v[16] = ecdf.percentile(0.25);
    v[17] = ecdf.percentile(0.50);
    v[18] = ecdf.percentile(0.75);
    v[19] = ecdf.percentile(0.90);
    v[20] = v[18] - v[16];
    let abs_dev: Vec<f64> = errors.iter().map(|e| (e - v[17]).abs()).collect();
    v[21] = Ecdf::from_data(&abs_dev).median();

    let a = Moments::from_iter(anomaly_rows(pairs));
    out.anom_total = a.count;
    if a.count > 0 && a.weight > 0.0 {
        v[22] = correlation_from_moments(a.f, a.o, a.fo, a.ff, a.oo);
        v[23] = if a.ff > 0.0 && a.oo > 0.0 {
            (a.fo / (a.ff * a.oo).sqrt()).clamp(-1.0, 1.0)
        } else {
            BAD_DATA
        };
        v[24] = a.ff.sqrt();
        v[25] = a.oo.sqrt();
    }

    v[26] = me * me;
    v[27] = if ovar > 0.0 { 1.0 - mse / ovar } else { BAD_DATA };

    if options.precip {
        v[28] = safe_div(m.abs_err, m.o);
        v[29] = safe_log(safe_div(m.f, m.o));
    }

    if options.rank_corr {
        let (rf, ro): (Vec<f64>, Vec<f64>) = fv
            .iter()
            .zip(&ov)
            .filter(|(f, o)| !(options.precip && **f == 0.0 && **o == 0.0))
            .map(|(f, o)| (*f, *o))
            .unzip();
        out.ranks = rf.len();
        if rf.len() >= 2 {
            let (franks, fties) = rank_with_ties(&rf);
            let (oranks, oties) = rank_with_ties(&ro);
            out.frank_ties = fties;
            out.orank_ties = oties;
            v[5] = pearson(&franks, &oranks);
            v[6] = kendall_tau_b(&rf, &ro);
        }
    }

    out.values = v;
    out
}

/// Unweighted Pearson correlation
fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if x.len() < 2 {
        return BAD_DATA;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return BAD_DATA;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Kendall tau-b by Knight's O(n log n) algorithm
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 || y.len() != n {
        return BAD_DATA;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]).then(y[a].total_cmp(&y[b])));

    let tied_pairs = |run: u64| run * run.saturating_sub(1) / 2;

    // ties in x, and joint ties in (x, y)
    let (mut x_ties, mut xy_ties) = (0u64, 0u64);
    let (mut run_x, mut run_xy) = (1u64, 1u64);
    for w in order.windows(2) {
        let (a, b) = (w[0], w[1]);
        if x[a] == x[b] {
            run_x += 1;
            if y[a] == y[b] {
                run_xy += 1;
            } else {
                xy_ties += tied_pairs(run_xy);
                run_xy = 1;
            }
        } else {
            x_ties += tied_pairs(run_x);
            xy_ties += tied_pairs(run_xy);
            run_x = 1;
            run_xy = 1;
        }
    }
    x_ties += tied_pairs(run_x);
    xy_ties += tied_pairs(run_xy);

    let mut ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();
    let swaps = merge_sort_swaps(&mut ys);

    let mut y_ties = 0u64;
    let mut run_y = 1u64;
    for w in ys.windows(2) {
        if w[0] == w[1] {
            run_y += 1;
        } else {
            y_ties += tied_pairs(run_y);
            run_y = 1;
        }
    }
    y_ties += tied_pairs(run_y);

    let n0 = tied_pairs(n as u64) as f64;
    let (n1, n2, n3) = (x_ties as f64, y_ties as f64, xy_ties as f64);
    let denom = ((n0 - n1) * (n0 - n2)).sqrt();
    if denom <= 0.0 {
        return BAD_DATA;
    }
    ((n0 - n1 - n2 + n3 - 2.0 * swaps as f64) / denom).clamp(-1.0, 1.0)
}

/// Sort in place, returning the number of strict inversions
fn merge_sort_swaps(v: &mut [f64]) -> u64 {
    let n = v.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = merge_sort_swaps(&mut v[..mid]) + merge_sort_swaps(&mut v[mid..]);
    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if v[j] < v[i] {
            merged.push(v[j]);
            swaps += (mid - i) as u64;
            j += 1;
        } else {
            merged.push(v[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&v[i..mid]);
    merged.extend_from_slice(&v[j..]);
    v.copy_from_slice(&merged);
    swaps
}

fn apply_cnt_normal_ci(info: &mut CntInfo, n: usize, n_anom: usize, policy: CiPolicy) {
    let fsd = info.fstdev.estimate;
    let osd = info.ostdev.estimate;
    let esd = info.estdev.estimate;

    let mean = |ci: &mut CiInfo, sd: f64| {
        let v = ci.estimate;
        ci.apply_normal(policy, |a| mean_interval(v, sd, n, a));
    };
    mean(&mut info.fbar, fsd);
    mean(&mut info.obar, osd);
    mean(&mut info.me, esd);

    let stdev = |ci: &mut CiInfo| {
        let v = ci.estimate;
        ci.apply_normal(policy, |a| stdev_interval(v, n, a));
    };
    stdev(&mut info.fstdev);
    stdev(&mut info.ostdev);
    stdev(&mut info.estdev);

    let r = info.pr_corr.estimate;
    info.pr_corr
        .apply_normal(policy, |a| correlation_interval(r, n, a));
    let ra = info.anom_corr.estimate;
    info.anom_corr
        .apply_normal(policy, |a| correlation_interval(ra, n_anom, a));
}

/// Continuous statistics over the pairs selected by `filter`
pub fn compute_cnt<R: Rng + ?Sized>(
    pairs: &PairStore,
    filter: &PairFilter,
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<CntInfo> {
    config.validate()?;
    let sub = filter.apply(pairs);
    debug!(
        n_pairs = pairs.len(),
        n_selected = sub.len(),
        precip = config.cnt.precip,
        "computing CNT"
    );

    let est = cnt_estimates(&sub, &config.cnt);
    let alpha = &config.ci.alpha;
    let ci = |k: usize| CiInfo::new(est.values[k], alpha);
    let mut info = CntInfo {
        fthresh: filter.fthresh.clone(),
        othresh: filter.othresh.clone(),
        logic: filter.logic,
        alpha: alpha.clone(),
        total: est.total,
        ranks: est.ranks,
        frank_ties: est.frank_ties,
        orank_ties: est.orank_ties,
        fbar: ci(0),
        fstdev: ci(1),
        obar: ci(2),
        ostdev: ci(3),
        pr_corr: ci(4),
        sp_corr: ci(5),
        kt_corr: ci(6),
        me: ci(7),
        estdev: ci(8),
        mbias: ci(9),
        mae: ci(10),
        mse: ci(11),
        bcmse: ci(12),
        rmse: ci(13),
        si: ci(14),
        e10: ci(15),
        e25: ci(16),
        e50: ci(17),
        e75: ci(18),
        e90: ci(19),
        eiqr: ci(20),
        mad: ci(21),
        anom_corr: ci(22),
        anom_corr_uncntr: ci(23),
        rmsfa: ci(24),
        rmsoa: ci(25),
        me2: ci(26),
        msess: ci(27),
        relative_mae: ci(28),
        log_bias: ci(29),
    };

    if config.ci.normal {
        apply_cnt_normal_ci(&mut info, est.total, est.anom_total, config.ci.policy);
    }

    if config.ci.bootstrap.n_rep > 0 {
        let targets: Vec<BootTarget> = est
            .values
            .iter()
            .zip(CNT_MIN_PAIRS)
            .map(|(&v, min)| BootTarget::new(v, min))
            .collect();
        let options = config.cnt.clone();
        let bounds = Resampler::new(&config.ci).run(&sub, &targets, rng, |p| {
            cnt_estimates(p, &options).values.to_vec()
        })?;
        attach_bootstrap(info.fields_mut(), bounds);
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::seeded_rng;
    use imverify_core::threshold::Threshold;

    fn no_boot() -> VerifyConfig {
        let mut config = VerifyConfig::default();
        config.ci.bootstrap.n_rep = 0;
        config.cnt.rank_corr = true;
        config
    }

    #[test]
    fn test_scenario_me_rmse_corr() {
        let pairs = PairStore::new(vec![2.0, 4.0, 6.0], vec![1.0, 3.0, 5.0]).unwrap();
        let cnt = compute_cnt(&pairs, &PairFilter::default(), &no_boot(), &mut seeded_rng(1)).unwrap();
        assert_eq!(cnt.total, 3);
        assert!((cnt.me.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.rmse.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.pr_corr.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.sp_corr.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.kt_corr.estimate - 1.0).abs() < 1e-12);
        assert!(cnt.bcmse.estimate.abs() < 1e-12);
        // Fisher z needs more than 3 pairs
        assert!(!cnt.pr_corr.normal[0].is_valid());
        // no climatology
        assert_eq!(cnt.anom_corr.estimate, BAD_DATA);
    }

    #[test]
    fn test_sl1l2_matches_cnt() {
        let pairs = PairStore::new(vec![2.0, 4.0, 6.0, 3.0], vec![1.0, 3.0, 5.0, 4.0]).unwrap();
        let sl = compute_sl1l2(&pairs, &PairFilter::default());
        let cnt = compute_cnt(&pairs, &PairFilter::default(), &no_boot(), &mut seeded_rng(1)).unwrap();
        assert_eq!(sl.scount, 4);
        assert!((sl.me() - cnt.me.estimate).abs() < 1e-12);
        assert!((sl.mse() - cnt.mse.estimate).abs() < 1e-12);
        assert!((sl.pr_corr() - cnt.pr_corr.estimate).abs() < 1e-12);
        assert!((sl.mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sl1l2_merge_is_exact() {
        let a = PairStore::new(vec![1.0, 2.0], vec![0.0, 2.5]).unwrap();
        let b = PairStore::new(vec![5.0, 7.0, 3.0], vec![4.0, 8.0, 3.0]).unwrap();
        let filter = PairFilter::default();
        let merged = compute_sl1l2(&a, &filter).merge(&compute_sl1l2(&b, &filter));
        let whole = compute_sl1l2(&a.concat(&b), &filter);
        assert_eq!(merged.scount, whole.scount);
        assert!((merged.fbar - whole.fbar).abs() < 1e-12);
        assert!((merged.fobar - whole.fobar).abs() < 1e-12);
        assert!((merged.mae - whole.mae).abs() < 1e-12);
    }

    #[test]
    fn test_filter_subsets_pairs() {
        let pairs = PairStore::new(vec![0.0, 1.0, 5.0, 6.0], vec![0.0, 2.0, 5.0, 7.0]).unwrap();
        let ge5 = Threshold::ge(5.0).resolve_fixed().unwrap();
        let filter = PairFilter::new(ge5.clone(), ge5, SetLogic::Intersection);
        let sl = compute_sl1l2(&pairs, &filter);
        assert_eq!(sl.scount, 2);
        assert!((sl.fbar - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_subset_is_bad() {
        let pairs = PairStore::new(vec![1.0, 2.0], vec![1.0, 2.0]).unwrap();
        let none = Threshold::gt(100.0).resolve_fixed().unwrap();
        let filter = PairFilter::new(none.clone(), none, SetLogic::Union);
        let mut config = no_boot();
        config.ci.bootstrap.n_rep = 10;
        let cnt = compute_cnt(&pairs, &filter, &config, &mut seeded_rng(1)).unwrap();
        assert_eq!(cnt.total, 0);
        assert_eq!(cnt.me.estimate, BAD_DATA);
        assert!(!cnt.me.bootstrap[0].is_valid());
    }

    #[test]
    fn test_anomaly_stats() {
        let pairs = PairStore::builder(vec![1.0, 2.0, 4.0, 3.0, 6.0], vec![1.5, 2.0, 3.5, 3.0, 5.0])
            .climo(vec![2.0; 5], vec![1.0; 5])
            .build()
            .unwrap();
        let cnt = compute_cnt(&pairs, &PairFilter::default(), &no_boot(), &mut seeded_rng(1)).unwrap();
        assert!(cnt.anom_corr.estimate > 0.9);
        assert!(cnt.anom_corr_uncntr.estimate > 0.9);
        assert!(cnt.anom_corr.normal[0].is_valid());
        assert!(cnt.rmsfa.estimate > cnt.rmsoa.estimate);
    }

    #[test]
    fn test_precip_terms() {
        let pairs = PairStore::new(vec![0.0, 0.0, 2.0, 4.0], vec![0.0, 1.0, 1.0, 2.0]).unwrap();
        let mut config = no_boot();
        config.cnt.precip = true;
        let cnt = compute_cnt(&pairs, &PairFilter::default(), &config, &mut seeded_rng(1)).unwrap();
        assert_eq!(cnt.ranks, 3);
        assert!((cnt.relative_mae.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.log_bias.estimate - (1.5f64 / 1.0).ln()).abs() < 1e-12);

        config.cnt.precip = false;
        let cnt = compute_cnt(&pairs, &PairFilter::default(), &config, &mut seeded_rng(1)).unwrap();
        assert_eq!(cnt.ranks, 4);
        assert_eq!(cnt.log_bias.estimate, BAD_DATA);
    }

    #[test]
    fn test_kendall_with_ties() {
        // C = 5, D = 0, one tie in x
        let x = [1.0, 2.0, 2.0, 3.0];
        let y = [1.0, 3.0, 2.0, 4.0];
        let tau = kendall_tau_b(&x, &y);
        assert!((tau - 5.0 / (5.0f64 * 6.0).sqrt()).abs() < 1e-12);
        let rev = [4.0, 3.0, 2.0, 1.0];
        assert!((kendall_tau_b(&[1.0, 2.0, 3.0, 4.0], &rev) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cnt_bootstrap_reproducible() {
        let f: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin() * 3.0).collect();
        let o: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin() * 2.5 + 0.3).collect();
        let pairs = PairStore::new(f, o).unwrap();
        let mut config = VerifyConfig::default();
        config.ci.bootstrap.n_rep = 50;
        let a = compute_cnt(&pairs, &PairFilter::default(), &config, &mut seeded_rng(8)).unwrap();
        let b = compute_cnt(&pairs, &PairFilter::default(), &config, &mut seeded_rng(8)).unwrap();
        assert_eq!(a, b);
        assert!(a.rmse.bootstrap[0].is_valid());
    }
}
