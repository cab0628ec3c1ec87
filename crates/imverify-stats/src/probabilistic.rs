//! Probabilistic statistics (PCT, PSTD, PJC, PRC)
//!
//! Forecast probabilities are bucketed into bins bounded by probability
//! thresholds; each bin counts events and non-events for one observation
//! threshold. The bin midpoint stands in for the forecast probabilities of
//! every pair in the bin, so the Brier score decomposes exactly into
//! reliability, resolution and uncertainty.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use imverify_core::bad_data::{is_bad_data, is_valid, safe_div, BAD_DATA};
use imverify_core::config::{CiConfig, VerifyConfig};
use imverify_core::dist::normal_cdf;
use imverify_core::error::{PreconditionError, VerifyResult};
use imverify_core::pairs::PairStore;
use imverify_core::threshold::{CompareOp, ResolvedThreshold, Threshold};

use crate::bootstrap::{BootTarget, Resampler};
use crate::ci::{attach_bootstrap, normal_interval, wilson_interval, CiInfo};

/// Probability bin boundaries starting at 0 and ending at 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbBins {
    edges: Vec<f64>,
}

impl ProbBins {
    pub fn new(edges: &[f64]) -> VerifyResult<Self> {
        let describe = || {
            edges
                .iter()
                .map(|e| format!("{e}"))
                .collect::<Vec<_>>()
                .join(",")
        };
        let (first, last) = match (edges.first(), edges.last()) {
            (Some(&a), Some(&b)) if edges.len() >= 2 => (a, b),
            _ => {
                return Err(PreconditionError::IncompatibleProbThreshold {
                    thresh: describe(),
                    message: "at least two probability thresholds are required".to_string(),
                }
                .into())
            }
        };
        if first != 0.0 || last != 1.0 {
            return Err(PreconditionError::IncompatibleProbThreshold {
                thresh: describe(),
                message: "probability thresholds must start at 0 and end at 1".to_string(),
            }
            .into());
        }
        if edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(PreconditionError::NonMonotonicThresholds {
                message: describe(),
            }
            .into());
        }
        Ok(Self {
            edges: edges.to_vec(),
        })
    }

    /// `n` bins of equal width
    pub fn even(n: usize) -> VerifyResult<Self> {
        let n = n.max(1);
        let edges: Vec<f64> = (0..=n).map(|i| i as f64 / n as f64).collect();
        Self::new(&edges)
    }

    /// Bins from `>=p` thresholds
    pub fn from_thresholds(thresholds: &[Threshold]) -> VerifyResult<Self> {
        let mut edges = Vec::with_capacity(thresholds.len());
        for t in thresholds {
            match t {
                Threshold::Compare {
                    op: CompareOp::Ge,
                    value,
                } => edges.push(*value),
                other => {
                    return Err(PreconditionError::IncompatibleProbThreshold {
                        thresh: other.to_string(),
                        message: "probability thresholds must be of the form >=p".to_string(),
                    }
                    .into())
                }
            }
        }
        Self::new(&edges)
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Representative probability of bin `i`
    pub fn midpoint(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// Bin holding probability `p`; a probability of 1 falls in the last bin
    pub fn bin_of(&self, p: f64) -> usize {
        let i = self.edges.partition_point(|&e| e <= p);
        i.saturating_sub(1).min(self.n_bins() - 1)
    }
}

/// Probability of the event under a normal climatology
pub fn climo_event_probability(thresh: &ResolvedThreshold, cmn: f64, csd: f64) -> f64 {
    if is_bad_data(cmn) || is_bad_data(csd) || csd <= 0.0 {
        return BAD_DATA;
    }
    let cdf = |t: f64| {
        if t == f64::INFINITY {
            1.0
        } else if t == f64::NEG_INFINITY {
            0.0
        } else {
            normal_cdf((t - cmn) / csd)
        }
    };
    if thresh.needs_climo() {
        return match (thresh.op(), thresh.climo_value(cmn, csd)) {
            (Some(CompareOp::Ge | CompareOp::Gt), Some(t)) => 1.0 - cdf(t),
            (Some(CompareOp::Le | CompareOp::Lt), Some(t)) => cdf(t),
            _ => BAD_DATA,
        };
    }
    match thresh.interval() {
        Some((lower, _, upper, _)) if lower < upper => cdf(upper) - cdf(lower),
        _ => BAD_DATA,
    }
}

/// Probability contingency table for one observation threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PctInfo {
    pub othresh: ResolvedThreshold,
    pub bins: ProbBins,
    /// Events per bin
    pub oy: Vec<u64>,
    /// Non-events per bin
    pub on: Vec<u64>,
    /// Sum of squared climatological probability errors
    pub climo_sse: f64,
    /// Pairs contributing to `climo_sse`
    pub climo_count: u64,
}

/// One bin of the joint and conditional distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PjcRow {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
    /// Events in the bin over all pairs
    pub oy_tp: f64,
    /// Non-events in the bin over all pairs
    pub on_tp: f64,
    /// Observed frequency within the bin
    pub calibration: f64,
    /// Share of pairs in the bin
    pub refinement: f64,
    /// Share of events falling in the bin
    pub likelihood: f64,
    /// Share of non-events falling in the bin
    pub no_likelihood: f64,
}

/// A point of the ROC curve for forecasting "yes" at `p >= thresh`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub thresh: f64,
    pub pody: f64,
    pub pofd: f64,
}

impl PctInfo {
    fn empty(othresh: &ResolvedThreshold, bins: &ProbBins) -> Self {
        Self {
            othresh: othresh.clone(),
            bins: bins.clone(),
            oy: vec![0; bins.n_bins()],
            on: vec![0; bins.n_bins()],
            climo_sse: 0.0,
            climo_count: 0,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.bins.n_bins()
    }

    pub fn total(&self) -> u64 {
        self.oy.iter().sum::<u64>() + self.on.iter().sum::<u64>()
    }

    pub fn events(&self) -> u64 {
        self.oy.iter().sum()
    }

    pub fn non_events(&self) -> u64 {
        self.on.iter().sum()
    }

    /// Sum with a table over the same bins
    pub fn merge(&self, other: &PctInfo) -> VerifyResult<PctInfo> {
        if self.bins != other.bins {
            return Err(PreconditionError::IncompatibleProbThreshold {
                thresh: format!("{:?}", other.bins.edges()),
                message: "probability bins differ between tables".to_string(),
            }
            .into());
        }
        let add = |a: &[u64], b: &[u64]| -> Vec<u64> { a.iter().zip(b).map(|(x, y)| x + y).collect() };
        Ok(Self {
            othresh: self.othresh.clone(),
            bins: self.bins.clone(),
            oy: add(&self.oy, &other.oy),
            on: add(&self.on, &other.on),
            climo_sse: self.climo_sse + other.climo_sse,
            climo_count: self.climo_count + other.climo_count,
        })
    }

    /// Brier score of the climatological probability
    pub fn briercl(&self) -> f64 {
        if self.climo_count == 0 {
            return BAD_DATA;
        }
        self.climo_sse / self.climo_count as f64
    }

    /// Joint and conditional factorization rows
    pub fn pjc(&self) -> Vec<PjcRow> {
        let n = self.total() as f64;
        let (ny, nn) = (self.events() as f64, self.non_events() as f64);
        (0..self.n_bins())
            .map(|i| {
                let (oy, on) = (self.oy[i] as f64, self.on[i] as f64);
                let count = self.oy[i] + self.on[i];
                let (calibration, refinement) = if count == 0 {
                    (BAD_DATA, BAD_DATA)
                } else {
                    (oy / count as f64, count as f64 / n)
                };
                PjcRow {
                    lower: self.bins.edges[i],
                    upper: self.bins.edges[i + 1],
                    count,
                    oy_tp: safe_div(oy, n),
                    on_tp: safe_div(on, n),
                    calibration,
                    refinement,
                    likelihood: safe_div(oy, ny),
                    no_likelihood: safe_div(on, nn),
                }
            })
            .collect()
    }

    /// ROC points, one per bin lower edge, in order of increasing threshold
    pub fn prc(&self) -> Vec<RocPoint> {
        let (ny, nn) = (self.events() as f64, self.non_events() as f64);
        (0..self.n_bins())
            .map(|k| {
                let hits: u64 = self.oy[k..].iter().sum();
                let false_alarms: u64 = self.on[k..].iter().sum();
                RocPoint {
                    thresh: self.bins.edges[k],
                    pody: safe_div(hits as f64, ny),
                    pofd: safe_div(false_alarms as f64, nn),
                }
            })
            .collect()
    }

    /// Area under the ROC curve by the trapezoid rule
    pub fn roc_auc(&self) -> f64 {
        let mut points: Vec<(f64, f64)> = self.prc().iter().map(|p| (p.pofd, p.pody)).collect();
        if points.iter().any(|&(f, h)| !is_valid(f) || !is_valid(h)) {
            return BAD_DATA;
        }
        points.push((0.0, 0.0));
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points
            .windows(2)
            .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
            .sum()
    }
}

fn validate_probabilities(pairs: &PairStore) -> VerifyResult<()> {
    for (index, &value) in pairs.f().iter().enumerate() {
        if is_valid(value) && !(0.0..=1.0).contains(&value) {
            return Err(PreconditionError::ProbabilityOutOfRange { index, value }.into());
        }
    }
    Ok(())
}

/// Bucket probability forecasts into a PCT for one observation threshold
pub fn compute_pct(
    pairs: &PairStore,
    bins: &ProbBins,
    othresh: &ResolvedThreshold,
) -> VerifyResult<PctInfo> {
    validate_probabilities(pairs)?;
    Ok(accumulate_pct(pairs, bins, othresh))
}

fn accumulate_pct(pairs: &PairStore, bins: &ProbBins, othresh: &ResolvedThreshold) -> PctInfo {
    let mut pct = PctInfo::empty(othresh, bins);
    let (f, o, cmn, csd) = (pairs.f(), pairs.o(), pairs.cmn(), pairs.csd());
    for i in (0..pairs.len()).filter(|&i| pairs.is_valid_pair(i)) {
        if othresh.needs_climo() && !pairs.has_climo_dist(i) {
            continue;
        }
        let event = othresh.check_with_climo(o[i], cmn[i], csd[i]);
        let bin = bins.bin_of(f[i]);
        if event {
            pct.oy[bin] += 1;
        } else {
            pct.on[bin] += 1;
        }
        let pc = climo_event_probability(othresh, cmn[i], csd[i]);
        if is_valid(pc) {
            let e = if event { 1.0 } else { 0.0 };
            pct.climo_sse += (pc - e) * (pc - e);
            pct.climo_count += 1;
        }
    }
    pct
}

/// Number of PSTD statistics
pub const PSTD_STATS: usize = 9;

/// Summary probabilistic statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PstdInfo {
    pub othresh: ResolvedThreshold,
    pub alpha: Vec<f64>,
    pub total: u64,
    pub n_bins: usize,
    pub baser: CiInfo,
    pub reliability: CiInfo,
    pub resolution: CiInfo,
    pub uncertainty: CiInfo,
    pub roc_auc: CiInfo,
    pub brier: CiInfo,
    pub briercl: CiInfo,
    pub bss: CiInfo,
    pub bss_smpl: CiInfo,
}

/// PSTD estimates from a table, in field order
pub fn pstd_estimates(pct: &PctInfo) -> [f64; PSTD_STATS] {
    let mut v = [BAD_DATA; PSTD_STATS];
    let total = pct.total();
    if total == 0 {
        return v;
    }
    let n = total as f64;
    let baser = pct.events() as f64 / n;

    let (mut rel, mut res) = (0.0, 0.0);
    for i in 0..pct.n_bins() {
        let count = (pct.oy[i] + pct.on[i]) as f64;
        if count == 0.0 {
            continue;
        }
        let obar = pct.oy[i] as f64 / count;
        let p = pct.bins.midpoint(i);
        rel += count * (p - obar) * (p - obar);
        res += count * (obar - baser) * (obar - baser);
    }
    rel /= n;
    res /= n;
    let unc = baser * (1.0 - baser);
    let brier = rel - res + unc;
    let briercl = pct.briercl();

    v[0] = baser;
    v[1] = rel;
    v[2] = res;
    v[3] = unc;
    v[4] = pct.roc_auc();
    v[5] = brier;
    v[6] = briercl;
    v[7] = if is_valid(briercl) && briercl > 0.0 {
        1.0 - brier / briercl
    } else {
        BAD_DATA
    };
    v[8] = safe_div(res - rel, unc);
    v
}

/// Standard error of the Brier score from the spread of squared errors
fn brier_se(pct: &PctInfo, brier: f64) -> f64 {
    let total = pct.total();
    if total < 2 || is_bad_data(brier) {
        return BAD_DATA;
    }
    let n = total as f64;
    let mut sq = 0.0;
    for i in 0..pct.n_bins() {
        let p = pct.bins.midpoint(i);
        sq += pct.oy[i] as f64 * (p - 1.0).powi(4) + pct.on[i] as f64 * p.powi(4);
    }
    let var = (sq / n - brier * brier).max(0.0);
    (var / (n - 1.0)).sqrt()
}

impl PstdInfo {
    /// Summary statistics of a table with normal-theory intervals
    pub fn from_pct(pct: &PctInfo, ci: &CiConfig) -> Self {
        let est = pstd_estimates(pct);
        let alpha = &ci.alpha;
        let c = |k: usize| CiInfo::new(est[k], alpha);
        let mut info = Self {
            othresh: pct.othresh.clone(),
            alpha: alpha.clone(),
            total: pct.total(),
            n_bins: pct.n_bins(),
            baser: c(0),
            reliability: c(1),
            resolution: c(2),
            uncertainty: c(3),
            roc_auc: c(4),
            brier: c(5),
            briercl: c(6),
            bss: c(7),
            bss_smpl: c(8),
        };
        if ci.normal {
            let n = info.total as f64;
            let baser = info.baser.estimate;
            info.baser
                .apply_normal(ci.policy, |a| wilson_interval(baser, n, a));
            let brier = info.brier.estimate;
            let se = brier_se(pct, brier);
            info.brier
                .apply_normal(ci.policy, |a| normal_interval(brier, se, a));
        }
        info
    }

    fn fields_mut(&mut self) -> Vec<&mut CiInfo> {
        vec![
            &mut self.baser,
            &mut self.reliability,
            &mut self.resolution,
            &mut self.uncertainty,
            &mut self.roc_auc,
            &mut self.brier,
            &mut self.briercl,
            &mut self.bss,
            &mut self.bss_smpl,
        ]
    }
}

/// Probabilistic table and summary statistics with confidence intervals
pub fn compute_pstd<R: Rng + ?Sized>(
    pairs: &PairStore,
    bins: &ProbBins,
    othresh: &ResolvedThreshold,
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<(PctInfo, PstdInfo)> {
    config.validate()?;
    let pct = compute_pct(pairs, bins, othresh)?;
    debug!(
        n_pairs = pairs.len(),
        total = pct.total(),
        n_bins = pct.n_bins(),
        othresh = %othresh,
        "computing PSTD"
    );
    for row in pct.pjc().iter().filter(|r| r.count == 0) {
        warn!(lower = row.lower, upper = row.upper, "empty probability bin");
    }

    let mut info = PstdInfo::from_pct(&pct, &config.ci);
    if config.ci.bootstrap.n_rep > 0 {
        let est = pstd_estimates(&pct);
        let targets: Vec<BootTarget> = est.iter().map(|&v| BootTarget::new(v, 1)).collect();
        let sample = pairs.valid_only();
        let bounds = Resampler::new(&config.ci).run(&sample, &targets, rng, |p| {
            pstd_estimates(&accumulate_pct(p, bins, othresh)).to_vec()
        })?;
        attach_bootstrap(info.fields_mut(), bounds);
    }
    Ok((pct, info))
}
