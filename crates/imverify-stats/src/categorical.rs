//! Categorical statistics (CTC/CTS and MCTC/MCTS)
//!
//! Pairs are classified into a contingency table by a forecast and an
//! observation threshold; scores come from the table. Bootstrap replicates
//! rebuild the table from resampled pairs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use imverify_core::bad_data::{is_bad_data, safe_div, BAD_DATA};
use imverify_core::config::{CiPolicy, VerifyConfig};
use imverify_core::contingency::{NxNTable, TwoByTwoTable};
use imverify_core::error::{PreconditionError, VerifyResult};
use imverify_core::pairs::PairStore;
use imverify_core::threshold::{CategoryBins, ResolvedThreshold, Threshold};

use crate::bootstrap::{BootTarget, Resampler};
use crate::ci::{attach_bootstrap, normal_interval, wilson_interval, CiInfo};

/// Number of derived CTS statistics
pub const CTS_STATS: usize = 21;

/// Number of derived MCTS statistics
pub const MCTS_STATS: usize = 5;

/// Default expected-correct fraction for a 2x2 HSS_EC
const DEFAULT_HSS_EC_2X2: f64 = 0.5;

/// Contingency table statistics for one threshold pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtsInfo {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub table: TwoByTwoTable,
    pub alpha: Vec<f64>,
    pub baser: CiInfo,
    pub fmean: CiInfo,
    pub acc: CiInfo,
    pub fbias: CiInfo,
    pub pody: CiInfo,
    pub podn: CiInfo,
    pub pofd: CiInfo,
    pub far: CiInfo,
    pub csi: CiInfo,
    pub gss: CiInfo,
    pub bagss: CiInfo,
    pub hk: CiInfo,
    pub hss: CiInfo,
    pub hss_ec: CiInfo,
    pub odds: CiInfo,
    pub lodds: CiInfo,
    pub orss: CiInfo,
    pub eds: CiInfo,
    pub seds: CiInfo,
    pub edi: CiInfo,
    pub sedi: CiInfo,
}

/// Whether pair `i` can be classified by both thresholds
fn classifiable(pairs: &PairStore, i: usize, a: &ResolvedThreshold, b: &ResolvedThreshold) -> bool {
    pairs.is_valid_pair(i)
        && (!(a.needs_climo() || b.needs_climo()) || pairs.has_climo_dist(i))
}

/// Build the 2x2 table for a threshold pair
pub fn compute_ctc(
    pairs: &PairStore,
    fthresh: &ResolvedThreshold,
    othresh: &ResolvedThreshold,
) -> TwoByTwoTable {
    let (f, o, cmn, csd) = (pairs.f(), pairs.o(), pairs.cmn(), pairs.csd());
    let mut table = TwoByTwoTable::default();
    for i in 0..pairs.len() {
        if !classifiable(pairs, i, fthresh, othresh) {
            continue;
        }
        table.add(
            fthresh.check_with_climo(f[i], cmn[i], csd[i]),
            othresh.check_with_climo(o[i], cmn[i], csd[i]),
        );
    }
    table
}

/// Every derived CTS statistic, in field order
pub fn cts_estimates(t: &TwoByTwoTable, hss_ec_value: f64) -> [f64; CTS_STATS] {
    [
        t.base_rate(),
        t.fmean(),
        t.accuracy(),
        t.fbias(),
        t.pody(),
        t.podn(),
        t.pofd(),
        t.far(),
        t.csi(),
        t.gss(),
        t.bagss(),
        t.hk(),
        t.hss(),
        t.hss_ec(hss_ec_value),
        t.odds_ratio(),
        t.log_odds(),
        t.orss(),
        t.eds(),
        t.seds(),
        t.edi(),
        t.sedi(),
    ]
}

impl CtsInfo {
    /// Point estimates from a table, no intervals
    pub fn from_table(
        fthresh: ResolvedThreshold,
        othresh: ResolvedThreshold,
        table: TwoByTwoTable,
        alpha: &[f64],
        hss_ec_value: f64,
    ) -> Self {
        let est = cts_estimates(&table, hss_ec_value);
        let ci = |k: usize| CiInfo::new(est[k], alpha);
        Self {
            fthresh,
            othresh,
            table,
            alpha: alpha.to_vec(),
            baser: ci(0),
            fmean: ci(1),
            acc: ci(2),
            fbias: ci(3),
            pody: ci(4),
            podn: ci(5),
            pofd: ci(6),
            far: ci(7),
            csi: ci(8),
            gss: ci(9),
            bagss: ci(10),
            hk: ci(11),
            hss: ci(12),
            hss_ec: ci(13),
            odds: ci(14),
            lodds: ci(15),
            orss: ci(16),
            eds: ci(17),
            seds: ci(18),
            edi: ci(19),
            sedi: ci(20),
        }
    }

    /// Fields in the order of [`cts_estimates`]
    pub fn fields(&self) -> [&CiInfo; CTS_STATS] {
        [
            &self.baser,
            &self.fmean,
            &self.acc,
            &self.fbias,
            &self.pody,
            &self.podn,
            &self.pofd,
            &self.far,
            &self.csi,
            &self.gss,
            &self.bagss,
            &self.hk,
            &self.hss,
            &self.hss_ec,
            &self.odds,
            &self.lodds,
            &self.orss,
            &self.eds,
            &self.seds,
            &self.edi,
            &self.sedi,
        ]
    }

    fn fields_mut(&mut self) -> Vec<&mut CiInfo> {
        vec![
            &mut self.baser,
            &mut self.fmean,
            &mut self.acc,
            &mut self.fbias,
            &mut self.pody,
            &mut self.podn,
            &mut self.pofd,
            &mut self.far,
            &mut self.csi,
            &mut self.gss,
            &mut self.bagss,
            &mut self.hk,
            &mut self.hss,
            &mut self.hss_ec,
            &mut self.odds,
            &mut self.lodds,
            &mut self.orss,
            &mut self.eds,
            &mut self.seds,
            &mut self.edi,
            &mut self.sedi,
        ]
    }

    /// Normal-theory intervals
    ///
    /// Proportions use the Wilson score interval; HK, the odds family and the
    /// extreme dependency scores use delta-method standard errors.
    pub fn apply_normal_ci(&mut self, policy: CiPolicy) {
        let t = self.table;
        let n = t.total() as f64;
        let (a, b, c, d) = (
            t.fy_oy as f64,
            t.fy_on as f64,
            t.fn_oy as f64,
            t.fn_on as f64,
        );

        let wilson = |ci: &mut CiInfo, trials: f64| {
            let p = ci.estimate;
            ci.apply_normal(policy, |alpha| wilson_interval(p, trials, alpha));
        };
        wilson(&mut self.baser, n);
        wilson(&mut self.fmean, n);
        wilson(&mut self.acc, n);
        wilson(&mut self.pody, t.oy() as f64);
        wilson(&mut self.podn, t.on() as f64);
        wilson(&mut self.pofd, t.on() as f64);
        wilson(&mut self.far, t.fy() as f64);
        wilson(&mut self.csi, a + b + c);

        let delta = |ci: &mut CiInfo, se: f64| {
            let v = ci.estimate;
            ci.apply_normal(policy, |alpha| normal_interval(v, se, alpha));
        };

        let h = t.pody();
        let f = t.pofd();
        let hk_se = if is_bad_data(h) || is_bad_data(f) {
            BAD_DATA
        } else {
            (h * (1.0 - h) / t.oy() as f64 + f * (1.0 - f) / t.on() as f64).sqrt()
        };
        delta(&mut self.hk, hk_se);

        let lodds_se = if a * b * c * d > 0.0 {
            (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt()
        } else {
            BAD_DATA
        };
        delta(&mut self.lodds, lodds_se);
        let lodds = self.lodds.estimate;
        self.odds.apply_normal(policy, |alpha| {
            let (lo, hi) = normal_interval(lodds, lodds_se, alpha);
            if is_bad_data(lo) {
                (BAD_DATA, BAD_DATA)
            } else {
                (lo.exp(), hi.exp())
            }
        });
        let or = self.odds.estimate;
        let orss_se = if is_bad_data(or) || is_bad_data(lodds_se) {
            BAD_DATA
        } else {
            lodds_se * 2.0 * or / ((or + 1.0) * (or + 1.0))
        };
        delta(&mut self.orss, orss_se);

        let (eds_se, seds_se, edi_se, sedi_se) = extreme_dependency_se(&t);
        delta(&mut self.eds, eds_se);
        delta(&mut self.seds, seds_se);
        delta(&mut self.edi, edi_se);
        delta(&mut self.sedi, sedi_se);
    }
}

/// Delta-method standard errors of EDS, SEDS, EDI and SEDI
///
/// Each treats the hit rate as the only random quantity, with variance
/// `H (1 - H) / (n p)` for base rate `p`.
fn extreme_dependency_se(t: &TwoByTwoTable) -> (f64, f64, f64, f64) {
    let bad = (BAD_DATA, BAD_DATA, BAD_DATA, BAD_DATA);
    let n = t.total() as f64;
    let h = t.pody();
    let f = t.pofd();
    let p = t.base_rate();
    let q = t.fmean();
    if [h, f, p, q].iter().any(|v| is_bad_data(*v)) {
        return bad;
    }
    if h <= 0.0 || h >= 1.0 || f <= 0.0 || f >= 1.0 || p <= 0.0 || q <= 0.0 {
        return bad;
    }
    let var_h = (h * (1.0 - h) / (n * p)).sqrt();

    let lhp = (h * p).ln();
    let eds = safe_div(2.0 * p.ln().abs(), h * lhp * lhp);
    let seds = safe_div((q.ln() + p.ln()).abs(), h * lhp * lhp);

    let (lf, lh) = (f.ln(), h.ln());
    let edi = safe_div(
        2.0 * (lf + h / (1.0 - h) * lh).abs(),
        h * (lf + lh) * (lf + lh),
    );

    let (l1f, l1h) = ((1.0 - f).ln(), (1.0 - h).ln());
    let s = lf + lh + l1f + l1h;
    let sedi_num = ((1.0 - h) * (1.0 - f) + h * f) / ((1.0 - h) * (1.0 - f)) * (f * (1.0 - h)).ln()
        + 2.0 * h / (1.0 - h) * ((1.0 - f) * h).ln();
    let sedi = safe_div(2.0 * sedi_num.abs(), h * s * s);

    let scale = |v: f64| if is_bad_data(v) { BAD_DATA } else { v * var_h };
    (scale(eds), scale(seds), scale(edi), scale(sedi))
}

/// Categorical statistics for a resolved threshold pair
pub fn compute_cts<R: Rng + ?Sized>(
    pairs: &PairStore,
    fthresh: &ResolvedThreshold,
    othresh: &ResolvedThreshold,
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<CtsInfo> {
    config.validate()?;
    let ec = config.hss_ec_value.unwrap_or(DEFAULT_HSS_EC_2X2);
    debug!(
        n_pairs = pairs.len(),
        fthresh = %fthresh,
        othresh = %othresh,
        "computing CTS"
    );

    let table = compute_ctc(pairs, fthresh, othresh);
    let mut info = CtsInfo::from_table(
        fthresh.clone(),
        othresh.clone(),
        table,
        &config.ci.alpha,
        ec,
    );
    if config.ci.normal {
        info.apply_normal_ci(config.ci.policy);
    }

    if config.ci.bootstrap.n_rep > 0 {
        let targets: Vec<BootTarget> = info
            .fields()
            .iter()
            .map(|c| BootTarget::new(c.estimate, 1))
            .collect();
        let sample = pairs.valid_only();
        let bounds = Resampler::new(&config.ci).run(&sample, &targets, rng, |p| {
            cts_estimates(&compute_ctc(p, fthresh, othresh), ec).to_vec()
        })?;
        attach_bootstrap(info.fields_mut(), bounds);
    }
    Ok(info)
}

/// Resolve configured threshold pairs against the sample and compute CTS for each
pub fn compute_cts_list<R: Rng + ?Sized>(
    pairs: &PairStore,
    thresholds: &[(Threshold, Threshold)],
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<Vec<CtsInfo>> {
    let samples = pairs.percentile_samples();
    thresholds
        .iter()
        .map(|(ft, ot)| {
            let fr = ft.resolve(&samples)?;
            let or = ot.resolve(&samples)?;
            compute_cts(pairs, &fr, &or, config, rng)
        })
        .collect()
}

/// Multi-category contingency table statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MctsInfo {
    pub fthresh: Vec<ResolvedThreshold>,
    pub othresh: Vec<ResolvedThreshold>,
    pub table: NxNTable,
    pub alpha: Vec<f64>,
    pub acc: CiInfo,
    pub hk: CiInfo,
    pub hss: CiInfo,
    pub hss_ec: CiInfo,
    pub ger: CiInfo,
}

/// Build the NxN table from forecast and observation category partitions
pub fn compute_mctc(
    pairs: &PairStore,
    fbins: &CategoryBins,
    obins: &CategoryBins,
) -> VerifyResult<NxNTable> {
    if fbins.n_categories() != obins.n_categories() {
        return Err(PreconditionError::NonCoveringThresholds {
            message: format!(
                "forecast has {} categories, observation has {}",
                fbins.n_categories(),
                obins.n_categories()
            ),
        }
        .into());
    }
    let mut table = NxNTable::new(fbins.n_categories())?;
    for i in 0..pairs.len() {
        if !pairs.is_valid_pair(i) {
            continue;
        }
        if let (Some(fc), Some(oc)) = (fbins.category(pairs.f()[i]), obins.category(pairs.o()[i]))
        {
            table.increment(fc, oc);
        }
    }
    Ok(table)
}

/// Every derived MCTS statistic, in field order
pub fn mcts_estimates(t: &NxNTable, hss_ec_value: Option<f64>) -> [f64; MCTS_STATS] {
    [
        t.accuracy(),
        t.hk(),
        t.hss(),
        t.hss_ec(hss_ec_value),
        t.gerrity(),
    ]
}

impl MctsInfo {
    fn fields_mut(&mut self) -> Vec<&mut CiInfo> {
        vec![
            &mut self.acc,
            &mut self.hk,
            &mut self.hss,
            &mut self.hss_ec,
            &mut self.ger,
        ]
    }
}

/// Multi-category statistics
///
/// Forecast and observation thresholds must each partition the real line
/// into the same number of categories.
pub fn compute_mcts<R: Rng + ?Sized>(
    pairs: &PairStore,
    fthresh: &[ResolvedThreshold],
    othresh: &[ResolvedThreshold],
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<MctsInfo> {
    config.validate()?;
    let fbins = CategoryBins::new(fthresh)?;
    let obins = CategoryBins::new(othresh)?;
    debug!(
        n_pairs = pairs.len(),
        n_cat = fbins.n_categories(),
        "computing MCTS"
    );

    let table = compute_mctc(pairs, &fbins, &obins)?;
    let alpha = &config.ci.alpha;
    let est = mcts_estimates(&table, config.hss_ec_value);
    let n = table.total() as f64;
    let mut info = MctsInfo {
        fthresh: fthresh.to_vec(),
        othresh: othresh.to_vec(),
        table,
        alpha: alpha.clone(),
        acc: CiInfo::new(est[0], alpha),
        hk: CiInfo::new(est[1], alpha),
        hss: CiInfo::new(est[2], alpha),
        hss_ec: CiInfo::new(est[3], alpha),
        ger: CiInfo::new(est[4], alpha),
    };
    if config.ci.normal {
        let p = info.acc.estimate;
        info.acc
            .apply_normal(config.ci.policy, |a| wilson_interval(p, n, a));
    }

    if config.ci.bootstrap.n_rep > 0 {
        let targets: Vec<BootTarget> = est.iter().map(|&v| BootTarget::new(v, 1)).collect();
        let ec = config.hss_ec_value;
        let sample = pairs.valid_only();
        let bounds = Resampler::new(&config.ci).run(&sample, &targets, rng, |p| {
            match compute_mctc(p, &fbins, &obins) {
                Ok(t) => mcts_estimates(&t, ec).to_vec(),
                Err(_) => vec![BAD_DATA; MCTS_STATS],
            }
        })?;
        attach_bootstrap(info.fields_mut(), bounds);
    }
    Ok(info)
}
