//! Vector wind statistics (VL1L2, VAL1L2, VCNT)
//!
//! U and V components arrive as two pair stores of equal length; row `i` of
//! each describes the same location. Filtering thresholds apply to the wind
//! speed. Directions are meteorological: the direction the wind blows from,
//! in degrees clockwise from north.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use imverify_core::bad_data::{is_bad_data, is_valid, BAD_DATA};
use imverify_core::config::{CiPolicy, VerifyConfig};
use imverify_core::error::{validation, ConfigError, VerifyResult};
use imverify_core::pairs::PairStore;
use imverify_core::threshold::{ResolvedThreshold, SetLogic};

use crate::bootstrap::{BootTarget, Resample, Resampler};
use crate::ci::{attach_bootstrap, mean_interval, stdev_interval, CiInfo};
use crate::continuous::{merge_mean, stdev_from_var, PairFilter};

/// Meteorological direction of the vector (u, v); calm winds have none
pub fn met_direction(u: f64, v: f64) -> f64 {
    if is_bad_data(u) || is_bad_data(v) || (u == 0.0 && v == 0.0) {
        return BAD_DATA;
    }
    (-u).atan2(-v).to_degrees().rem_euclid(360.0)
}

/// Wrap an angle difference to [-180, 180)
pub fn wrap_direction(deg: f64) -> f64 {
    if is_bad_data(deg) {
        return BAD_DATA;
    }
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Matched U and V pairs
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPairs {
    u: PairStore,
    v: PairStore,
}

impl VectorPairs {
    pub fn new(u: PairStore, v: PairStore) -> VerifyResult<Self> {
        validation::validate_length("V component", u.len(), v.len())?;
        Ok(Self { u, v })
    }

    pub fn u(&self) -> &PairStore {
        &self.u
    }

    pub fn v(&self) -> &PairStore {
        &self.v
    }

    /// Whether both components of row `i` are valid
    pub fn is_valid_row(&self, i: usize) -> bool {
        self.u.is_valid_pair(i) && self.v.is_valid_pair(i)
    }

    fn has_climo_row(&self, i: usize) -> bool {
        self.u.has_climo_mean(i) && self.v.has_climo_mean(i)
    }

    /// Forecast and observed speed of row `i`
    pub fn speeds(&self, i: usize) -> (f64, f64) {
        (
            self.u.f()[i].hypot(self.v.f()[i]),
            self.u.o()[i].hypot(self.v.o()[i]),
        )
    }

    /// Valid rows whose speeds pass `filter`
    ///
    /// Speed has no climatological distribution, so climatology percentile
    /// thresholds are rejected.
    pub fn select(&self, filter: &PairFilter) -> VerifyResult<Self> {
        for thresh in [&filter.fthresh, &filter.othresh] {
            if thresh.needs_climo() {
                return Err(ConfigError::UnsupportedThreshold {
                    thresh: thresh.to_string(),
                    message: "wind speed filters take fixed or sample thresholds".to_string(),
                }
                .into());
            }
        }
        let indices: Vec<usize> = (0..self.len())
            .filter(|&i| self.is_valid_row(i))
            .filter(|&i| {
                let (fs, os) = self.speeds(i);
                filter
                    .logic
                    .apply(filter.fthresh.check(fs), filter.othresh.check(os))
            })
            .collect();
        Ok(self.subset(&indices))
    }
}

impl Resample for VectorPairs {
    fn len(&self) -> usize {
        self.u.len()
    }

    fn valid_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_valid_row(i)).count()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            u: self.u.subset_by_indices(indices),
            v: self.v.subset_by_indices(indices),
        }
    }
}

/// Vector partial sums (VL1L2) and vector anomaly partial sums (VAL1L2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vl1l2Info {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub logic: SetLogic,

    pub vcount: usize,
    pub vweight: f64,
    pub ufbar: f64,
    pub vfbar: f64,
    pub uobar: f64,
    pub vobar: f64,
    pub uvfobar: f64,
    pub uvffbar: f64,
    pub uvoobar: f64,
    pub f_speed_bar: f64,
    pub o_speed_bar: f64,

    /// Rows where both winds have a direction
    pub dir_count: usize,
    pub dir_weight: f64,
    pub dir_me: f64,
    pub dir_mae: f64,
    pub dir_mse: f64,

    pub vacount: usize,
    pub vaweight: f64,
    pub ufabar: f64,
    pub vfabar: f64,
    pub uoabar: f64,
    pub voabar: f64,
    pub uvfoabar: f64,
    pub uvffabar: f64,
    pub uvooabar: f64,
}

impl Vl1l2Info {
    fn empty(filter: &PairFilter) -> Self {
        Self {
            fthresh: filter.fthresh.clone(),
            othresh: filter.othresh.clone(),
            logic: filter.logic,
            vcount: 0,
            vweight: 0.0,
            ufbar: BAD_DATA,
            vfbar: BAD_DATA,
            uobar: BAD_DATA,
            vobar: BAD_DATA,
            uvfobar: BAD_DATA,
            uvffbar: BAD_DATA,
            uvoobar: BAD_DATA,
            f_speed_bar: BAD_DATA,
            o_speed_bar: BAD_DATA,
            dir_count: 0,
            dir_weight: 0.0,
            dir_me: BAD_DATA,
            dir_mae: BAD_DATA,
            dir_mse: BAD_DATA,
            vacount: 0,
            vaweight: 0.0,
            ufabar: BAD_DATA,
            vfabar: BAD_DATA,
            uoabar: BAD_DATA,
            voabar: BAD_DATA,
            uvfoabar: BAD_DATA,
            uvffabar: BAD_DATA,
            uvooabar: BAD_DATA,
        }
    }

    /// Combine with partial sums from a disjoint subset
    pub fn merge(&self, other: &Vl1l2Info) -> Self {
        let (w1, w2) = (self.vweight, other.vweight);
        let (d1, d2) = (self.dir_weight, other.dir_weight);
        let (a1, a2) = (self.vaweight, other.vaweight);
        Self {
            fthresh: self.fthresh.clone(),
            othresh: self.othresh.clone(),
            logic: self.logic,
            vcount: self.vcount + other.vcount,
            vweight: w1 + w2,
            ufbar: merge_mean(self.ufbar, w1, other.ufbar, w2),
            vfbar: merge_mean(self.vfbar, w1, other.vfbar, w2),
            uobar: merge_mean(self.uobar, w1, other.uobar, w2),
            vobar: merge_mean(self.vobar, w1, other.vobar, w2),
            uvfobar: merge_mean(self.uvfobar, w1, other.uvfobar, w2),
            uvffbar: merge_mean(self.uvffbar, w1, other.uvffbar, w2),
            uvoobar: merge_mean(self.uvoobar, w1, other.uvoobar, w2),
            f_speed_bar: merge_mean(self.f_speed_bar, w1, other.f_speed_bar, w2),
            o_speed_bar: merge_mean(self.o_speed_bar, w1, other.o_speed_bar, w2),
            dir_count: self.dir_count + other.dir_count,
            dir_weight: d1 + d2,
            dir_me: merge_mean(self.dir_me, d1, other.dir_me, d2),
            dir_mae: merge_mean(self.dir_mae, d1, other.dir_mae, d2),
            dir_mse: merge_mean(self.dir_mse, d1, other.dir_mse, d2),
            vacount: self.vacount + other.vacount,
            vaweight: a1 + a2,
            ufabar: merge_mean(self.ufabar, a1, other.ufabar, a2),
            vfabar: merge_mean(self.vfabar, a1, other.vfabar, a2),
            uoabar: merge_mean(self.uoabar, a1, other.uoabar, a2),
            voabar: merge_mean(self.voabar, a1, other.voabar, a2),
            uvfoabar: merge_mean(self.uvfoabar, a1, other.uvfoabar, a2),
            uvffabar: merge_mean(self.uvffabar, a1, other.uvffabar, a2),
            uvooabar: merge_mean(self.uvooabar, a1, other.uvooabar, a2),
        }
    }
}

fn accumulate(pairs: &VectorPairs, filter: &PairFilter) -> Vl1l2Info {
    let mut info = Vl1l2Info::empty(filter);
    let (u, v) = (pairs.u(), pairs.v());

    let mut s = [0.0f64; 9];
    let mut d = [0.0f64; 3];
    let mut a = [0.0f64; 7];
    let (mut n, mut w_sum) = (0usize, 0.0);
    let (mut nd, mut wd) = (0usize, 0.0);
    let (mut na, mut wa) = (0usize, 0.0);

    for i in (0..pairs.len()).filter(|&i| pairs.is_valid_row(i)) {
        let w = u.wgt()[i];
        let (uf, vf, uo, vo) = (u.f()[i], v.f()[i], u.o()[i], v.o()[i]);
        let (fs, os) = pairs.speeds(i);
        n += 1;
        w_sum += w;
        for (acc, x) in s.iter_mut().zip([
            uf,
            vf,
            uo,
            vo,
            uf * uo + vf * vo,
            uf * uf + vf * vf,
            uo * uo + vo * vo,
            fs,
            os,
        ]) {
            *acc += w * x;
        }

        let (fdir, odir) = (met_direction(uf, vf), met_direction(uo, vo));
        if is_valid(fdir) && is_valid(odir) {
            let err = wrap_direction(fdir - odir);
            nd += 1;
            wd += w;
            d[0] += w * err;
            d[1] += w * err.abs();
            d[2] += w * err * err;
        }

        if pairs.has_climo_row(i) {
            let (ufa, vfa) = (uf - u.cmn()[i], vf - v.cmn()[i]);
            let (uoa, voa) = (uo - u.cmn()[i], vo - v.cmn()[i]);
            na += 1;
            wa += w;
            for (acc, x) in a.iter_mut().zip([
                ufa,
                vfa,
                uoa,
                voa,
                ufa * uoa + vfa * voa,
                ufa * ufa + vfa * vfa,
                uoa * uoa + voa * voa,
            ]) {
                *acc += w * x;
            }
        }
    }

    if n > 0 && w_sum > 0.0 {
        let m: Vec<f64> = s.iter().map(|x| x / w_sum).collect();
        info.vcount = n;
        info.vweight = w_sum;
        info.ufbar = m[0];
        info.vfbar = m[1];
        info.uobar = m[2];
        info.vobar = m[3];
        info.uvfobar = m[4];
        info.uvffbar = m[5];
        info.uvoobar = m[6];
        info.f_speed_bar = m[7];
        info.o_speed_bar = m[8];
    }
    if nd > 0 && wd > 0.0 {
        info.dir_count = nd;
        info.dir_weight = wd;
        info.dir_me = d[0] / wd;
        info.dir_mae = d[1] / wd;
        info.dir_mse = d[2] / wd;
    }
    if na > 0 && wa > 0.0 {
        let m: Vec<f64> = a.iter().map(|x| x / wa).collect();
        info.vacount = na;
        info.vaweight = wa;
        info.ufabar = m[0];
        info.vfabar = m[1];
        info.uoabar = m[2];
        info.voabar = m[3];
        info.uvfoabar = m[4];
        info.uvffabar = m[5];
        info.uvooabar = m[6];
    }
    info
}

/// Vector partial sums over the rows whose speeds pass `filter`
pub fn compute_vl1l2(pairs: &VectorPairs, filter: &PairFilter) -> VerifyResult<Vl1l2Info> {
    let info = accumulate(&pairs.select(filter)?, filter);
    debug!(vcount = info.vcount, vacount = info.vacount, "computed VL1L2");
    Ok(info)
}

/// Number of VCNT statistics
pub const VCNT_STATS: usize = 20;

const VCNT_MIN_PAIRS: [usize; VCNT_STATS] = [
    1, 1, 1, 1, 1, 1, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 3, 3,
];

/// Vector continuous statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcntInfo {
    pub fthresh: ResolvedThreshold,
    pub othresh: ResolvedThreshold,
    pub logic: SetLogic,
    pub alpha: Vec<f64>,
    pub total: usize,
    pub dir_count: usize,

    /// Mean forecast speed
    pub fbar: CiInfo,
    /// Mean observed speed
    pub obar: CiInfo,
    pub fs_rms: CiInfo,
    pub os_rms: CiInfo,
    pub msve: CiInfo,
    pub rmsve: CiInfo,
    pub fstdev: CiInfo,
    pub ostdev: CiInfo,
    /// Direction of the mean forecast vector
    pub fdir: CiInfo,
    pub odir: CiInfo,
    /// Speed of the mean forecast vector
    pub fbar_speed: CiInfo,
    pub obar_speed: CiInfo,
    pub vdiff_speed: CiInfo,
    pub vdiff_dir: CiInfo,
    pub speed_err: CiInfo,
    pub speed_abserr: CiInfo,
    pub dir_err: CiInfo,
    pub dir_abserr: CiInfo,
    pub anom_corr: CiInfo,
    pub anom_corr_uncntr: CiInfo,
}

impl VcntInfo {
    fn fields_mut(&mut self) -> Vec<&mut CiInfo> {
        vec![
            &mut self.fbar,
            &mut self.obar,
            &mut self.fs_rms,
            &mut self.os_rms,
            &mut self.msve,
            &mut self.rmsve,
            &mut self.fstdev,
            &mut self.ostdev,
            &mut self.fdir,
            &mut self.odir,
            &mut self.fbar_speed,
            &mut self.obar_speed,
            &mut self.vdiff_speed,
            &mut self.vdiff_dir,
            &mut self.speed_err,
            &mut self.speed_abserr,
            &mut self.dir_err,
            &mut self.dir_abserr,
            &mut self.anom_corr,
            &mut self.anom_corr_uncntr,
        ]
    }
}

/// VCNT estimates from vector partial sums, in field order
pub fn vcnt_from_sums(s: &Vl1l2Info) -> [f64; VCNT_STATS] {
    let mut v = [BAD_DATA; VCNT_STATS];
    if s.vcount == 0 {
        return v;
    }
    let n = s.vcount;
    v[0] = s.f_speed_bar;
    v[1] = s.o_speed_bar;
    v[2] = s.uvffbar.max(0.0).sqrt();
    v[3] = s.uvoobar.max(0.0).sqrt();
    v[4] = (s.uvffbar - 2.0 * s.uvfobar + s.uvoobar).max(0.0);
    v[5] = v[4].sqrt();
    v[6] = stdev_from_var(s.uvffbar - s.f_speed_bar * s.f_speed_bar, n);
    v[7] = stdev_from_var(s.uvoobar - s.o_speed_bar * s.o_speed_bar, n);
    v[8] = met_direction(s.ufbar, s.vfbar);
    v[9] = met_direction(s.uobar, s.vobar);
    v[10] = s.ufbar.hypot(s.vfbar);
    v[11] = s.uobar.hypot(s.vobar);
    let (du, dv) = (s.ufbar - s.uobar, s.vfbar - s.vobar);
    v[12] = du.hypot(dv);
    v[13] = met_direction(du, dv);
    v[14] = v[10] - v[11];
    v[15] = v[14].abs();
    if is_valid(v[8]) && is_valid(v[9]) {
        v[16] = wrap_direction(v[8] - v[9]);
        v[17] = v[16].abs();
    }

    if s.vacount > 0 {
        let fvar = s.uvffabar - (s.ufabar * s.ufabar + s.vfabar * s.vfabar);
        let ovar = s.uvooabar - (s.uoabar * s.uoabar + s.voabar * s.voabar);
        if fvar > 0.0 && ovar > 0.0 {
            let cov = s.uvfoabar - (s.ufabar * s.uoabar + s.vfabar * s.voabar);
            v[18] = (cov / (fvar * ovar).sqrt()).clamp(-1.0, 1.0);
        }
        if s.uvffabar > 0.0 && s.uvooabar > 0.0 {
            v[19] = (s.uvfoabar / (s.uvffabar * s.uvooabar).sqrt()).clamp(-1.0, 1.0);
        }
    }
    v
}

fn apply_vcnt_normal_ci(info: &mut VcntInfo, policy: CiPolicy) {
    let n = info.total;
    let (fsd, osd) = (info.fstdev.estimate, info.ostdev.estimate);
    let fbar = info.fbar.estimate;
    info.fbar
        .apply_normal(policy, |a| mean_interval(fbar, fsd, n, a));
    let obar = info.obar.estimate;
    info.obar
        .apply_normal(policy, |a| mean_interval(obar, osd, n, a));
    info.fstdev
        .apply_normal(policy, |a| stdev_interval(fsd, n, a));
    info.ostdev
        .apply_normal(policy, |a| stdev_interval(osd, n, a));
}

/// Vector continuous statistics over the rows whose speeds pass `filter`
pub fn compute_vcnt<R: Rng + ?Sized>(
    pairs: &VectorPairs,
    filter: &PairFilter,
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<VcntInfo> {
    config.validate()?;
    let sub = pairs.select(filter)?;
    debug!(n_rows = pairs.len(), n_selected = sub.len(), "computing VCNT");

    let sums = accumulate(&sub, filter);
    let est = vcnt_from_sums(&sums);
    let alpha = &config.ci.alpha;
    let ci = |k: usize| CiInfo::new(est[k], alpha);
    let mut info = VcntInfo {
        fthresh: filter.fthresh.clone(),
        othresh: filter.othresh.clone(),
        logic: filter.logic,
        alpha: alpha.clone(),
        total: sums.vcount,
        dir_count: sums.dir_count,
        fbar: ci(0),
        obar: ci(1),
        fs_rms: ci(2),
        os_rms: ci(3),
        msve: ci(4),
        rmsve: ci(5),
        fstdev: ci(6),
        ostdev: ci(7),
        fdir: ci(8),
        odir: ci(9),
        fbar_speed: ci(10),
        obar_speed: ci(11),
        vdiff_speed: ci(12),
        vdiff_dir: ci(13),
        speed_err: ci(14),
        speed_abserr: ci(15),
        dir_err: ci(16),
        dir_abserr: ci(17),
        anom_corr: ci(18),
        anom_corr_uncntr: ci(19),
    };

    if config.ci.normal {
        apply_vcnt_normal_ci(&mut info, config.ci.policy);
    }

    if config.ci.bootstrap.n_rep > 0 {
        let targets: Vec<BootTarget> = est
            .iter()
            .zip(VCNT_MIN_PAIRS)
            .map(|(&v, min)| BootTarget::new(v, min))
            .collect();
        let all = PairFilter::default();
        let bounds = Resampler::new(&config.ci).run(&sub, &targets, rng, |p| {
            vcnt_from_sums(&accumulate(p, &all)).to_vec()
        })?;
        attach_bootstrap(info.fields_mut(), bounds);
    }
    Ok(info)
}
