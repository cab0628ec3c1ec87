//! Neighborhood verification (NBRCTC, NBRCTS, NBRCNT)
//!
//! [`fractional_coverage`] turns a field into the fraction of each cell's
//! neighborhood exceeding a threshold. Cells outside the domain count as
//! missing. A cell is bad data when its own value is missing or when the
//! valid share of its neighborhood is below `vld_thresh`.
//!
//! Square windows use a summed-area table so each cell costs O(1); circles
//! walk a precomputed offset list. Even widths extend one cell further
//! toward increasing row and column.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use imverify_core::bad_data::{is_valid, safe_div, BAD_DATA};
use imverify_core::config::{NbrhdShape, VerifyConfig};
use imverify_core::error::{validation, ConfigError, PreconditionError, VerifyResult};
use imverify_core::grid::DataPlane;
use imverify_core::pairs::PairStore;
use imverify_core::threshold::ResolvedThreshold;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bootstrap::{BootTarget, Resampler};
use crate::categorical::{compute_cts, CtsInfo};
use crate::ci::{attach_bootstrap, CiInfo};

/// Window geometry for one width and shape
#[derive(Debug, Clone)]
struct Window {
    shape: NbrhdShape,
    /// Cells before the center along each axis
    lo: usize,
    /// Cells after the center along each axis
    hi: usize,
    /// Offsets `(dy, dx)` of a circular window
    offsets: Vec<(isize, isize)>,
    /// Cells in the full window
    n_cells: usize,
}

/// Widest window accepted for a field of shape `(ny, nx)`
pub fn max_width(ny: usize, nx: usize) -> usize {
    ny.max(nx).saturating_mul(2).saturating_add(1)
}

impl Window {
    fn new(shape: NbrhdShape, width: usize, (ny, nx): (usize, usize)) -> VerifyResult<Self> {
        let limit = max_width(ny, nx);
        if width > limit {
            return Err(PreconditionError::WindowTooWide {
                width,
                limit,
                shape: (ny, nx),
            }
            .into());
        }
        let lo = (width - 1) / 2;
        let hi = width / 2;
        let offsets = match shape {
            NbrhdShape::Square => Vec::new(),
            NbrhdShape::Circle => {
                let center = (hi as f64 - lo as f64) / 2.0;
                let r2 = (width as f64 / 2.0).powi(2);
                let mut offsets = Vec::new();
                for dy in -(lo as isize)..=hi as isize {
                    for dx in -(lo as isize)..=hi as isize {
                        let (y, x) = (dy as f64 - center, dx as f64 - center);
                        if y * y + x * x <= r2 {
                            offsets.push((dy, dx));
                        }
                    }
                }
                offsets
            }
        };
        let n_cells = match shape {
            NbrhdShape::Square => width * width,
            NbrhdShape::Circle => offsets.len(),
        };
        Ok(Self {
            shape,
            lo,
            hi,
            offsets,
            n_cells,
        })
    }
}

/// Event and valid-cell indicators with their summed-area tables
struct Indicators {
    ny: usize,
    nx: usize,
    event: Vec<u32>,
    valid: Vec<u32>,
    /// (ny + 1) x (nx + 1) prefix sums
    event_sat: Vec<u64>,
    valid_sat: Vec<u64>,
}

impl Indicators {
    fn new(field: &DataPlane, thresh: &ResolvedThreshold) -> Self {
        let (ny, nx) = field.shape();
        let mut event = vec![0u32; ny * nx];
        let mut valid = vec![0u32; ny * nx];
        for ((r, c), &v) in field.data().indexed_iter() {
            if is_valid(v) {
                valid[r * nx + c] = 1;
                event[r * nx + c] = u32::from(thresh.check(v));
            }
        }
        let event_sat = summed_area(&event, ny, nx);
        let valid_sat = summed_area(&valid, ny, nx);
        Self {
            ny,
            nx,
            event,
            valid,
            event_sat,
            valid_sat,
        }
    }

    fn rect_sum(sat: &[u64], nx: usize, r0: usize, c0: usize, r1: usize, c1: usize) -> u64 {
        // inclusive rows r0..=r1, cols c0..=c1
        let w = nx + 1;
        sat[(r1 + 1) * w + (c1 + 1)] + sat[r0 * w + c0]
            - sat[r0 * w + (c1 + 1)]
            - sat[(r1 + 1) * w + c0]
    }

    /// (events, valid cells) in the window around (r, c)
    fn counts(&self, win: &Window, r: usize, c: usize) -> (u64, u64) {
        match win.shape {
            NbrhdShape::Square => {
                let r0 = r.saturating_sub(win.lo);
                let c0 = c.saturating_sub(win.lo);
                let r1 = (r + win.hi).min(self.ny - 1);
                let c1 = (c + win.hi).min(self.nx - 1);
                (
                    Self::rect_sum(&self.event_sat, self.nx, r0, c0, r1, c1),
                    Self::rect_sum(&self.valid_sat, self.nx, r0, c0, r1, c1),
                )
            }
            NbrhdShape::Circle => {
                let (mut events, mut valid) = (0u64, 0u64);
                for &(dy, dx) in &win.offsets {
                    let (y, x) = (r as isize + dy, c as isize + dx);
                    if y < 0 || x < 0 || y >= self.ny as isize || x >= self.nx as isize {
                        continue;
                    }
                    let k = y as usize * self.nx + x as usize;
                    events += u64::from(self.event[k]);
                    valid += u64::from(self.valid[k]);
                }
                (events, valid)
            }
        }
    }

    fn fill_row(&self, win: &Window, vld_thresh: f64, r: usize, out: &mut [f64]) {
        for (c, cell) in out.iter_mut().enumerate() {
            *cell = if self.valid[r * self.nx + c] == 0 {
                BAD_DATA
            } else {
                let (events, valid) = self.counts(win, r, c);
                if (valid as f64) / (win.n_cells as f64) < vld_thresh {
                    BAD_DATA
                } else {
                    events as f64 / valid as f64
                }
            };
        }
    }
}

fn summed_area(values: &[u32], ny: usize, nx: usize) -> Vec<u64> {
    let w = nx + 1;
    let mut sat = vec![0u64; (ny + 1) * w];
    for r in 0..ny {
        let mut row_sum = 0u64;
        for c in 0..nx {
            row_sum += u64::from(values[r * nx + c]);
            sat[(r + 1) * w + (c + 1)] = sat[r * w + (c + 1)] + row_sum;
        }
    }
    sat
}

#[cfg(not(feature = "parallel"))]
fn fill_rows(ind: &Indicators, win: &Window, vld_thresh: f64, out: &mut [f64]) {
    for (r, row) in out.chunks_mut(ind.nx).enumerate() {
        ind.fill_row(win, vld_thresh, r, row);
    }
}

#[cfg(feature = "parallel")]
fn fill_rows(ind: &Indicators, win: &Window, vld_thresh: f64, out: &mut [f64]) {
    out.par_chunks_mut(ind.nx)
        .enumerate()
        .for_each(|(r, row)| ind.fill_row(win, vld_thresh, r, row));
}

fn validate_window(width: usize, vld_thresh: f64) -> VerifyResult<()> {
    if width == 0 {
        return Err(
            ConfigError::OutOfRange("neighborhood width must be at least 1".to_string()).into(),
        );
    }
    if !(0.0..=1.0).contains(&vld_thresh) {
        return Err(ConfigError::OutOfRange(format!(
            "valid-data fraction {vld_thresh} is outside [0, 1]"
        ))
        .into());
    }
    Ok(())
}

/// Fraction of each cell's neighborhood where `thresh` holds
pub fn fractional_coverage(
    field: &DataPlane,
    thresh: &ResolvedThreshold,
    shape: NbrhdShape,
    width: usize,
    vld_thresh: f64,
) -> VerifyResult<DataPlane> {
    validate_window(width, vld_thresh)?;
    let (ny, nx) = field.shape();
    if ny == 0 || nx == 0 {
        return Ok(field.clone());
    }
    let win = Window::new(shape, width, (ny, nx))?;
    let ind = Indicators::new(field, thresh);
    let mut out = vec![BAD_DATA; ny * nx];
    fill_rows(&ind, &win, vld_thresh, &mut out);
    DataPlane::from_vec(ny, nx, out)
}

/// Neighborhood categorical statistics for one coverage threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbrCtsInfo {
    pub width: usize,
    pub shape: NbrhdShape,
    pub raw_fthresh: ResolvedThreshold,
    pub raw_othresh: ResolvedThreshold,
    pub cov_thresh: ResolvedThreshold,
    pub cts: CtsInfo,
}

/// Neighborhood continuous statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbrCntInfo {
    pub width: usize,
    pub shape: NbrhdShape,
    pub raw_fthresh: ResolvedThreshold,
    pub raw_othresh: ResolvedThreshold,
    pub alpha: Vec<f64>,
    /// Cells where both coverage fields are valid
    pub total: usize,
    /// Fractions Brier score
    pub fbs: CiInfo,
    /// Fractions skill score
    pub fss: CiInfo,
    /// Asymptotic FSS from the event rates
    pub afss: CiInfo,
    /// FSS of a uniform forecast at the observed rate
    pub ufss: CiInfo,
    pub f_rate: CiInfo,
    pub o_rate: CiInfo,
}

/// (FBS, FSS) over matched coverage pairs
fn fbs_fss(pairs: &PairStore) -> [f64; 2] {
    let (mut n, mut diff, mut ff, mut oo) = (0usize, 0.0, 0.0, 0.0);
    for i in (0..pairs.len()).filter(|&i| pairs.is_valid_pair(i)) {
        let (f, o) = (pairs.f()[i], pairs.o()[i]);
        n += 1;
        diff += (f - o) * (f - o);
        ff += f * f;
        oo += o * o;
    }
    if n == 0 {
        return [BAD_DATA, BAD_DATA];
    }
    let n = n as f64;
    let fbs = diff / n;
    let reference = (ff + oo) / n;
    let fss = if reference > 0.0 { 1.0 - fbs / reference } else { BAD_DATA };
    [fbs, fss]
}

/// Event rate of the raw field over cells where the coverage pair is valid
fn event_rate(raw: &DataPlane, thresh: &ResolvedThreshold, mask: &[bool]) -> f64 {
    let (mut events, mut n) = (0usize, 0usize);
    for (&v, &m) in raw.data().iter().zip(mask) {
        if m && is_valid(v) {
            n += 1;
            if thresh.check(v) {
                events += 1;
            }
        }
    }
    if n == 0 {
        return BAD_DATA;
    }
    events as f64 / n as f64
}

/// Every neighborhood record for a forecast/observation field pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NbrhdOutput {
    pub cts: Vec<NbrCtsInfo>,
    pub cnt: Vec<NbrCntInfo>,
}

/// Neighborhood statistics for every width and raw threshold pair
///
/// Each (width, raw threshold) pair gets one [`NbrCntInfo`] and one
/// [`NbrCtsInfo`] per configured coverage threshold.
pub fn compute_nbrhd<R: Rng + ?Sized>(
    fcst: &DataPlane,
    obs: &DataPlane,
    raw_thresholds: &[(ResolvedThreshold, ResolvedThreshold)],
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<NbrhdOutput> {
    validation::validate_shape(fcst.shape(), obs.shape())?;
    config.validate()?;
    let nbrhd = &config.nbrhd;
    let cov_thresholds = nbrhd
        .coverage_thresholds()?
        .iter()
        .map(|t| t.resolve_fixed())
        .collect::<VerifyResult<Vec<_>>>()?;

    let mut output = NbrhdOutput::default();
    for &width in &nbrhd.widths {
        for (ft, ot) in raw_thresholds {
            let fcov = fractional_coverage(fcst, ft, nbrhd.shape, width, nbrhd.vld_thresh)?;
            let ocov = fractional_coverage(obs, ot, nbrhd.shape, width, nbrhd.vld_thresh)?;
            let pairs = fcov.pair_with(&ocov)?;
            debug!(
                width,
                fthresh = %ft,
                othresh = %ot,
                n_valid = pairs.valid_count(),
                "computing neighborhood statistics"
            );

            for cov in &cov_thresholds {
                let cts = compute_cts(&pairs, cov, cov, config, rng)?;
                output.cts.push(NbrCtsInfo {
                    width,
                    shape: nbrhd.shape,
                    raw_fthresh: ft.clone(),
                    raw_othresh: ot.clone(),
                    cov_thresh: cov.clone(),
                    cts,
                });
            }

            let cnt = nbr_cnt(&pairs, fcst, obs, (ft, ot), width, config, rng)?;
            output.cnt.push(cnt);
        }
    }
    Ok(output)
}

fn nbr_cnt<R: Rng + ?Sized>(
    pairs: &PairStore,
    fcst: &DataPlane,
    obs: &DataPlane,
    (ft, ot): (&ResolvedThreshold, &ResolvedThreshold),
    width: usize,
    config: &VerifyConfig,
    rng: &mut R,
) -> VerifyResult<NbrCntInfo> {
    let alpha = &config.ci.alpha;
    let [fbs, fss] = fbs_fss(pairs);
    let mask: Vec<bool> = (0..pairs.len()).map(|i| pairs.is_valid_pair(i)).collect();
    let f_rate = event_rate(fcst, ft, &mask);
    let o_rate = event_rate(obs, ot, &mask);
    let afss = if is_valid(f_rate) && is_valid(o_rate) {
        safe_div(2.0 * f_rate * o_rate, f_rate * f_rate + o_rate * o_rate)
    } else {
        BAD_DATA
    };
    let ufss = if is_valid(o_rate) { 0.5 + o_rate / 2.0 } else { BAD_DATA };

    let mut info = NbrCntInfo {
        width,
        shape: config.nbrhd.shape,
        raw_fthresh: ft.clone(),
        raw_othresh: ot.clone(),
        alpha: alpha.clone(),
        total: pairs.valid_count(),
        fbs: CiInfo::new(fbs, alpha),
        fss: CiInfo::new(fss, alpha),
        afss: CiInfo::new(afss, alpha),
        ufss: CiInfo::new(ufss, alpha),
        f_rate: CiInfo::new(f_rate, alpha),
        o_rate: CiInfo::new(o_rate, alpha),
    };

    if config.ci.bootstrap.n_rep > 0 {
        let targets = [BootTarget::new(fbs, 1), BootTarget::new(fss, 1)];
        let sample = pairs.valid_only();
        let bounds =
            Resampler::new(&config.ci).run(&sample, &targets, rng, |p| fbs_fss(p).to_vec())?;
        attach_bootstrap(vec![&mut info.fbs, &mut info.fss], bounds);
    }
    Ok(info)
}
