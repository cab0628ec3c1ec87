//! Bootstrap confidence intervals
//!
//! A [`Resampler`] runs one bootstrap computation through the states
//! `Idle -> Resampling -> Aggregating -> Done`. One sequence of resamples
//! feeds every statistic of a record, so all of a record's bounds come from
//! the same replicates.
//!
//! The generator is owned by the caller and passed by `&mut`. Indices are
//! drawn replicate by replicate, index by index, so results depend only on
//! the seed, the replicate count and the input.
//!
//! BCa bounds add a jackknife of `n` leave-one-out evaluations on top of
//! the `n_rep` replicates. On grid-sized samples (NBRCNT over a full field)
//! the jackknife dominates the run time; samples above
//! [`JACKKNIFE_WARN_SIZE`] log a warning.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use imverify_core::bad_data::{is_bad_data, is_valid};
use imverify_core::config::{BootstrapMethod, CiConfig, CiPolicy};
use imverify_core::dist::{normal_cdf, normal_inv};
use imverify_core::ecdf::percentile_sorted;
use imverify_core::error::{validation, VerifyResult};
use imverify_core::pairs::PairStore;

use crate::ci::CiBounds;

/// Generator for reproducible bootstrap draws
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// A sample that can be resampled by index
pub trait Resample: Sized {
    /// Number of rows
    fn len(&self) -> usize;

    /// Rows usable by the statistic
    fn valid_count(&self) -> usize;

    /// New sample made of the rows at `indices`, repeats allowed
    fn subset(&self, indices: &[usize]) -> Self;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resample for PairStore {
    fn len(&self) -> usize {
        PairStore::len(self)
    }

    fn valid_count(&self) -> usize {
        PairStore::valid_count(self)
    }

    fn subset(&self, indices: &[usize]) -> Self {
        self.subset_by_indices(indices)
    }
}

/// One statistic to attach bootstrap bounds to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootTarget {
    /// Full-sample estimate
    pub estimate: f64,
    /// Fewest valid rows for which bounds are computed
    pub min_pairs: usize,
}

impl BootTarget {
    pub fn new(estimate: f64, min_pairs: usize) -> Self {
        Self {
            estimate,
            min_pairs,
        }
    }
}

/// Progress of a bootstrap computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResamplerState {
    Idle,
    Resampling { completed: usize },
    Aggregating,
    Done,
}

/// Bootstrap engine for one record
#[derive(Debug, Clone)]
pub struct Resampler {
    method: BootstrapMethod,
    n_rep: usize,
    rep_prop: f64,
    alphas: Vec<f64>,
    policy: CiPolicy,
    state: ResamplerState,
}

impl Resampler {
    pub fn new(config: &CiConfig) -> Self {
        Self {
            method: config.bootstrap.method,
            n_rep: config.bootstrap.n_rep,
            rep_prop: config.bootstrap.rep_prop,
            alphas: config.alpha.clone(),
            policy: config.policy,
            state: ResamplerState::Idle,
        }
    }

    pub fn state(&self) -> ResamplerState {
        self.state
    }

    pub fn method(&self) -> BootstrapMethod {
        self.method
    }

    fn transition(&mut self, next: ResamplerState) {
        trace!(from = ?self.state, to = ?next, "resampler state");
        self.state = next;
    }

    /// Rows per replicate
    pub fn replicate_size(&self, n: usize) -> usize {
        ((self.rep_prop * n as f64).round() as usize).clamp(1, n.max(1))
    }

    /// Bootstrap bounds for every target, one `Vec` per target in alpha order
    ///
    /// `stat` computes all targets for a sample and must return one value per
    /// target. Targets whose sample is below their floor, or whose estimate is
    /// bad under [`CiPolicy::SkipWhenEstimateBad`], keep bad-data bounds.
    pub fn run<S, R, F>(
        &mut self,
        sample: &S,
        targets: &[BootTarget],
        rng: &mut R,
        stat: F,
    ) -> VerifyResult<Vec<Vec<CiBounds>>>
    where
        S: Resample,
        R: Rng + ?Sized,
        F: Fn(&S) -> Vec<f64>,
    {
        self.state = ResamplerState::Idle;
        let mut out: Vec<Vec<CiBounds>> = targets
            .iter()
            .map(|_| self.alphas.iter().map(|&a| CiBounds::bad(a)).collect())
            .collect();

        let n_valid = sample.valid_count();
        let active: Vec<bool> = targets
            .iter()
            .map(|t| {
                n_valid >= t.min_pairs.max(1)
                    && (self.policy == CiPolicy::AlwaysAttempt || is_valid(t.estimate))
            })
            .collect();

        if self.n_rep == 0 || !active.iter().any(|&a| a) {
            if self.n_rep > 0 {
                warn!(n_valid, "bootstrap skipped: insufficient sample");
            }
            self.transition(ResamplerState::Done);
            return Ok(out);
        }

        let n = sample.len();
        let m = self.replicate_size(n);
        let mut replicates: Vec<Vec<f64>> = vec![Vec::with_capacity(self.n_rep); targets.len()];
        let mut indices = vec![0usize; m];

        self.transition(ResamplerState::Resampling { completed: 0 });
        for r in 0..self.n_rep {
            for idx in indices.iter_mut() {
                *idx = rng.gen_range(0..n);
            }
            let values = stat(&sample.subset(&indices));
            validation::validate_length("bootstrap statistics", targets.len(), values.len())?;
            for (k, v) in values.into_iter().enumerate() {
                replicates[k].push(v);
            }
            self.state = ResamplerState::Resampling { completed: r + 1 };
        }

        self.transition(ResamplerState::Aggregating);
        let jackknife = match self.method {
            BootstrapMethod::Bca => Some(jackknife(sample, targets.len(), &stat)?),
            BootstrapMethod::Percentile => None,
        };

        for (k, target) in targets.iter().enumerate() {
            if !active[k] {
                continue;
            }
            let mut reps: Vec<f64> = replicates[k]
                .iter()
                .copied()
                .filter(|v| is_valid(*v))
                .collect();
            if reps.is_empty() {
                continue;
            }
            reps.sort_by(f64::total_cmp);
            out[k] = match &jackknife {
                None => self.percentile_bounds(&reps),
                Some(jack) => self.bca_bounds(&reps, target.estimate, &jack[k]),
            };
        }

        self.transition(ResamplerState::Done);
        Ok(out)
    }

    fn percentile_bounds(&self, sorted: &[f64]) -> Vec<CiBounds> {
        self.alphas
            .iter()
            .map(|&a| {
                CiBounds::new(
                    a,
                    percentile_sorted(sorted, a / 2.0),
                    percentile_sorted(sorted, 1.0 - a / 2.0),
                )
            })
            .collect()
    }

    fn bca_bounds(&self, sorted: &[f64], estimate: f64, jack: &[f64]) -> Vec<CiBounds> {
        let bad = || -> Vec<CiBounds> { self.alphas.iter().map(|&a| CiBounds::bad(a)).collect() };
        if is_bad_data(estimate) {
            return bad();
        }
        let below = sorted.partition_point(|&v| v < estimate);
        let z0 = normal_inv(below as f64 / sorted.len() as f64);
        if is_bad_data(z0) {
            return bad();
        }
        let acc = acceleration(jack);

        self.alphas
            .iter()
            .map(|&a| {
                let adjust = |p: f64| {
                    let z = normal_inv(p);
                    let num = z0 + z;
                    normal_cdf(z0 + num / (1.0 - acc * num))
                };
                CiBounds::new(
                    a,
                    percentile_sorted(sorted, adjust(a / 2.0)),
                    percentile_sorted(sorted, adjust(1.0 - a / 2.0)),
                )
            })
            .collect()
    }
}

/// Sample size above which the BCa jackknife logs a cost warning
pub const JACKKNIFE_WARN_SIZE: usize = 10_000;

/// Leave-one-out values of every statistic
fn jackknife<S, F>(sample: &S, n_stats: usize, stat: &F) -> VerifyResult<Vec<Vec<f64>>>
where
    S: Resample,
    F: Fn(&S) -> Vec<f64>,
{
    let n = sample.len();
    if n > JACKKNIFE_WARN_SIZE {
        warn!(
            n,
            limit = JACKKNIFE_WARN_SIZE,
            "BCa jackknife runs one statistic evaluation per pair"
        );
    }
    let mut out = vec![Vec::with_capacity(n); n_stats];
    let mut indices: Vec<usize> = Vec::with_capacity(n.saturating_sub(1));
    for skip in 0..n {
        indices.clear();
        indices.extend((0..n).filter(|&i| i != skip));
        let values = stat(&sample.subset(&indices));
        validation::validate_length("jackknife statistics", n_stats, values.len())?;
        for (k, v) in values.into_iter().enumerate() {
            out[k].push(v);
        }
    }
    Ok(out)
}

/// BCa acceleration from jackknife skewness; zero when undefined
fn acceleration(jack: &[f64]) -> f64 {
    let vals: Vec<f64> = jack.iter().copied().filter(|v| is_valid(*v)).collect();
    if vals.len() < 2 {
        return 0.0;
    }
    let mean = vals.iter().sum::<f64>() / vals.len() as f64;
    let (num, den) = vals.iter().fold((0.0, 0.0), |(n3, d2), &v| {
        let d = mean - v;
        (n3 + d * d * d, d2 + d * d)
    });
    if den <= 0.0 {
        return 0.0;
    }
    let a = num / (6.0 * den.powf(1.5));
    if a.is_finite() {
        a
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imverify_core::bad_data::BAD_DATA;

    fn mean_stat(p: &PairStore) -> Vec<f64> {
        let valid: Vec<f64> = (0..p.len())
            .filter(|&i| p.is_valid_pair(i))
            .map(|i| p.f()[i])
            .collect();
        if valid.is_empty() {
            return vec![BAD_DATA];
        }
        vec![valid.iter().sum::<f64>() / valid.len() as f64]
    }

    fn pairs(n: usize) -> PairStore {
        let f: Vec<f64> = (0..n).map(|i| ((i * 37) % 11) as f64).collect();
        PairStore::new(f.clone(), f).unwrap()
    }

    fn config(method: BootstrapMethod) -> CiConfig {
        let mut config = CiConfig::default();
        config.alpha = vec![0.01, 0.05, 0.1];
        config.bootstrap.method = method;
        config.bootstrap.n_rep = 200;
        config
    }

    #[test]
    fn test_state_machine_reaches_done() {
        let p = pairs(30);
        let est = mean_stat(&p)[0];
        let mut rs = Resampler::new(&config(BootstrapMethod::Percentile));
        assert_eq!(rs.state(), ResamplerState::Idle);
        let mut rng = seeded_rng(7);
        let out = rs
            .run(&p, &[BootTarget::new(est, 2)], &mut rng, mean_stat)
            .unwrap();
        assert_eq!(rs.state(), ResamplerState::Done);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 3);
        assert!(out[0].iter().all(|b| b.is_valid() && b.lower <= est && est <= b.upper));
    }

    #[test]
    fn test_percentile_nesting() {
        let p = pairs(40);
        let est = mean_stat(&p)[0];
        let mut rs = Resampler::new(&config(BootstrapMethod::Percentile));
        let out = rs
            .run(&p, &[BootTarget::new(est, 2)], &mut seeded_rng(3), mean_stat)
            .unwrap();
        let b = &out[0];
        assert!(b[0].contains(&b[1]));
        assert!(b[1].contains(&b[2]));
    }

    #[test]
    fn test_reproducible() {
        let p = pairs(25);
        let est = mean_stat(&p)[0];
        for method in [BootstrapMethod::Percentile, BootstrapMethod::Bca] {
            let run = || {
                Resampler::new(&config(method))
                    .run(&p, &[BootTarget::new(est, 2)], &mut seeded_rng(99), mean_stat)
                    .unwrap()
            };
            assert_eq!(run(), run());
        }
    }

    #[test]
    fn test_below_floor_is_bad() {
        let p = pairs(2);
        let mut rs = Resampler::new(&config(BootstrapMethod::Percentile));
        let out = rs
            .run(&p, &[BootTarget::new(1.0, 3)], &mut seeded_rng(1), mean_stat)
            .unwrap();
        assert!(out[0].iter().all(|b| !b.is_valid()));
        assert_eq!(rs.state(), ResamplerState::Done);
    }

    #[test]
    fn test_bad_estimate_policy() {
        let p = pairs(20);
        let mut cfg = config(BootstrapMethod::Percentile);
        let skip = Resampler::new(&cfg)
            .run(&p, &[BootTarget::new(BAD_DATA, 2)], &mut seeded_rng(1), mean_stat)
            .unwrap();
        assert!(skip[0].iter().all(|b| !b.is_valid()));

        cfg.policy = CiPolicy::AlwaysAttempt;
        let attempt = Resampler::new(&cfg)
            .run(&p, &[BootTarget::new(BAD_DATA, 2)], &mut seeded_rng(1), mean_stat)
            .unwrap();
        assert!(attempt[0].iter().all(|b| b.is_valid()));
    }

    #[test]
    fn test_replicate_size() {
        let mut cfg = CiConfig::default();
        cfg.bootstrap.rep_prop = 0.5;
        let rs = Resampler::new(&cfg);
        assert_eq!(rs.replicate_size(10), 5);
        assert_eq!(rs.replicate_size(1), 1);
    }

    #[test]
    fn test_bca_brackets_estimate() {
        let p = pairs(50);
        let est = mean_stat(&p)[0];
        let mut rs = Resampler::new(&config(BootstrapMethod::Bca));
        let out = rs
            .run(&p, &[BootTarget::new(est, 2)], &mut seeded_rng(11), mean_stat)
            .unwrap();
        assert!(out[0].iter().all(|b| b.is_valid()));
        assert!(out[0][1].lower < est && est < out[0][1].upper);
    }
}
