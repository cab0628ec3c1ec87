//! Climatology-CDF binning
//!
//! Pairs are split into `n_bins` equal-probability bins by where the
//! observation falls in its climatological distribution. Bin `j` holds the
//! pairs whose climatological CDF value lies in `[j / n_bins, (j + 1) / n_bins)`;
//! a CDF value of exactly 1 goes to the last bin.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bad_data::is_valid;
use crate::dist::normal_cdf;
use crate::ecdf::rank_with_ties;
use crate::error::{ConfigError, VerifyResult};
use crate::pairs::PairStore;

/// How a pair's climatological CDF value is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimoCdfMethod {
    /// `Phi((o - cmn) / csd)`, needs a positive climatological standard deviation
    #[default]
    Normal,
    /// Rank of the observation anomaly `o - cmn` within the sample
    SampleRank,
}

/// Assigns pairs to climatology-CDF bins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimoCdfBinner {
    n_bins: usize,
    method: ClimoCdfMethod,
}

impl ClimoCdfBinner {
    pub fn new(n_bins: usize, method: ClimoCdfMethod) -> VerifyResult<Self> {
        if n_bins == 0 {
            return Err(ConfigError::OutOfRange(
                "climatology CDF bin count must be at least 1".to_string(),
            )
            .into());
        }
        Ok(Self { n_bins, method })
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn method(&self) -> ClimoCdfMethod {
        self.method
    }

    /// Climatological CDF value of each pair's observation
    ///
    /// `None` for pairs lacking the climatology this method needs.
    pub fn cdf_values(&self, pairs: &PairStore) -> Vec<Option<f64>> {
        let o = pairs.o();
        let cmn = pairs.cmn();
        match self.method {
            ClimoCdfMethod::Normal => (0..pairs.len())
                .map(|i| {
                    (is_valid(o[i]) && pairs.has_climo_dist(i))
                        .then(|| normal_cdf((o[i] - cmn[i]) / pairs.csd()[i]))
                })
                .collect(),
            ClimoCdfMethod::SampleRank => {
                let usable: Vec<usize> = (0..pairs.len())
                    .filter(|&i| is_valid(o[i]) && pairs.has_climo_mean(i))
                    .collect();
                let anom: Vec<f64> = usable.iter().map(|&i| o[i] - cmn[i]).collect();
                let (ranks, _) = rank_with_ties(&anom);
                let n = usable.len() as f64;
                let mut out = vec![None; pairs.len()];
                for (k, &i) in usable.iter().enumerate() {
                    out[i] = Some((ranks[k] - 1.0) / n);
                }
                out
            }
        }
    }

    /// Bin index of each pair, `None` when its climatology is missing
    pub fn assign(&self, pairs: &PairStore) -> Vec<Option<usize>> {
        self.cdf_values(pairs)
            .into_iter()
            .map(|cdf| cdf.map(|p| self.bin_of(p)))
            .collect()
    }

    /// Bin index for a CDF value in [0, 1]
    pub fn bin_of(&self, cdf: f64) -> usize {
        let j = (cdf.clamp(0.0, 1.0) * self.n_bins as f64).floor() as usize;
        j.min(self.n_bins - 1)
    }

    /// Split into one pair store per bin, dropping pairs without climatology
    pub fn split(&self, pairs: &PairStore) -> Vec<PairStore> {
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.n_bins];
        let mut dropped = 0usize;
        for (i, bin) in self.assign(pairs).into_iter().enumerate() {
            match bin {
                Some(j) => members[j].push(i),
                None => dropped += 1,
            }
        }
        debug!(
            n_bins = self.n_bins,
            dropped,
            sizes = ?members.iter().map(Vec::len).collect::<Vec<_>>(),
            "split pairs into climatology bins"
        );
        members
            .iter()
            .map(|idx| pairs.subset_by_indices(idx))
            .collect()
    }
}

impl Default for ClimoCdfBinner {
    fn default() -> Self {
        Self {
            n_bins: 1,
            method: ClimoCdfMethod::Normal,
        }
    }
}
