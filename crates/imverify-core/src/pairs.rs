//! Matched forecast/observation pairs
//!
//! A [`PairStore`] holds equal-length parallel sequences. Gridded data leaves
//! point metadata empty; array position carries the location. All subsetting
//! returns a new store and leaves the input untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bad_data::{is_bad_data, is_valid, BAD_DATA};
use crate::error::{validation, VerifyResult};
use crate::threshold::{PercentileSamples, ResolvedThreshold, SetLogic};

/// Per-pair metadata for point observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMeta {
    /// Station identifier
    pub sid: String,
    pub lat: f64,
    pub lon: f64,
    /// Vertical level of the observation
    pub lvl: f64,
    /// Station elevation
    pub elv: f64,
    pub valid_time: DateTime<Utc>,
}

/// Ordered set of matched pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStore {
    f: Vec<f64>,
    o: Vec<f64>,
    cmn: Vec<f64>,
    csd: Vec<f64>,
    wgt: Vec<f64>,
    meta: Option<Vec<PointMeta>>,
}

impl PairStore {
    /// Build from forecast and observation values with unit weights and no climatology
    pub fn new(f: Vec<f64>, o: Vec<f64>) -> VerifyResult<Self> {
        let n = f.len();
        Self::builder(f, o)
            .climo(vec![BAD_DATA; n], vec![BAD_DATA; n])
            .build()
    }

    /// Start a builder from forecast and observation values
    pub fn builder(f: Vec<f64>, o: Vec<f64>) -> PairStoreBuilder {
        PairStoreBuilder {
            f,
            o,
            cmn: None,
            csd: None,
            wgt: None,
            meta: None,
        }
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.f.len()
    }

    /// Check if there are no pairs
    pub fn is_empty(&self) -> bool {
        self.f.is_empty()
    }

    pub fn f(&self) -> &[f64] {
        &self.f
    }

    pub fn o(&self) -> &[f64] {
        &self.o
    }

    /// Climatological mean
    pub fn cmn(&self) -> &[f64] {
        &self.cmn
    }

    /// Climatological standard deviation
    pub fn csd(&self) -> &[f64] {
        &self.csd
    }

    /// Pair weights
    pub fn wgt(&self) -> &[f64] {
        &self.wgt
    }

    /// Point metadata, when present
    pub fn meta(&self) -> Option<&[PointMeta]> {
        self.meta.as_deref()
    }

    /// Whether pair `i` has valid forecast and observation values
    #[inline]
    pub fn is_valid_pair(&self, i: usize) -> bool {
        is_valid(self.f[i]) && is_valid(self.o[i]) && is_valid(self.wgt[i])
    }

    /// Whether pair `i` additionally has a valid climatological mean
    #[inline]
    pub fn has_climo_mean(&self, i: usize) -> bool {
        is_valid(self.cmn[i])
    }

    /// Whether pair `i` has a valid climatological mean and a positive standard deviation
    #[inline]
    pub fn has_climo_dist(&self, i: usize) -> bool {
        is_valid(self.cmn[i]) && is_valid(self.csd[i]) && self.csd[i] > 0.0
    }

    /// Number of pairs with valid forecast and observation
    pub fn valid_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_valid_pair(i)).count()
    }

    /// Whether any pair carries climatological means
    pub fn has_climo(&self) -> bool {
        self.cmn.iter().any(|&c| is_valid(c))
    }

    /// Samples for resolving sample-percentile thresholds
    pub fn percentile_samples(&self) -> PercentileSamples {
        PercentileSamples::from_data(&self.f, &self.o)
    }

    /// New store containing the pairs at `indices`, in order
    ///
    /// Repeated indices are allowed, which is how bootstrap replicates are formed.
    pub fn subset_by_indices(&self, indices: &[usize]) -> Self {
        let pick = |v: &[f64]| indices.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            f: pick(&self.f),
            o: pick(&self.o),
            cmn: pick(&self.cmn),
            csd: pick(&self.csd),
            wgt: pick(&self.wgt),
            meta: self
                .meta
                .as_ref()
                .map(|m| indices.iter().map(|&i| m[i].clone()).collect()),
        }
    }

    /// New store keeping pairs whose observation satisfies `thresh`
    pub fn subset_by_threshold(&self, thresh: &ResolvedThreshold) -> Self {
        let indices: Vec<usize> = (0..self.len())
            .filter(|&i| thresh.check_with_climo(self.o[i], self.cmn[i], self.csd[i]))
            .collect();
        self.subset_by_indices(&indices)
    }

    /// New store keeping pairs selected by a forecast/observation threshold pair
    ///
    /// A pair is kept when `logic.apply(fthresh(f), othresh(o))` holds. Pairs
    /// with bad forecast or observation values are always dropped.
    pub fn subset_by_filter(
        &self,
        fthresh: &ResolvedThreshold,
        othresh: &ResolvedThreshold,
        logic: SetLogic,
    ) -> Self {
        let indices: Vec<usize> = (0..self.len())
            .filter(|&i| self.is_valid_pair(i))
            .filter(|&i| {
                let fy = fthresh.check_with_climo(self.f[i], self.cmn[i], self.csd[i]);
                let oy = othresh.check_with_climo(self.o[i], self.cmn[i], self.csd[i]);
                logic.apply(fy, oy)
            })
            .collect();
        self.subset_by_indices(&indices)
    }

    /// New store with only the pairs valid for plain forecast/observation statistics
    pub fn valid_only(&self) -> Self {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| self.is_valid_pair(i)).collect();
        self.subset_by_indices(&indices)
    }

    /// Forecast and observation anomalies from the climatological mean
    ///
    /// Entries without climatology are the bad-data sentinel.
    pub fn anomalies(&self) -> (Vec<f64>, Vec<f64>) {
        let anom = |v: &[f64]| {
            v.iter()
                .zip(&self.cmn)
                .map(|(&x, &c)| {
                    if is_bad_data(x) || is_bad_data(c) {
                        BAD_DATA
                    } else {
                        x - c
                    }
                })
                .collect::<Vec<f64>>()
        };
        (anom(&self.f), anom(&self.o))
    }

    /// Concatenate two stores
    pub fn concat(&self, other: &PairStore) -> Self {
        let join = |a: &[f64], b: &[f64]| a.iter().chain(b).copied().collect::<Vec<f64>>();
        let meta = match (&self.meta, &other.meta) {
            (Some(a), Some(b)) => Some(a.iter().chain(b).cloned().collect()),
            _ => None,
        };
        Self {
            f: join(&self.f, &other.f),
            o: join(&self.o, &other.o),
            cmn: join(&self.cmn, &other.cmn),
            csd: join(&self.csd, &other.csd),
            wgt: join(&self.wgt, &other.wgt),
            meta,
        }
    }
}

/// Builder validating that all sequences share one length
#[derive(Debug, Clone)]
pub struct PairStoreBuilder {
    f: Vec<f64>,
    o: Vec<f64>,
    cmn: Option<Vec<f64>>,
    csd: Option<Vec<f64>>,
    wgt: Option<Vec<f64>>,
    meta: Option<Vec<PointMeta>>,
}

impl PairStoreBuilder {
    /// Attach climatological mean and standard deviation
    pub fn climo(mut self, cmn: Vec<f64>, csd: Vec<f64>) -> Self {
        self.cmn = Some(cmn);
        self.csd = Some(csd);
        self
    }

    /// Attach pair weights
    pub fn weights(mut self, wgt: Vec<f64>) -> Self {
        self.wgt = Some(wgt);
        self
    }

    /// Attach point metadata
    pub fn meta(mut self, meta: Vec<PointMeta>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Validate lengths and build
    pub fn build(self) -> VerifyResult<PairStore> {
        let n = self.f.len();
        validation::validate_length("observation", n, self.o.len())?;
        let cmn = self.cmn.unwrap_or_else(|| vec![BAD_DATA; n]);
        let csd = self.csd.unwrap_or_else(|| vec![BAD_DATA; n]);
        let wgt = self.wgt.unwrap_or_else(|| vec![1.0; n]);
        validation::validate_length("climatological mean", n, cmn.len())?;
        validation::validate_length("climatological stdev", n, csd.len())?;
        validation::validate_length("weight", n, wgt.len())?;
        if let Some(meta) = &self.meta {
            validation::validate_length("point metadata", n, meta.len())?;
        }
        Ok(PairStore {
            f: self.f,
            o: self.o,
            cmn,
            csd,
            wgt,
            meta: self.meta,
        })
    }
}
