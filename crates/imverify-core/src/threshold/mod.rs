//! Thresholds
//!
//! A [`Threshold`] is created from configuration, resolved once per
//! verification task against the current sample, and the resulting
//! [`ResolvedThreshold`] is used for every comparison in that task.
//!
//! Percentile thresholds come in two flavors:
//!
//! - **PercentileOfSample** (`>=SFP90`, `<SOP25`) resolves to one numeric
//!   value from the forecast or observation sample.
//! - **PercentileOfClimoDist** (`>CDP75`) resolves per pair from the
//!   climatological mean and standard deviation, assuming normality.

mod parser;

pub use parser::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bad_data::is_bad_data;
use crate::dist::normal_inv;
use crate::ecdf::Ecdf;
use crate::error::{ConfigError, PreconditionError, VerifyResult};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Greater than or equal (>=)
    Ge,
    /// Greater than (>)
    Gt,
    /// Less than or equal (<=)
    Le,
    /// Less than (<)
    Lt,
    /// Equal (==)
    Eq,
    /// Not equal (!=)
    Ne,
}

impl CompareOp {
    /// Apply the operator
    #[inline]
    pub fn apply(self, x: f64, value: f64) -> bool {
        match self {
            CompareOp::Ge => x >= value,
            CompareOp::Gt => x > value,
            CompareOp::Le => x <= value,
            CompareOp::Lt => x < value,
            CompareOp::Eq => x == value,
            CompareOp::Ne => x != value,
        }
    }

    /// Symbolic form
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Which sample a sample-percentile threshold is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleSource {
    Forecast,
    Observation,
}

/// Threshold kind, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreshKind {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
    Between,
    PercentileOfSample,
    PercentileOfClimoDist,
    Na,
}

/// A single threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    /// Fixed comparison against a value
    Compare { op: CompareOp, value: f64 },
    /// Half-open interval: lower <= x < upper
    Between { lower: f64, upper: f64 },
    /// Percentile of the forecast or observation sample (percentile in [0, 100])
    PercentileOfSample {
        op: CompareOp,
        source: SampleSource,
        percentile: f64,
    },
    /// Percentile of the per-pair climatological distribution (percentile in (0, 100))
    PercentileOfClimoDist { op: CompareOp, percentile: f64 },
    /// Always true
    Na,
}

impl Threshold {
    pub fn ge(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Ge,
            value,
        }
    }

    pub fn gt(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Gt,
            value,
        }
    }

    pub fn le(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Le,
            value,
        }
    }

    pub fn lt(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Lt,
            value,
        }
    }

    pub fn equal(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Eq,
            value,
        }
    }

    pub fn not_equal(value: f64) -> Self {
        Self::Compare {
            op: CompareOp::Ne,
            value,
        }
    }

    /// Create an interval threshold, requiring lower <= upper
    pub fn between(lower: f64, upper: f64) -> VerifyResult<Self> {
        if !(lower <= upper) {
            return Err(PreconditionError::InvalidInterval { lower, upper }.into());
        }
        Ok(Self::Between { lower, upper })
    }

    /// Create a sample-percentile threshold
    pub fn sample_percentile(
        op: CompareOp,
        source: SampleSource,
        percentile: f64,
    ) -> VerifyResult<Self> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(ConfigError::OutOfRange(format!(
                "sample percentile {percentile} must lie in [0, 100]"
            ))
            .into());
        }
        Ok(Self::PercentileOfSample {
            op,
            source,
            percentile,
        })
    }

    /// Create a climatological-distribution percentile threshold
    pub fn climo_percentile(op: CompareOp, percentile: f64) -> VerifyResult<Self> {
        if !(percentile > 0.0 && percentile < 100.0) {
            return Err(ConfigError::OutOfRange(format!(
                "climatology percentile {percentile} must lie in (0, 100)"
            ))
            .into());
        }
        Ok(Self::PercentileOfClimoDist { op, percentile })
    }

    /// The configured kind
    pub fn kind(&self) -> ThreshKind {
        match self {
            Threshold::Compare { op, .. } => match op {
                CompareOp::Ge => ThreshKind::Ge,
                CompareOp::Gt => ThreshKind::Gt,
                CompareOp::Le => ThreshKind::Le,
                CompareOp::Lt => ThreshKind::Lt,
                CompareOp::Eq => ThreshKind::Eq,
                CompareOp::Ne => ThreshKind::Ne,
            },
            Threshold::Between { .. } => ThreshKind::Between,
            Threshold::PercentileOfSample { .. } => ThreshKind::PercentileOfSample,
            Threshold::PercentileOfClimoDist { .. } => ThreshKind::PercentileOfClimoDist,
            Threshold::Na => ThreshKind::Na,
        }
    }

    /// Whether resolution against a sample is required before use
    pub fn needs_sample(&self) -> bool {
        matches!(self, Threshold::PercentileOfSample { .. })
    }

    /// Whether evaluation needs per-pair climatology
    pub fn needs_climo(&self) -> bool {
        matches!(self, Threshold::PercentileOfClimoDist { .. })
    }

    /// Evaluate a fixed threshold against a scalar
    ///
    /// Bad data never matches. Percentile thresholds never match here; use
    /// [`Threshold::resolve`] and [`ResolvedThreshold::check_with_climo`].
    pub fn check(&self, x: f64) -> bool {
        if is_bad_data(x) {
            return false;
        }
        match *self {
            Threshold::Compare { op, value } => op.apply(x, value),
            Threshold::Between { lower, upper } => lower <= x && x < upper,
            Threshold::Na => true,
            Threshold::PercentileOfSample { .. } | Threshold::PercentileOfClimoDist { .. } => false,
        }
    }

    /// Resolve against the samples of the current task
    pub fn resolve(&self, samples: &PercentileSamples) -> VerifyResult<ResolvedThreshold> {
        let test = match *self {
            Threshold::Compare { op, value } => ThreshTest::Compare { op, value },
            Threshold::Between { lower, upper } => {
                if !(lower <= upper) {
                    return Err(PreconditionError::InvalidInterval { lower, upper }.into());
                }
                ThreshTest::Between { lower, upper }
            }
            Threshold::Na => ThreshTest::Always,
            Threshold::PercentileOfSample {
                op,
                source,
                percentile,
            } => {
                let ecdf = match source {
                    SampleSource::Forecast => samples.forecast.as_ref(),
                    SampleSource::Observation => samples.observation.as_ref(),
                };
                let value = ecdf
                    .filter(|e| !e.is_empty())
                    .map(|e| e.percentile(percentile / 100.0))
                    .ok_or_else(|| PreconditionError::UnresolvedPercentile {
                        thresh: self.to_string(),
                    })?;
                ThreshTest::Compare { op, value }
            }
            Threshold::PercentileOfClimoDist { op, percentile } => ThreshTest::Climo {
                op,
                z: normal_inv(percentile / 100.0),
            },
        };
        Ok(ResolvedThreshold {
            source: self.clone(),
            test,
        })
    }

    /// Resolve a threshold that does not depend on the sample
    pub fn resolve_fixed(&self) -> VerifyResult<ResolvedThreshold> {
        if self.needs_sample() {
            return Err(PreconditionError::UnresolvedPercentile {
                thresh: self.to_string(),
            }
            .into());
        }
        self.resolve(&PercentileSamples::default())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Compare { op, value } => write!(f, "{}{}", op.symbol(), value),
            Threshold::Between { lower, upper } => write!(f, "[{},{})", lower, upper),
            Threshold::PercentileOfSample {
                op,
                source,
                percentile,
            } => {
                let tag = match source {
                    SampleSource::Forecast => "SFP",
                    SampleSource::Observation => "SOP",
                };
                write!(f, "{}{}{}", op.symbol(), tag, percentile)
            }
            Threshold::PercentileOfClimoDist { op, percentile } => {
                write!(f, "{}CDP{}", op.symbol(), percentile)
            }
            Threshold::Na => write!(f, "NA"),
        }
    }
}

/// Samples used to resolve sample-percentile thresholds
#[derive(Debug, Clone, Default)]
pub struct PercentileSamples {
    pub forecast: Option<Ecdf>,
    pub observation: Option<Ecdf>,
}

impl PercentileSamples {
    /// Build from raw forecast and observation values
    pub fn from_data(forecast: &[f64], observation: &[f64]) -> Self {
        Self {
            forecast: Some(Ecdf::from_data(forecast)),
            observation: Some(Ecdf::from_data(observation)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum ThreshTest {
    Always,
    Compare { op: CompareOp, value: f64 },
    Between { lower: f64, upper: f64 },
    Climo { op: CompareOp, z: f64 },
}

/// A threshold ready for comparisons within one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedThreshold {
    source: Threshold,
    test: ThreshTest,
}

impl ResolvedThreshold {
    /// The always-true threshold
    pub fn na() -> Self {
        Self {
            source: Threshold::Na,
            test: ThreshTest::Always,
        }
    }

    /// The threshold this was resolved from
    pub fn source(&self) -> &Threshold {
        &self.source
    }

    /// The resolved numeric value, when there is a single one
    pub fn value(&self) -> Option<f64> {
        match self.test {
            ThreshTest::Compare { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The comparison operator, when there is one
    pub fn op(&self) -> Option<CompareOp> {
        match self.test {
            ThreshTest::Compare { op, .. } | ThreshTest::Climo { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Whether evaluation needs per-pair climatology
    pub fn needs_climo(&self) -> bool {
        matches!(self.test, ThreshTest::Climo { .. })
    }

    /// Lower and upper bounds of the region this threshold accepts
    ///
    /// `(lower, lower_inclusive, upper, upper_inclusive)`, or `None` when the
    /// accepted region is not a single interval.
    pub fn interval(&self) -> Option<(f64, bool, f64, bool)> {
        match self.test {
            ThreshTest::Always => Some((f64::NEG_INFINITY, false, f64::INFINITY, false)),
            ThreshTest::Between { lower, upper } => Some((lower, true, upper, false)),
            ThreshTest::Compare { op, value } => match op {
                CompareOp::Ge => Some((value, true, f64::INFINITY, false)),
                CompareOp::Gt => Some((value, false, f64::INFINITY, false)),
                CompareOp::Le => Some((f64::NEG_INFINITY, false, value, true)),
                CompareOp::Lt => Some((f64::NEG_INFINITY, false, value, false)),
                CompareOp::Eq => Some((value, true, value, true)),
                CompareOp::Ne => None,
            },
            ThreshTest::Climo { .. } => None,
        }
    }

    /// Evaluate against a scalar; climatology thresholds never match here
    #[inline]
    pub fn check(&self, x: f64) -> bool {
        if is_bad_data(x) {
            return false;
        }
        match self.test {
            ThreshTest::Always => true,
            ThreshTest::Compare { op, value } => op.apply(x, value),
            ThreshTest::Between { lower, upper } => lower <= x && x < upper,
            ThreshTest::Climo { .. } => false,
        }
    }

    /// Evaluate against a scalar with the pair's climatology
    #[inline]
    pub fn check_with_climo(&self, x: f64, cmn: f64, csd: f64) -> bool {
        match self.test {
            ThreshTest::Climo { op, z } => {
                if is_bad_data(x) || is_bad_data(cmn) || is_bad_data(csd) || is_bad_data(z) {
                    return false;
                }
                op.apply(x, cmn + csd * z)
            }
            _ => self.check(x),
        }
    }

    /// The per-pair threshold value for a climatology percentile
    pub fn climo_value(&self, cmn: f64, csd: f64) -> Option<f64> {
        match self.test {
            ThreshTest::Climo { z, .. } if !is_bad_data(cmn) && !is_bad_data(csd) => {
                Some(cmn + csd * z)
            }
            ThreshTest::Compare { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.test) {
            (Threshold::PercentileOfSample { .. }, ThreshTest::Compare { value, .. }) => {
                write!(f, "{}({})", self.source, value)
            }
            _ => write!(f, "{}", self.source),
        }
    }
}

/// Combination logic for a forecast/observation threshold pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetLogic {
    /// Either condition holds
    #[default]
    Union,
    /// Both conditions hold
    Intersection,
    /// Exactly one condition holds
    SymDiff,
}

impl SetLogic {
    /// Combine two conditions
    #[inline]
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            SetLogic::Union => a || b,
            SetLogic::Intersection => a && b,
            SetLogic::SymDiff => a != b,
        }
    }
}

/// Ordered category partition derived from monotonic thresholds
///
/// N thresholds define N + 1 half-open categories. A value is assigned to the
/// first category whose interval contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBins {
    thresholds: Vec<ResolvedThreshold>,
    /// (lower, lower_inclusive, upper, upper_inclusive) per category
    intervals: Vec<(f64, bool, f64, bool)>,
}

impl CategoryBins {
    /// Validate thresholds and build the partition
    ///
    /// Thresholds must share one direction (all `>=`/`>` or all `<=`/`<`)
    /// and strictly increase in value.
    pub fn new(thresholds: &[ResolvedThreshold]) -> VerifyResult<Self> {
        if thresholds.is_empty() {
            return Err(PreconditionError::NonCoveringThresholds {
                message: "at least one threshold is required".to_string(),
            }
            .into());
        }

        let mut bounds = Vec::with_capacity(thresholds.len());
        let mut upward = None;
        for t in thresholds {
            let (op, value) = match (t.op(), t.value()) {
                (Some(op), Some(value)) => (op, value),
                _ => {
                    return Err(PreconditionError::NonCoveringThresholds {
                        message: format!("'{t}' cannot bound a category"),
                    }
                    .into())
                }
            };
            let dir = match op {
                CompareOp::Ge | CompareOp::Gt => true,
                CompareOp::Le | CompareOp::Lt => false,
                CompareOp::Eq | CompareOp::Ne => {
                    return Err(PreconditionError::NonCoveringThresholds {
                        message: format!("'{t}' cannot bound a category"),
                    }
                    .into())
                }
            };
            if *upward.get_or_insert(dir) != dir {
                return Err(PreconditionError::NonCoveringThresholds {
                    message: "thresholds mix upward and downward comparisons".to_string(),
                }
                .into());
            }
            // Boundary value belongs to the upper category for >= and <
            let boundary_in_upper = matches!(op, CompareOp::Ge | CompareOp::Lt);
            bounds.push((value, boundary_in_upper));
        }

        for w in bounds.windows(2) {
            if !(w[0].0 < w[1].0) {
                return Err(PreconditionError::NonMonotonicThresholds {
                    message: format!("{} followed by {}", w[0].0, w[1].0),
                }
                .into());
            }
        }

        let mut intervals = Vec::with_capacity(bounds.len() + 1);
        let mut lower = (f64::NEG_INFINITY, false);
        for &(value, in_upper) in &bounds {
            intervals.push((lower.0, lower.1, value, !in_upper));
            lower = (value, in_upper);
        }
        intervals.push((lower.0, lower.1, f64::INFINITY, false));

        Ok(Self {
            thresholds: thresholds.to_vec(),
            intervals,
        })
    }

    /// Number of categories (thresholds + 1)
    pub fn n_categories(&self) -> usize {
        self.intervals.len()
    }

    /// The thresholds defining the partition
    pub fn thresholds(&self) -> &[ResolvedThreshold] {
        &self.thresholds
    }

    /// Category index of a value; `None` for bad data
    pub fn category(&self, x: f64) -> Option<usize> {
        if is_bad_data(x) {
            return None;
        }
        self.intervals.iter().position(|&(lo, lo_inc, hi, hi_inc)| {
            let above = if lo_inc { x >= lo } else { x > lo };
            let below = if hi_inc { x <= hi } else { x < hi };
            above && below
        })
    }
}
