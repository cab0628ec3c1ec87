//! Configuration for imverify
//!
//! Confidence-interval, climatology binning, neighborhood, and continuous
//! statistics settings. Loaded from TOML or JSON by the caller and passed
//! into each compute call.

use serde::{Deserialize, Serialize};

use crate::climo::{ClimoCdfBinner, ClimoCdfMethod};
use crate::error::{validation, ConfigError, VerifyResult};
use crate::threshold::{parse_threshold, SetLogic, Threshold};

/// Top-level verification configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Confidence interval settings
    pub ci: CiConfig,
    /// Climatology-CDF binning
    pub climo_cdf: ClimoCdfConfig,
    /// Neighborhood settings
    pub nbrhd: NbrhdConfig,
    /// Continuous statistics settings
    pub cnt: CntConfig,
    /// Expected-correct fraction for HSS_EC; `None` uses 1 / categories
    pub hss_ec_value: Option<f64>,
}

/// Confidence interval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    /// Significance levels, each in (0, 1)
    pub alpha: Vec<f64>,
    /// Compute normal-theory intervals
    pub normal: bool,
    /// Bootstrap settings
    pub bootstrap: BootstrapConfig,
    /// What to do when the point estimate is itself bad data
    pub policy: CiPolicy,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            alpha: vec![0.05],
            normal: true,
            bootstrap: BootstrapConfig::default(),
            policy: CiPolicy::default(),
        }
    }
}

/// Bootstrap interval method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapMethod {
    #[default]
    Percentile,
    /// Bias-corrected and accelerated
    ///
    /// The acceleration comes from a jackknife costing one extra statistic
    /// evaluation per pair.
    Bca,
}

/// Handling of intervals for a statistic whose estimate is bad data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiPolicy {
    /// Leave both bounds as bad data without computing them
    #[default]
    SkipWhenEstimateBad,
    /// Compute the bounds anyway; they are bad data only if the computation is
    AlwaysAttempt,
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub method: BootstrapMethod,
    /// Replicate count; zero disables bootstrap intervals
    pub n_rep: usize,
    /// Replicate size as a proportion of the sample, in (0, 1]
    pub rep_prop: f64,
    /// Generator seed
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            method: BootstrapMethod::Percentile,
            n_rep: 1000,
            rep_prop: 1.0,
            seed: 1,
        }
    }
}

/// Climatology-CDF binning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimoCdfConfig {
    pub n_bins: usize,
    pub method: ClimoCdfMethod,
}

impl Default for ClimoCdfConfig {
    fn default() -> Self {
        Self {
            n_bins: 1,
            method: ClimoCdfMethod::Normal,
        }
    }
}

impl ClimoCdfConfig {
    /// Build the binner for this configuration
    pub fn binner(&self) -> VerifyResult<ClimoCdfBinner> {
        ClimoCdfBinner::new(self.n_bins, self.method)
    }
}

/// Neighborhood shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NbrhdShape {
    #[default]
    Square,
    Circle,
}

/// Neighborhood configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NbrhdConfig {
    pub shape: NbrhdShape,
    /// Neighborhood widths in grid cells
    pub widths: Vec<usize>,
    /// Minimum fraction of valid cells in a neighborhood, in [0, 1]
    pub vld_thresh: f64,
    /// Fractional coverage thresholds
    pub cov_thresh: Vec<String>,
}

impl Default for NbrhdConfig {
    fn default() -> Self {
        Self {
            shape: NbrhdShape::Square,
            widths: vec![1],
            vld_thresh: 1.0,
            cov_thresh: vec![">=0.5".to_string()],
        }
    }
}

impl NbrhdConfig {
    /// Parse the coverage thresholds
    pub fn coverage_thresholds(&self) -> VerifyResult<Vec<Threshold>> {
        self.cov_thresh.iter().map(|s| parse_threshold(s)).collect()
    }
}

/// Continuous statistics configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CntConfig {
    /// Treat the variable as precipitation
    pub precip: bool,
    /// Compute Spearman and Kendall rank correlations
    pub rank_corr: bool,
    /// Combination of forecast and observation filtering thresholds
    pub logic: SetLogic,
}

impl VerifyConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> VerifyResult<Self> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Document(e.to_string()).into())
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> VerifyResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Document(e.to_string()).into())
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> VerifyResult<Self> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Document(e.to_string()).into())
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> VerifyResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Document(e.to_string()).into())
    }

    /// Validate configuration values
    pub fn validate(&self) -> VerifyResult<()> {
        validation::validate_alphas(&self.ci.alpha)?;

        let boot = &self.ci.bootstrap;
        if !(boot.rep_prop > 0.0 && boot.rep_prop <= 1.0) {
            return Err(ConfigError::OutOfRange(format!(
                "rep_prop {} must lie in (0, 1]",
                boot.rep_prop
            ))
            .into());
        }

        if self.climo_cdf.n_bins == 0 {
            return Err(
                ConfigError::OutOfRange("climo_cdf.n_bins must be at least 1".to_string()).into(),
            );
        }

        if self.nbrhd.widths.iter().any(|&w| w == 0) {
            return Err(
                ConfigError::OutOfRange("neighborhood widths must be positive".to_string()).into(),
            );
        }

        if !(0.0..=1.0).contains(&self.nbrhd.vld_thresh) {
            return Err(ConfigError::OutOfRange(format!(
                "vld_thresh {} must lie in [0, 1]",
                self.nbrhd.vld_thresh
            ))
            .into());
        }
        for t in self.nbrhd.coverage_thresholds()? {
            if t.needs_sample() || t.needs_climo() {
                return Err(ConfigError::UnsupportedThreshold {
                    thresh: t.to_string(),
                    message: "coverage thresholds apply to fractions and must be fixed".to_string(),
                }
                .into());
            }
        }

        if let Some(ec) = self.hss_ec_value {
            if !(0.0..1.0).contains(&ec) {
                return Err(ConfigError::OutOfRange(format!(
                    "hss_ec_value {ec} must lie in [0, 1)"
                ))
                .into());
            }
        }

        Ok(())
    }
}
