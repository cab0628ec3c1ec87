//! imverify-core - Verification primitives for forecast/observation matching
//!
//! This crate provides the building blocks the statistics engines consume:
//!
//! - **Threshold**: comparison, interval and percentile thresholds with a string grammar
//! - **PairStore**: matched forecast/observation sequences with climatology and weights
//! - **Contingency tables**: 2x2 and NxN counts with derived categorical scores
//! - **ClimoCdfBinner**: equal-probability climatology bins
//! - **DataPlane**: 2-D gridded fields for neighborhood methods
//! - **VerifyConfig**: confidence interval, bootstrap and neighborhood settings
//!
//! Missing inputs and undefined statistics are both the [`BAD_DATA`] sentinel.

pub mod bad_data;
pub mod climo;
pub mod config;
pub mod contingency;
pub mod dist;
pub mod ecdf;
pub mod error;
pub mod grid;
pub mod pairs;
pub mod threshold;

pub use bad_data::{is_bad_data, is_valid, BAD_DATA};
pub use climo::*;
pub use config::*;
pub use contingency::*;
pub use ecdf::Ecdf;
pub use error::{ConfigError, PreconditionError, VerifyError, VerifyResult};
pub use grid::DataPlane;
pub use pairs::*;
pub use threshold::*;
