//! Distribution helpers shared by thresholds, binning, and interval code

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

use crate::bad_data::BAD_DATA;

/// Standard normal cumulative distribution function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Inverse of the standard normal CDF
///
/// Returns `BAD_DATA` outside the open interval (0, 1).
pub fn normal_inv(p: f64) -> f64 {
    if !(p > 0.0 && p < 1.0) {
        return BAD_DATA;
    }
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Principal branch of the Lambert W function for x >= -1/e
///
/// Halley iteration from a log-based starting point.
pub fn lambert_w(x: f64) -> f64 {
    let branch_point = -(-1.0f64).exp();
    if !x.is_finite() || x < branch_point {
        return BAD_DATA;
    }
    if x == 0.0 {
        return 0.0;
    }

    let mut w = if x < 1.0 {
        let p = (2.0 * (std::f64::consts::E * x + 1.0)).sqrt();
        -1.0 + p - p * p / 3.0
    } else {
        let l = x.ln();
        l - l.max(1.0).ln().max(0.0)
    };

    for _ in 0..64 {
        let ew = w.exp();
        let f = w * ew - x;
        let wp1 = w + 1.0;
        if wp1.abs() < 1e-300 {
            break;
        }
        let step = f / (ew * wp1 - (w + 2.0) * f / (2.0 * wp1));
        w -= step;
        if step.abs() <= 1e-14 * (1.0 + w.abs()) {
            break;
        }
    }
    w
}
