//! Bad-data sentinel
//!
//! Missing inputs and undefined statistics share a single sentinel value.
//! Formatting layers render it distinctly (for example as `NA`), so it must
//! never be confused with a legitimate zero.

/// Sentinel marking a missing input value or an undefined statistic
pub const BAD_DATA: f64 = -9999.0;

const BAD_DATA_TOL: f64 = 1.0e-6;

/// Check if a value is the bad-data sentinel or not a finite number
#[inline]
pub fn is_bad_data(x: f64) -> bool {
    !x.is_finite() || (x - BAD_DATA).abs() < BAD_DATA_TOL
}

/// Check if a value is usable in a computation
#[inline]
pub fn is_valid(x: f64) -> bool {
    !is_bad_data(x)
}

/// Map non-finite results to the sentinel
#[inline]
pub fn or_bad(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        BAD_DATA
    }
}

/// Divide, yielding the sentinel for a zero denominator or any bad operand
#[inline]
pub fn safe_div(num: f64, den: f64) -> f64 {
    if is_bad_data(num) || is_bad_data(den) || den == 0.0 {
        BAD_DATA
    } else {
        or_bad(num / den)
    }
}

/// Natural logarithm, yielding the sentinel for non-positive input
#[inline]
pub fn safe_log(x: f64) -> f64 {
    if is_bad_data(x) || x <= 0.0 {
        BAD_DATA
    } else {
        x.ln()
    }
}

/// Square root, yielding the sentinel for negative input
#[inline]
pub fn safe_sqrt(x: f64) -> f64 {
    if is_bad_data(x) || x < 0.0 {
        BAD_DATA
    } else {
        x.sqrt()
    }
}

/// Subtract two values, propagating the sentinel
#[inline]
pub fn bad_sub(a: f64, b: f64) -> f64 {
    if is_bad_data(a) || is_bad_data(b) {
        BAD_DATA
    } else {
        a - b
    }
}
