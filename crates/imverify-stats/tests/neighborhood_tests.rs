//! Neighborhood method integration tests

mod common;

use common::fixtures::{ge, normal_only};
use imverify_core::{
    ConfigError, DataPlane, NbrhdShape, PreconditionError, VerifyConfig, VerifyError, BAD_DATA,
};
use imverify_stats::bootstrap::seeded_rng;
use imverify_stats::neighborhood::{compute_nbrhd, fractional_coverage, max_width};
use proptest::prelude::*;
use rstest::rstest;

fn nbrhd_config(widths: &[usize], cov: &[&str], vld_thresh: f64) -> VerifyConfig {
    let mut config = normal_only();
    config.nbrhd.widths = widths.to_vec();
    config.nbrhd.cov_thresh = cov.iter().map(|s| s.to_string()).collect();
    config.nbrhd.vld_thresh = vld_thresh;
    config
}

// === Fractional coverage ===

#[rstest]
#[case(NbrhdShape::Square)]
#[case(NbrhdShape::Circle)]
fn test_all_ones_center(#[case] shape: NbrhdShape) {
    let field = DataPlane::filled(3, 3, 1.0);
    let cov = fractional_coverage(&field, &ge(1.0), shape, 3, 1.0).unwrap();
    assert!((cov.get(1, 1) - 1.0).abs() < 1e-12);
}

#[test]
fn test_missing_cell_poisons_touching_neighborhoods() {
    let mut field = DataPlane::filled(7, 7, 1.0);
    field.set(3, 3, BAD_DATA);
    let cov = fractional_coverage(&field, &ge(1.0), NbrhdShape::Square, 3, 1.0).unwrap();
    for r in 1usize..6 {
        for c in 1usize..6 {
            let touches = r.abs_diff(3) <= 1 && c.abs_diff(3) <= 1;
            if touches {
                assert_eq!(cov.get(r, c), BAD_DATA, "cell ({r}, {c})");
            } else {
                assert!((cov.get(r, c) - 1.0).abs() < 1e-12, "cell ({r}, {c})");
            }
        }
    }
}

#[test]
fn test_oversized_width_is_rejected() {
    let field = DataPlane::filled(3, 4, 1.0);
    assert_eq!(max_width(3, 4), 9);
    assert!(fractional_coverage(&field, &ge(1.0), NbrhdShape::Square, 9, 1.0).is_ok());
    for width in [10, usize::MAX] {
        let result = fractional_coverage(&field, &ge(1.0), NbrhdShape::Circle, width, 1.0);
        assert!(matches!(
            result,
            Err(VerifyError::Precondition(PreconditionError::WindowTooWide { limit: 9, .. }))
        ));
    }
}

#[test]
fn test_empty_field() {
    let field = DataPlane::filled(0, 0, 0.0);
    let cov = fractional_coverage(&field, &ge(1.0), NbrhdShape::Square, 3, 1.0).unwrap();
    assert_eq!(cov.shape(), (0, 0));
}

// === Neighborhood statistics ===

#[test]
fn test_record_counts() {
    let field = DataPlane::filled(5, 5, 2.0);
    let config = nbrhd_config(&[1, 3, 5], &[">=0.25", ">=0.5", ">=0.75"], 0.0);
    let raw = [(ge(1.0), ge(1.0)), (ge(3.0), ge(3.0))];
    let out = compute_nbrhd(&field, &field, &raw, &config, &mut seeded_rng(1)).unwrap();
    assert_eq!(out.cnt.len(), 3 * 2);
    assert_eq!(out.cts.len(), 3 * 2 * 3);
    assert_eq!(out.cnt[0].width, 1);
    assert_eq!(out.cnt.last().map(|c| c.width), Some(5));
}

#[test]
fn test_displaced_event_gains_skill_with_width() {
    // the same event shifted one column
    let mut fcst = DataPlane::filled(9, 9, 0.0);
    let mut obs = DataPlane::filled(9, 9, 0.0);
    fcst.set(4, 3, 1.0);
    obs.set(4, 4, 1.0);
    let config = nbrhd_config(&[1, 3, 5], &[">0"], 0.0);
    let out = compute_nbrhd(&fcst, &obs, &[(ge(1.0), ge(1.0))], &config, &mut seeded_rng(1)).unwrap();
    let fss: Vec<f64> = out.cnt.iter().map(|c| c.fss.estimate).collect();
    assert!(fss[0].abs() < 1e-12);
    assert!(fss[1] > fss[0]);
    assert!(fss[2] > fss[1]);
    for cnt in &out.cnt {
        // equal event counts give a perfect asymptotic score
        assert!((cnt.afss.estimate - 1.0).abs() < 1e-12);
        assert!((cnt.ufss.estimate - (0.5 + cnt.o_rate.estimate / 2.0)).abs() < 1e-12);
    }
}

#[test]
fn test_nbrcnt_bootstrap_is_seeded() {
    let values: Vec<f64> = (0..100).map(|i| ((i * 13) % 7) as f64).collect();
    let fcst = DataPlane::from_vec(10, 10, values.clone()).unwrap();
    let obs = DataPlane::from_vec(10, 10, values.into_iter().rev().collect()).unwrap();
    let mut config = nbrhd_config(&[3], &[">=0.5"], 0.0);
    config.ci.bootstrap.n_rep = 40;
    let raw = [(ge(3.0), ge(3.0))];
    let a = compute_nbrhd(&fcst, &obs, &raw, &config, &mut seeded_rng(9)).unwrap();
    let b = compute_nbrhd(&fcst, &obs, &raw, &config, &mut seeded_rng(9)).unwrap();
    assert_eq!(a, b);
    assert!(a.cnt[0].fss.bootstrap[0].is_valid());
    // rates carry no bootstrap interval
    assert!(!a.cnt[0].f_rate.bootstrap[0].is_valid());
}

#[rstest]
#[case(">=SFP50")]
#[case(">CDP50")]
fn test_percentile_coverage_threshold_is_rejected(#[case] cov: &str) {
    let field = DataPlane::filled(3, 3, 1.0);
    let config = nbrhd_config(&[1], &[cov], 0.0);
    let result = compute_nbrhd(&field, &field, &[(ge(1.0), ge(1.0))], &config, &mut seeded_rng(1));
    assert!(matches!(
        result,
        Err(VerifyError::Config(ConfigError::UnsupportedThreshold { .. }))
    ));
}

// === Properties ===

fn field() -> impl Strategy<Value = DataPlane> {
    (1usize..9, 1usize..9).prop_flat_map(|(ny, nx)| {
        prop::collection::vec(prop_oneof![4 => 0.0..3.0f64, 1 => Just(BAD_DATA)], ny * nx)
            .prop_map(move |v| DataPlane::from_vec(ny, nx, v).unwrap())
    })
}

proptest! {
    #[test]
    fn test_coverage_is_a_fraction(f in field(), width in 1usize..6, circle in any::<bool>()) {
        let (ny, nx) = f.shape();
        prop_assume!(width <= max_width(ny, nx));
        let shape = if circle { NbrhdShape::Circle } else { NbrhdShape::Square };
        let cov = fractional_coverage(&f, &ge(1.5), shape, width, 0.0).unwrap();
        prop_assert_eq!(cov.shape(), f.shape());
        for (&c, &v) in cov.to_vec().iter().zip(f.to_vec().iter()) {
            if v == BAD_DATA {
                prop_assert_eq!(c, BAD_DATA);
            } else {
                prop_assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn test_square_matches_clipped_window_mean(f in field(), width in 1usize..6) {
        let (ny, nx) = f.shape();
        prop_assume!(width <= max_width(ny, nx));
        let cov = fractional_coverage(&f, &ge(1.5), NbrhdShape::Square, width, 0.0).unwrap();
        let (lo, hi) = ((width - 1) / 2, width / 2);
        for r in 0..ny {
            for c in 0..nx {
                if f.get(r, c) == BAD_DATA {
                    continue;
                }
                let (mut events, mut n) = (0usize, 0usize);
                for y in r.saturating_sub(lo)..=(r + hi).min(ny - 1) {
                    for x in c.saturating_sub(lo)..=(c + hi).min(nx - 1) {
                        let v = f.get(y, x);
                        if v != BAD_DATA {
                            n += 1;
                            events += usize::from(v >= 1.5);
                        }
                    }
                }
                prop_assert!((cov.get(r, c) - events as f64 / n as f64).abs() < 1e-12);
            }
        }
    }
}
