//! Continuous and vector statistics integration tests

mod common;

use common::fixtures::{climo_pairs, ge, init_tracing, normal_only, pairs, wave_pairs};
use imverify_core::{ClimoCdfBinner, ClimoCdfMethod, PairStore, SetLogic, BAD_DATA};
use imverify_stats::binned::compute_sl1l2_binned;
use imverify_stats::bootstrap::seeded_rng;
use imverify_stats::continuous::{compute_cnt, compute_sl1l2, CntInfo, PairFilter};
use imverify_stats::vector::{compute_vcnt, VectorPairs};
use rstest::rstest;

// === Scalar statistics ===

#[test]
fn test_linear_scenario() {
    let p = pairs(&[2.0, 4.0, 6.0], &[1.0, 3.0, 5.0]);
    let cnt = compute_cnt(&p, &PairFilter::default(), &normal_only(), &mut seeded_rng(1)).unwrap();
    assert!((cnt.me.estimate - 1.0).abs() < 1e-12);
    assert!((cnt.rmse.estimate - 1.0).abs() < 1e-12);
    assert!((cnt.pr_corr.estimate - 1.0).abs() < 1e-12);
    assert!((cnt.mae.estimate - 1.0).abs() < 1e-12);
    assert!((cnt.e50.estimate - 1.0).abs() < 1e-12);
    assert!(cnt.eiqr.estimate.abs() < 1e-12);
}

#[rstest]
#[case(SetLogic::Union, 3)]
#[case(SetLogic::Intersection, 1)]
#[case(SetLogic::SymDiff, 2)]
fn test_filter_logic(#[case] logic: SetLogic, #[case] expected: usize) {
    // forecast >= 5 at 1, 2; observed >= 5 at 2, 3
    let p = pairs(&[1.0, 6.0, 7.0, 2.0], &[1.0, 2.0, 8.0, 9.0]);
    let filter = PairFilter::new(ge(5.0), ge(5.0), logic);
    assert_eq!(compute_sl1l2(&p, &filter).scount, expected);
}

#[test]
fn test_weights_shift_means() {
    let p = PairStore::builder(vec![0.0, 10.0], vec![0.0, 10.0])
        .weights(vec![3.0, 1.0])
        .build()
        .unwrap();
    let sl = compute_sl1l2(&p, &PairFilter::default());
    assert!((sl.fbar - 2.5).abs() < 1e-12);
    assert!((sl.sweight - 4.0).abs() < 1e-12);
}

#[test]
fn test_normal_intervals_bracket_estimates() {
    let p = wave_pairs(60);
    let cnt = compute_cnt(&p, &PairFilter::default(), &normal_only(), &mut seeded_rng(1)).unwrap();
    for ci in [&cnt.fbar, &cnt.obar, &cnt.me, &cnt.fstdev, &cnt.estdev, &cnt.pr_corr] {
        let b = ci.normal[0];
        assert!(b.is_valid());
        assert!(b.lower <= ci.estimate && ci.estimate <= b.upper);
    }
    // no normal-theory interval defined
    assert!(!cnt.rmse.normal[0].is_valid());
}

#[test]
fn test_anomaly_correlation_skips_missing_climo() {
    let p = climo_pairs(30);
    let cnt = compute_cnt(&p, &PairFilter::default(), &normal_only(), &mut seeded_rng(1)).unwrap();
    let sl = compute_sl1l2(&p, &PairFilter::default());
    assert_eq!(sl.sacount, 29);
    assert_eq!(sl.scount, 30);
    assert!((cnt.anom_corr.estimate - sl.anom_corr()).abs() < 1e-9);
}

#[test]
fn test_all_filtered_out() {
    init_tracing();
    let p = wave_pairs(10);
    let filter = PairFilter::new(ge(1e6), ge(1e6), SetLogic::Union);
    let cnt = compute_cnt(&p, &filter, &normal_only(), &mut seeded_rng(1)).unwrap();
    assert_eq!(cnt.total, 0);
    assert_eq!(cnt.fbar.estimate, BAD_DATA);
    assert_eq!(cnt.pr_corr.estimate, BAD_DATA);
    assert!(!cnt.fbar.normal[0].is_valid());
}

#[test]
fn test_binned_partial_sums_aggregate() {
    let p = climo_pairs(40);
    let binner = ClimoCdfBinner::new(4, ClimoCdfMethod::Normal).unwrap();
    let binned = compute_sl1l2_binned(&p, &PairFilter::default(), &binner).unwrap();
    let per_bin: usize = binned.per_bin.iter().map(|s| s.scount).sum();
    assert_eq!(per_bin, 39);
    assert_eq!(binned.aggregate.scount, 39);
    assert_eq!(binned.unbinned.scount, 40);
}

#[test]
fn test_cnt_record_serializes() {
    let p = wave_pairs(20);
    let cnt = compute_cnt(&p, &PairFilter::default(), &normal_only(), &mut seeded_rng(1)).unwrap();
    let json = serde_json::to_string(&cnt).unwrap();
    let back: CntInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(back.total, 20);
    assert_eq!(back.me.normal.len(), cnt.me.normal.len());
    assert!((back.me.estimate - cnt.me.estimate).abs() < 1e-12);
}

// === Vector statistics ===

#[test]
fn test_vector_length_mismatch() {
    let u = pairs(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
    let v = pairs(&[1.0, 2.0], &[1.0, 2.0]);
    assert!(VectorPairs::new(u, v).is_err());
}

#[test]
fn test_vector_constant_bias() {
    // forecast wind from the west at 5, observed from the south at 5
    let u = pairs(&[5.0; 4], &[0.0; 4]);
    let v = pairs(&[0.0; 4], &[5.0; 4]);
    let winds = VectorPairs::new(u, v).unwrap();
    let vcnt = compute_vcnt(&winds, &PairFilter::default(), &normal_only(), &mut seeded_rng(1)).unwrap();
    assert!((vcnt.fdir.estimate - 270.0).abs() < 1e-9);
    assert!((vcnt.odir.estimate - 180.0).abs() < 1e-9);
    assert!((vcnt.dir_err.estimate - 90.0).abs() < 1e-9);
    assert!(vcnt.speed_err.estimate.abs() < 1e-12);
    assert!((vcnt.rmsve.estimate - 50f64.sqrt()).abs() < 1e-9);
}
