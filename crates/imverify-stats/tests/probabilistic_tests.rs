//! Probabilistic verification integration tests

mod common;

use common::fixtures::{ge, normal_only};
use imverify_core::{ClimoCdfBinner, ClimoCdfMethod, PairStore, Threshold, BAD_DATA};
use imverify_stats::binned::compute_pct_binned;
use imverify_stats::bootstrap::seeded_rng;
use imverify_stats::probabilistic::{climo_event_probability, compute_pct, compute_pstd, ProbBins};
use proptest::prelude::*;
use rstest::rstest;

fn climo_prob_pairs(n: usize) -> PairStore {
    let f: Vec<f64> = (0..n).map(|i| (i % 11) as f64 / 10.0).collect();
    let o: Vec<f64> = (0..n)
        .map(|i| if i % 11 >= 5 { 12.0 } else { 8.0 })
        .collect();
    PairStore::builder(f, o)
        .climo(vec![10.0; n], vec![2.0; n])
        .build()
        .unwrap()
}

// === Tables ===

/// Bins score at their midpoints (0.25 and 0.75), which fixes
/// `bss_smpl = 1 - 0.0625 / 0.25`.
#[test]
fn test_two_bin_scenario() {
    let p = PairStore::new(vec![0.1, 0.9], vec![0.0, 1.0]).unwrap();
    let bins = ProbBins::new(&[0.0, 0.5, 1.0]).unwrap();
    let (pct, pstd) = compute_pstd(&p, &bins, &ge(0.5), &normal_only(), &mut seeded_rng(1)).unwrap();
    assert_eq!(pct.total(), 2);
    // every event sits in the upper bin
    assert_eq!(pct.pjc()[1].calibration, 1.0);
    assert!((pstd.roc_auc.estimate - 1.0).abs() < 1e-12);
    assert!((pstd.bss_smpl.estimate - 0.75).abs() < 1e-12);
}

#[test]
fn test_climo_percentile_event() {
    let p = climo_prob_pairs(22);
    let othresh: Threshold = ">=CDP50".parse().unwrap();
    let othresh = othresh.resolve_fixed().unwrap();
    let bins = ProbBins::even(10).unwrap();
    let (pct, pstd) = compute_pstd(&p, &bins, &othresh, &normal_only(), &mut seeded_rng(1)).unwrap();
    assert_eq!(pct.events(), 12);
    assert_eq!(pct.climo_count, 22);
    // the climatological median gives every pair an event probability of one half
    assert!((pstd.briercl.estimate - 0.25).abs() < 1e-12);
    assert!(pstd.bss.estimate > 0.0);
}

#[rstest]
#[case(Threshold::ge(10.0), 0.5)]
#[case(Threshold::lt(10.0), 0.5)]
#[case(Threshold::ge(12.0), 0.158655)]
#[case(Threshold::between(8.0, 12.0).unwrap(), 0.682689)]
fn test_climo_event_probability(#[case] thresh: Threshold, #[case] expected: f64) {
    let t = thresh.resolve_fixed().unwrap();
    assert!((climo_event_probability(&t, 10.0, 2.0) - expected).abs() < 1e-5);
}

#[test]
fn test_climo_event_probability_missing_climo() {
    assert_eq!(climo_event_probability(&ge(1.0), BAD_DATA, 2.0), BAD_DATA);
    assert_eq!(climo_event_probability(&ge(1.0), 1.0, 0.0), BAD_DATA);
}

#[test]
fn test_bad_probability_rejected() {
    let p = PairStore::new(vec![0.5, -0.1], vec![1.0, 0.0]).unwrap();
    assert!(compute_pct(&p, &ProbBins::even(2).unwrap(), &ge(0.5)).is_err());
    // missing forecasts are skipped, not rejected
    let p = PairStore::new(vec![0.5, BAD_DATA], vec![1.0, 0.0]).unwrap();
    let pct = compute_pct(&p, &ProbBins::even(2).unwrap(), &ge(0.5)).unwrap();
    assert_eq!(pct.total(), 1);
}

#[test]
fn test_bins_from_parsed_thresholds() {
    let thresholds = imverify_core::parse_threshold_list(">=0.0,>=0.3,>=0.7,>=1.0").unwrap();
    let bins = ProbBins::from_thresholds(&thresholds).unwrap();
    assert_eq!(bins.edges(), &[0.0, 0.3, 0.7, 1.0]);
    assert_eq!(bins.bin_of(0.5), 1);
}

// === Climatology bins ===

#[test]
fn test_binned_tables_partition_pairs() {
    let p = climo_prob_pairs(44);
    let binner = ClimoCdfBinner::new(2, ClimoCdfMethod::Normal).unwrap();
    let binned = compute_pct_binned(&p, &ProbBins::even(5).unwrap(), &ge(10.0), &binner).unwrap();
    // observations sit either side of the climatological mean
    assert_eq!(binned.per_bin[0].total(), 20);
    assert_eq!(binned.per_bin[1].total(), 24);
    assert_eq!(binned.aggregate.oy, binned.unbinned.oy);
    assert_eq!(binned.aggregate.on, binned.unbinned.on);
}

// === Properties ===

fn prob_pairs() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (2usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(0.0f64..=1.0, n),
            prop::collection::vec(prop_oneof![Just(0.0), Just(1.0)], n),
        )
    })
}

proptest! {
    #[test]
    fn test_pstd_decomposition((f, o) in prob_pairs(), n_bins in 1usize..12) {
        let p = PairStore::new(f.clone(), o).unwrap();
        let bins = ProbBins::even(n_bins).unwrap();
        let (pct, pstd) = compute_pstd(&p, &bins, &ge(0.5), &normal_only(), &mut seeded_rng(0)).unwrap();
        prop_assert_eq!(pct.total() as usize, f.len());
        let (rel, res, unc) = (
            pstd.reliability.estimate,
            pstd.resolution.estimate,
            pstd.uncertainty.estimate,
        );
        prop_assert!((pstd.brier.estimate - (rel - res + unc)).abs() < 1e-12);
        prop_assert!(rel >= 0.0 && res >= 0.0);
        prop_assert!((0.0..=1.0).contains(&pstd.brier.estimate));
    }

    #[test]
    fn test_roc_area_is_bounded((f, o) in prob_pairs()) {
        let pct = compute_pct(&PairStore::new(f, o).unwrap(), &ProbBins::even(10).unwrap(), &ge(0.5)).unwrap();
        let auc = pct.roc_auc();
        prop_assert!(auc == BAD_DATA || (-1e-12..=1.0 + 1e-12).contains(&auc));
    }
}
