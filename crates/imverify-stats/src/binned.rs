//! Climatology-binned records
//!
//! Pairs are split by [`ClimoCdfBinner`]; each bin gets its own record and
//! the per-bin records merge exactly into an aggregate. Pairs without
//! climatology only reach the `unbinned` record, even when there is a
//! single bin.

use serde::{Deserialize, Serialize};

use imverify_core::climo::ClimoCdfBinner;
use imverify_core::error::VerifyResult;
use imverify_core::pairs::PairStore;
use imverify_core::threshold::ResolvedThreshold;

use crate::continuous::{compute_sl1l2, PairFilter, Sl1l2Info};
use crate::probabilistic::{compute_pct, PctInfo, ProbBins};

/// Per-bin records with their merged aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binned<T> {
    pub per_bin: Vec<T>,
    /// Merge of `per_bin`
    pub aggregate: T,
    /// Record over every pair, with or without climatology
    pub unbinned: T,
}

impl<T> Binned<T> {
    pub fn n_bins(&self) -> usize {
        self.per_bin.len()
    }
}

fn binned<T, C, M>(
    pairs: &PairStore,
    binner: &ClimoCdfBinner,
    compute: C,
    merge: M,
) -> VerifyResult<Binned<T>>
where
    T: Clone,
    C: Fn(&PairStore) -> VerifyResult<T>,
    M: Fn(&T, &T) -> VerifyResult<T>,
{
    let unbinned = compute(pairs)?;
    let per_bin = binner
        .split(pairs)
        .iter()
        .map(&compute)
        .collect::<VerifyResult<Vec<T>>>()?;
    let mut aggregate = per_bin[0].clone();
    for rec in &per_bin[1..] {
        aggregate = merge(&aggregate, rec)?;
    }
    Ok(Binned {
        per_bin,
        aggregate,
        unbinned,
    })
}

/// Probability contingency tables per climatology bin
pub fn compute_pct_binned(
    pairs: &PairStore,
    bins: &ProbBins,
    othresh: &ResolvedThreshold,
    binner: &ClimoCdfBinner,
) -> VerifyResult<Binned<PctInfo>> {
    binned(
        pairs,
        binner,
        |p| compute_pct(p, bins, othresh),
        |a, b| a.merge(b),
    )
}

/// Scalar partial sums per climatology bin
pub fn compute_sl1l2_binned(
    pairs: &PairStore,
    filter: &PairFilter,
    binner: &ClimoCdfBinner,
) -> VerifyResult<Binned<Sl1l2Info>> {
    binned(
        pairs,
        binner,
        |p| Ok(compute_sl1l2(p, filter)),
        |a, b| Ok(a.merge(b)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use imverify_core::bad_data::BAD_DATA;
    use imverify_core::climo::ClimoCdfMethod;
    use imverify_core::threshold::Threshold;

    fn pairs() -> PairStore {
        let f = vec![0.1, 0.4, 0.6, 0.9, 0.8, 0.3];
        let o = vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        PairStore::builder(f, o)
            .climo(
                vec![0.5, 0.5, 0.5, 0.5, 0.5, BAD_DATA],
                vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_bin_drops_pairs_without_climo() {
        let pct = compute_pct_binned(
            &pairs(),
            &ProbBins::even(2).unwrap(),
            &Threshold::ge(0.5).resolve_fixed().unwrap(),
            &ClimoCdfBinner::default(),
        )
        .unwrap();
        assert_eq!(pct.n_bins(), 1);
        assert_eq!(pct.per_bin[0].total(), 5);
        assert_eq!(pct.aggregate.total(), 5);
        assert_eq!(pct.unbinned.total(), 6);
    }

    #[test]
    fn test_bins_merge_to_aggregate() {
        let binner = ClimoCdfBinner::new(2, ClimoCdfMethod::Normal).unwrap();
        let pct = compute_pct_binned(
            &pairs(),
            &ProbBins::even(2).unwrap(),
            &Threshold::ge(0.5).resolve_fixed().unwrap(),
            &binner,
        )
        .unwrap();
        assert_eq!(pct.n_bins(), 2);
        let per_bin: u64 = pct.per_bin.iter().map(PctInfo::total).sum();
        assert_eq!(per_bin, 5);
        assert_eq!(pct.aggregate.total(), 5);
        assert_eq!(pct.unbinned.total(), 6);
    }

    #[test]
    fn test_sl1l2_bins_merge_exactly() {
        let binner = ClimoCdfBinner::new(3, ClimoCdfMethod::SampleRank).unwrap();
        let sl = compute_sl1l2_binned(&pairs(), &PairFilter::default(), &binner).unwrap();
        let with_climo = pairs().subset_by_indices(&[0, 1, 2, 3, 4]);
        let direct = compute_sl1l2(&with_climo, &PairFilter::default());
        assert_eq!(sl.aggregate.scount, 5);
        assert!((sl.aggregate.fobar - direct.fobar).abs() < 1e-12);
        assert_eq!(sl.unbinned.scount, 6);
    }
}
