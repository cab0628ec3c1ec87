//! imverify-stats - Statistics engines for forecast verification
//!
//! Each engine takes a [`PairStore`](imverify_core::PairStore) (or gridded
//! fields for neighborhood methods) and returns one record per threshold:
//!
//! - **categorical**: CTC/CTS and MCTC/MCTS contingency-table scores
//! - **continuous**: SL1L2/SAL1L2 partial sums and CNT statistics
//! - **vector**: VL1L2/VAL1L2 partial sums and VCNT statistics
//! - **probabilistic**: PCT, PSTD, PJC and PRC
//! - **neighborhood**: fractional coverage, NBRCTS and NBRCNT
//! - **binned**: climatology-CDF binned records and their aggregates
//!
//! Derived statistics carry normal-theory and bootstrap confidence
//! intervals. Bootstrap draws come from a generator owned by the caller;
//! the same seed gives the same bounds.
//!
//! ## Example
//!
//! ```rust
//! use imverify_core::{PairStore, Threshold, VerifyConfig};
//! use imverify_stats::{categorical::compute_cts, bootstrap::seeded_rng};
//!
//! let pairs = PairStore::new(vec![1.0, 0.0, 1.0, 1.0, 0.0], vec![1.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
//! let t = Threshold::ge(0.5).resolve_fixed().unwrap();
//! let config = VerifyConfig::default();
//! let mut rng = seeded_rng(config.ci.bootstrap.seed);
//! let cts = compute_cts(&pairs, &t, &t, &config, &mut rng).unwrap();
//! assert_eq!(cts.table.fy_oy, 2);
//! assert_eq!(cts.pody.estimate, 1.0);
//! ```

pub mod binned;
pub mod bootstrap;
pub mod categorical;
pub mod ci;
pub mod continuous;
pub mod neighborhood;
pub mod probabilistic;
pub mod vector;

pub use binned::{compute_pct_binned, compute_sl1l2_binned, Binned};
pub use bootstrap::{seeded_rng, BootTarget, Resample, Resampler, ResamplerState};
pub use categorical::{
    compute_ctc, compute_cts, compute_cts_list, compute_mctc, compute_mcts, CtsInfo, MctsInfo,
};
pub use ci::{CiBounds, CiInfo};
pub use continuous::{compute_cnt, compute_sl1l2, CntInfo, PairFilter, Sl1l2Info};
pub use neighborhood::{
    compute_nbrhd, fractional_coverage, NbrCntInfo, NbrCtsInfo, NbrhdOutput,
};
pub use probabilistic::{
    compute_pct, compute_pstd, PctInfo, PjcRow, ProbBins, PstdInfo, RocPoint,
};
pub use vector::{compute_vcnt, compute_vl1l2, VcntInfo, VectorPairs, Vl1l2Info};
