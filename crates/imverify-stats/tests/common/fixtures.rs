//! Shared pair and config builders

use imverify_core::{
    BootstrapMethod, PairStore, ResolvedThreshold, Threshold, VerifyConfig, BAD_DATA,
};

/// Pairs with no climatology and unit weights
pub fn pairs(f: &[f64], o: &[f64]) -> PairStore {
    PairStore::new(f.to_vec(), o.to_vec()).expect("equal lengths")
}

/// Smooth, deterministic continuous pairs
#[allow(dead_code)]
pub fn wave_pairs(n: usize) -> PairStore {
    let f: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin() * 4.0 + 10.0).collect();
    let o: Vec<f64> = (0..n)
        .map(|i| (i as f64 * 0.37).sin() * 3.5 + 10.4 + (i as f64 * 1.3).cos() * 0.5)
        .collect();
    pairs(&f, &o)
}

/// Pairs with a normal climatology and one missing climatological mean
#[allow(dead_code)]
pub fn climo_pairs(n: usize) -> PairStore {
    let base = wave_pairs(n);
    let mut cmn = vec![10.0; n];
    if n > 0 {
        cmn[n - 1] = BAD_DATA;
    }
    PairStore::builder(base.f().to_vec(), base.o().to_vec())
        .climo(cmn, vec![2.0; n])
        .build()
        .expect("equal lengths")
}

pub fn ge(value: f64) -> ResolvedThreshold {
    Threshold::ge(value).resolve_fixed().expect("fixed threshold")
}

/// Config with normal-theory intervals only
#[allow(dead_code)]
pub fn normal_only() -> VerifyConfig {
    let mut config = VerifyConfig::default();
    config.ci.bootstrap.n_rep = 0;
    config
}

/// Config running `n_rep` bootstrap replicates
#[allow(dead_code)]
pub fn bootstrap(method: BootstrapMethod, n_rep: usize, alpha: &[f64]) -> VerifyConfig {
    let mut config = VerifyConfig::default();
    config.ci.alpha = alpha.to_vec();
    config.ci.bootstrap.method = method;
    config.ci.bootstrap.n_rep = n_rep;
    config
}

/// Route `tracing` output through the test harness
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
