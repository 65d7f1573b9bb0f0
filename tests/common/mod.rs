//! Shared test support: tracing setup and seeded data generation.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     let pairs = common::gen_data(10_000, 42);
//! }
//! ```
//!
//! Set `RUST_LOG` (e.g. `hybtree=debug`) to see events when the crate is
//! built with the `tracing` feature.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Once;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize a console tracing subscriber driven by `RUST_LOG`.
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .try_init();
    });
}

/// Generate `n` key/value pairs with unique pseudo-random keys.
///
/// Deterministic for a given seed, so failures reproduce.
pub fn gen_data(n: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen: HashSet<u64> = HashSet::with_capacity(n);
    let mut pairs: Vec<(u64, u64)> = Vec::with_capacity(n);

    while pairs.len() < n {
        let k: u64 = rng.random();
        if seen.insert(k) {
            pairs.push((k, rng.random()));
        }
    }

    pairs
}

/// Generate `n` sequential keys with pseudo-random values.
pub fn gen_data_seq(n: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n as u64).map(|k| (k, rng.random())).collect()
}
