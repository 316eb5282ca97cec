//! Thread-local random number source used only to build randomized tree
//! instances for the quantified properties in tests. Adapted from
//! `radiate-core`'s `domain::random_provider`, trimmed to the operations
//! `dfg-core`'s tests actually need.

use rand::distr::uniform::SampleUniform;
use rand::rngs::SmallRng;
use rand::{Rng, RngExt, SeedableRng};
use std::cell::RefCell;
use std::ops::Range;
use std::sync::{Arc, LazyLock, Mutex};

static GLOBAL_RNG: LazyLock<Arc<Mutex<SmallRng>>> =
    LazyLock::new(|| Arc::new(Mutex::new(SmallRng::from_rng(&mut rand::rng()))));

thread_local! {
    static TLS_RNG: RefCell<SmallRng> = RefCell::new({
        let mut global = GLOBAL_RNG.lock().unwrap();
        SmallRng::seed_from_u64(global.next_u64())
    });
}

fn with_rng<R>(f: impl FnOnce(&mut SmallRng) -> R) -> R {
    TLS_RNG.with(|cell| f(&mut cell.borrow_mut()))
}

/// Seeds the thread-local RNG, so a test can ask for a reproducible
/// randomized instance by fixing a seed when a failure needs to be
/// replayed.
pub fn set_seed(seed: u64) {
    TLS_RNG.with(|cell| *cell.borrow_mut() = SmallRng::seed_from_u64(seed));
}

/// A random number of type `T` in `range`.
pub fn range<T>(range: Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    with_rng(|rng| rng.random_range(range))
}

/// A random index into `0..len`.
pub fn index(len: usize) -> usize {
    with_rng(|rng| rng.random_range(0..len))
}

/// A random boolean, true with probability `prob`.
pub fn bool(prob: f32) -> bool {
    with_rng(|rng| rng.random_bool(prob as f64))
}
