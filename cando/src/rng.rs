//! Shared random source for draws.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable handle to one `StdRng`
///
/// Clones share the generator, so a seeded handle yields the same sequence
/// of draws no matter which clone of the environment performs them.
#[derive(Clone, Debug)]
pub struct SharedRng(Arc<Mutex<StdRng>>);

impl SharedRng {
    /// Deterministic generator for tests and demos
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    /// Generator seeded from the operating system
    #[must_use]
    pub fn from_entropy() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_entropy())))
    }

    /// Seeded when `seed` is set, from entropy otherwise
    #[must_use]
    pub fn from_seed_or_entropy(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Run `f` with exclusive access to the generator
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A panic mid-draw leaves the generator usable.
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
