//! Seeded `StdRng` behind a tokio mutex; feeds retry jitter.
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::ports::random::RandomSource;

pub struct MutexRng {
    inner: Mutex<rand::rngs::StdRng>,
}

impl MutexRng {
    pub fn new() -> Self {
        Self::from_seed(rand::thread_rng().gen::<u64>())
    }

    /// Deterministic sequence, for reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MutexRng {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RandomSource for MutexRng {
    async fn next_f64(&self) -> f64 {
        let mut g = self.inner.lock().await;
        g.gen::<f64>()
    }
}
