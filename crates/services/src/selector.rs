use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use quiz_core::model::QuestionId;

use crate::error::SessionError;

/// Samples session questions uniformly at random without replacement.
///
/// The returned order is the order the session will present them in.
pub struct QuestionSelector {
    rng: Mutex<StdRng>,
}

impl Default for QuestionSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionSelector {
    /// Selector seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic selector for tests and reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick `min(count, |candidates|)` distinct ids.
    ///
    /// Duplicate ids in `candidates` count once.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InsufficientQuestions` when there is nothing to pick.
    pub fn select(
        &self,
        candidates: &[QuestionId],
        count: usize,
    ) -> Result<Vec<QuestionId>, SessionError> {
        let mut seen = HashSet::with_capacity(candidates.len());
        let mut pool: Vec<QuestionId> = candidates
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if pool.is_empty() || count == 0 {
            return Err(SessionError::InsufficientQuestions {
                available: pool.len(),
                required: count.max(1),
            });
        }

        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            pool.as_mut_slice().shuffle(&mut *rng);
        }
        pool.truncate(count);
        Ok(pool)
    }
}
