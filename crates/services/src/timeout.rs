use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use quiz_core::model::{QuestionId, UserId};

use crate::event::{EventSender, QuizEvent};

#[derive(Debug)]
struct PendingTimer {
    question_id: QuestionId,
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct TimerTable {
    next_generation: u64,
    pending: HashMap<UserId, PendingTimer>,
}

/// One-shot answer timers, at most one live per user.
///
/// A firing timer posts `QuizEvent::Expired` onto the engine's event stream
/// instead of touching session state itself.
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    delay: Duration,
    events: EventSender,
    table: Arc<Mutex<TimerTable>>,
}

impl TimeoutManager {
    #[must_use]
    pub fn new(delay: Duration, events: EventSender) -> Self {
        Self {
            delay,
            events,
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start the timer for `question_id`, replacing any pending timer for the user.
    ///
    /// Returns the timer's generation, which its `Expired` event carries.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, user_id: UserId, question_id: QuestionId) -> u64 {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.next_generation += 1;
        let generation = table.next_generation;

        let delay = self.delay;
        let events = self.events.clone();
        let shared = Arc::clone(&self.table);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut table = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if table.pending.get(&user_id).map(|p| p.generation) == Some(generation) {
                    table.pending.remove(&user_id);
                }
            }
            tracing::debug!(user = %user_id, question = %question_id, "answer timer fired");
            if events
                .send(QuizEvent::Expired {
                    user_id,
                    question_id,
                    generation,
                })
                .is_err()
            {
                tracing::debug!(user = %user_id, "event stream closed, expiry dropped");
            }
        });

        let previous = table.pending.insert(
            user_id,
            PendingTimer {
                question_id,
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        generation
    }

    /// Cancel the user's pending timer. Returns `true` if one was pending.
    pub fn cancel(&self, user_id: UserId) -> bool {
        let removed = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(&user_id);
        match removed {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Question the user's pending timer belongs to, if any.
    #[must_use]
    pub fn pending(&self, user_id: UserId) -> Option<QuestionId> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .get(&user_id)
            .map(|p| p.question_id)
    }

    /// Number of users with a live timer.
    #[must_use]
    pub fn live(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}
