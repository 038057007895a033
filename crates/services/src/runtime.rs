use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use quiz_core::model::UserId;

use crate::engine::{EngineReply, QuizEngine};
use crate::error::SessionError;
use crate::event::{EventReceiver, QuizEvent};

/// Result of one inbound event, tagged with the event that produced it.
#[derive(Debug)]
pub struct RuntimeOutput {
    pub user_id: UserId,
    pub event: QuizEvent,
    pub result: Result<EngineReply, SessionError>,
}

pub type OutputReceiver = mpsc::UnboundedReceiver<RuntimeOutput>;

/// How long a user's worker waits for another event before it exits.
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(300);

/// Number of per-user workers currently running.
#[derive(Debug, Clone, Default)]
pub struct LiveWorkers(Arc<AtomicUsize>);

impl LiveWorkers {
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn inc(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn dec(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Drives a `QuizEngine` from the single inbound event stream.
///
/// Each user gets a worker task fed in arrival order, so one user's events
/// never overtake each other while different users run in parallel. A worker
/// that sits idle exits and is respawned by the user's next event.
pub struct QuizRuntime {
    engine: Arc<QuizEngine>,
    events: EventReceiver,
    outputs: mpsc::UnboundedSender<RuntimeOutput>,
    idle: Duration,
    live: LiveWorkers,
}

impl QuizRuntime {
    #[must_use]
    pub fn new(engine: Arc<QuizEngine>, events: EventReceiver) -> (Self, OutputReceiver) {
        let (outputs, rx) = mpsc::unbounded_channel();
        (
            Self {
                engine,
                events,
                outputs,
                idle: DEFAULT_WORKER_IDLE,
                live: LiveWorkers::default(),
            },
            rx,
        )
    }

    #[must_use]
    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Handle on the live worker count, readable while the runtime runs.
    #[must_use]
    pub fn live_workers(&self) -> LiveWorkers {
        self.live.clone()
    }

    /// Run until the inbound stream closes.
    ///
    /// The engine's timeout manager holds an event sender of its own, so in
    /// practice this runs for the life of the process; see [`Self::run_until`].
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Run until `shutdown` resolves or the inbound stream closes, then let
    /// the workers finish the events they already received.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        let mut workers: HashMap<UserId, mpsc::UnboundedSender<QuizEvent>> = HashMap::new();
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                () = &mut shutdown => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                Some(joined) = tasks.join_next() => {
                    match joined {
                        Ok(user_id) => {
                            // A respawned worker may already own the entry.
                            if workers.get(&user_id).is_some_and(mpsc::UnboundedSender::is_closed) {
                                workers.remove(&user_id);
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "session worker failed"),
                    }
                    continue;
                }
            };

            let user_id = event.user_id();
            let event = match workers.get(&user_id) {
                Some(worker) => match worker.send(event) {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(event)) => event,
                },
                None => event,
            };

            tracing::debug!(user = %user_id, "spawning session worker");
            let (tx, rx) = mpsc::unbounded_channel();
            if tx.send(event).is_err() {
                continue;
            }
            workers.insert(user_id, tx);
            self.live.inc();
            tasks.spawn(worker(
                user_id,
                Arc::clone(&self.engine),
                rx,
                self.outputs.clone(),
                self.idle,
                self.live.clone(),
            ));
        }

        drop(workers);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "session worker failed");
            }
        }
        tracing::debug!("runtime stopped");
    }
}

async fn worker(
    user_id: UserId,
    engine: Arc<QuizEngine>,
    mut events: mpsc::UnboundedReceiver<QuizEvent>,
    outputs: mpsc::UnboundedSender<RuntimeOutput>,
    idle: Duration,
    live: LiveWorkers,
) -> UserId {
    loop {
        let event = match tokio::time::timeout(idle, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // Refuse new sends, then finish what was already queued.
                events.close();
                while let Some(event) = events.recv().await {
                    process(user_id, &engine, event, &outputs).await;
                }
                tracing::debug!(user = %user_id, "idle session worker retired");
                break;
            }
        };
        process(user_id, &engine, event, &outputs).await;
    }
    live.dec();
    user_id
}

async fn process(
    user_id: UserId,
    engine: &QuizEngine,
    event: QuizEvent,
    outputs: &mpsc::UnboundedSender<RuntimeOutput>,
) {
    let result = engine.handle(event).await;
    if let Err(err) = &result {
        tracing::info!(user = %user_id, error = %err, "event rejected");
    }
    let output = RuntimeOutput {
        user_id,
        event,
        result,
    };
    if outputs.send(output).is_err() {
        tracing::debug!(user = %user_id, "output receiver closed");
    }
}
