//! The quiz session engine: starting sessions, scoring answers, timer expiry
//! and finalization.

mod outcome;

pub use outcome::{
    AnswerFeedback, AnswerOutcome, EngineReply, ExpiryOutcome, QuestionPrompt, SessionReport,
    SpeedRating, StartOutcome,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use quiz_core::Clock;
use quiz_core::model::{
    AnswerOption, DifficultyFilter, Mistake, MistakeId, NewMistake, Question, QuestionId,
    QuizResult, SessionMode, SubjectId, UserId,
};
use quiz_storage::repository::{Storage, StorageError};

use crate::achievements::{AchievementEvaluator, RuleBasedAchievements};
use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::event::{AnswerRequest, EventSender, QuizEvent, StartRequest};
use crate::notifier::{LogNotifier, Notification, Notifier, notify};
use crate::review_service::ReviewService;
use crate::selector::QuestionSelector;
use crate::session::{
    InMemorySessionStore, Session, SessionKind, SessionStore, SlotLease, route,
};
use crate::streak::{StoredStreakTracker, StreakTracker};
use crate::timeout::TimeoutManager;

fn size(n: u32) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Group mistakes by question, keeping first-seen order.
fn group_mistakes(mistakes: &[Mistake]) -> Vec<(QuestionId, Vec<MistakeId>)> {
    let mut items: Vec<(QuestionId, Vec<MistakeId>)> = Vec::new();
    for mistake in mistakes {
        match items.iter_mut().find(|(q, _)| *q == mistake.question_id) {
            Some((_, ids)) => ids.push(mistake.id),
            None => items.push((mistake.question_id, vec![mistake.id])),
        }
    }
    items
}

enum Prepared {
    Ready(Session),
    Empty(StartOutcome),
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Multiplexes the five practice modes over one per-user session slot.
///
/// Every operation for a user holds that user's slot lock for its whole
/// duration, so events for the same user are applied one at a time while
/// different users proceed independently.
pub struct QuizEngine {
    storage: Storage,
    sessions: Arc<dyn SessionStore>,
    selector: QuestionSelector,
    reviews: ReviewService,
    notifier: Arc<dyn Notifier>,
    achievements: Arc<dyn AchievementEvaluator>,
    streaks: Arc<dyn StreakTracker>,
    timeouts: TimeoutManager,
    config: EngineConfig,
    clock: Clock,
}

impl QuizEngine {
    /// Engine with in-memory sessions, log-only notifications and stored
    /// streak/achievement tracking. Expired timers are posted to `events`.
    #[must_use]
    pub fn new(storage: Storage, config: EngineConfig, events: EventSender) -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            selector: QuestionSelector::new(),
            reviews: ReviewService::new(&storage),
            notifier: Arc::new(LogNotifier),
            achievements: Arc::new(RuleBasedAchievements::new(&storage)),
            streaks: Arc::new(StoredStreakTracker::new(Arc::clone(&storage.streaks))),
            timeouts: TimeoutManager::new(config.answer_timeout(), events),
            storage,
            config,
            clock: Clock::default(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: QuestionSelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn with_achievements(mut self, achievements: Arc<dyn AchievementEvaluator>) -> Self {
        self.achievements = achievements;
        self
    }

    #[must_use]
    pub fn with_streaks(mut self, streaks: Arc<dyn StreakTracker>) -> Self {
        self.streaks = streaks;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn timeouts(&self) -> &TimeoutManager {
        &self.timeouts
    }

    /// Apply one inbound event.
    ///
    /// # Errors
    ///
    /// Propagates the `SessionError` of the underlying operation.
    pub async fn handle(&self, event: QuizEvent) -> Result<EngineReply, SessionError> {
        match event {
            QuizEvent::Start(request) => self.start(request).await.map(EngineReply::Started),
            QuizEvent::Answer(request) => self.answer(request).await.map(EngineReply::Answered),
            QuizEvent::Expired {
                user_id,
                question_id,
                generation,
            } => Ok(EngineReply::Expired(
                self.handle_expired(user_id, question_id, generation).await,
            )),
        }
    }

    // ─── START ─────────────────────────────────────────────────────────────

    /// Build a session for `request` and make it the user's only session.
    ///
    /// Nothing changes for the user unless the new session is ready, so a
    /// failed start leaves any running session in place.
    ///
    /// # Errors
    ///
    /// `SubjectRequired`, `InsufficientQuestions`, `UnknownQuestion` when the
    /// first question is missing, or a storage failure.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome, SessionError> {
        let user_id = request.user_id;
        let lease = SlotLease::new(&*self.sessions, user_id);
        let mut guard = lease.lock().await;

        let now = self.clock.now();
        let mut session = match self.prepare(&request, now).await? {
            Prepared::Ready(session) => session,
            Prepared::Empty(outcome) => return Ok(outcome),
        };

        let first_id = session
            .current_question()
            .ok_or(SessionError::InsufficientQuestions {
                available: 0,
                required: 1,
            })?;
        let first = self.fetch(first_id).await?;

        let mode = session.mode();
        let total = session.total();
        session.restart_question_clock();
        session.arm_timer(self.timeouts.schedule(user_id, first_id));
        if let Some(previous) = guard.replace(session) {
            tracing::info!(user = %user_id, replaced = %previous.mode(), "previous session replaced");
        }

        tracing::info!(user = %user_id, %mode, total, "session started");
        Ok(StartOutcome::Started {
            mode,
            total,
            first: QuestionPrompt {
                question: first,
                index: 0,
                total,
                mode,
            },
        })
    }

    async fn prepare(
        &self,
        request: &StartRequest,
        now: DateTime<Utc>,
    ) -> Result<Prepared, SessionError> {
        let user_id = request.user_id;
        let mode = request.mode;

        let session = match mode {
            SessionMode::Standard => {
                let subject_id = self.require_subject(request)?;
                let pool = self
                    .storage
                    .questions
                    .find_questions(subject_id, request.difficulty)
                    .await?;
                let ids = self.pick(&pool, self.config.questions_per_quiz)?;
                Session::standard(user_id, subject_id, request.difficulty, ids, now)
            }
            SessionMode::Mock => {
                let subject_id = self.require_subject(request)?;
                let pool = self
                    .storage
                    .questions
                    .find_questions(subject_id, DifficultyFilter::All)
                    .await?;
                let ids = self.pick(&pool, self.config.mock_questions)?;
                Session::mock(user_id, subject_id, ids, now)
            }
            SessionMode::Speed => {
                let pool = self.storage.questions.all_questions().await?;
                let required = size(self.config.speed_min_pool);
                if pool.len() < required {
                    return Err(SessionError::InsufficientQuestions {
                        available: pool.len(),
                        required,
                    });
                }
                let ids = self.pick(&pool, self.config.speed_questions)?;
                Session::speed(user_id, ids, now)
            }
            SessionMode::MistakeReview => {
                let mistakes = self
                    .storage
                    .mistakes
                    .unreviewed_for_user(user_id, Some(self.config.mistake_review_limit))
                    .await?;
                if mistakes.is_empty() {
                    return Ok(Prepared::Empty(StartOutcome::NothingToReview));
                }
                Session::mistake_review(user_id, group_mistakes(&mistakes), now)
            }
            SessionMode::SpacedReview => {
                let set = self
                    .reviews
                    .due_set(user_id, self.clock.today())
                    .await?;
                if set.is_empty() {
                    return Ok(Prepared::Empty(StartOutcome::NothingDue {
                        next_due: set.next_due,
                        total_cards: set.total_cards,
                    }));
                }
                let items = set.due.iter().map(|c| (c.question_id, c.id)).collect();
                Session::spaced_review(user_id, items, now)
            }
        };
        Ok(Prepared::Ready(session))
    }

    fn require_subject(&self, request: &StartRequest) -> Result<SubjectId, SessionError> {
        request.subject_id.ok_or(SessionError::SubjectRequired {
            mode: request.mode,
        })
    }

    fn pick(&self, pool: &[Question], wanted: u32) -> Result<Vec<QuestionId>, SessionError> {
        let ids: Vec<QuestionId> = pool.iter().map(Question::id).collect();
        self.selector.select(&ids, size(wanted))
    }

    // ─── ANSWER ────────────────────────────────────────────────────────────

    /// Score an answer against the user's session and advance or finalize it.
    ///
    /// Answers arriving after the timer fired are still accepted.
    ///
    /// # Errors
    ///
    /// `NoActiveSession`, `DuplicateAnswer` or `OutOfOrder` leave the session
    /// untouched. `UnknownQuestion` aborts the session. A storage failure while
    /// loading the answered question leaves the session untouched.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerOutcome, SessionError> {
        let AnswerRequest {
            user_id,
            question_id,
            chosen,
        } = request;
        let lease = SlotLease::new(&*self.sessions, user_id);
        let mut guard = lease.lock().await;

        // The slot stays empty while the session is out; the lock keeps
        // every other event for this user waiting.
        let Some(mut session) = guard.take() else {
            return Err(SessionError::NoActiveSession);
        };
        let routed = route(&[&session], question_id).map(|_| ());
        if let Err(err) = routed {
            *guard = Some(session);
            return Err(err);
        }

        let question = match self.fetch(question_id).await {
            Ok(question) => question,
            Err(SessionError::UnknownQuestion(missing)) => {
                self.abort(user_id, missing).await;
                return Err(SessionError::UnknownQuestion(missing));
            }
            Err(err) => {
                *guard = Some(session);
                return Err(err);
            }
        };

        self.timeouts.cancel(user_id);
        let is_correct = question.is_correct(chosen);
        let elapsed = session.question_elapsed();
        let now = self.clock.now();

        let position = match session.record_answer(question_id, is_correct) {
            Ok(position) => position,
            Err(err) => {
                *guard = Some(session);
                return Err(err);
            }
        };
        let (elapsed, next_review) = self
            .apply_answer(&mut session, position, &question, chosen, elapsed, now)
            .await;

        tracing::debug!(
            user = %user_id,
            question = %question_id,
            mode = %session.mode(),
            correct = is_correct,
            "answer scored"
        );

        let feedback = AnswerFeedback {
            question_id,
            chosen,
            correct: question.correct(),
            is_correct,
            elapsed,
            next_review,
        };

        if session.is_finished() {
            let report = self.finalize(session, now).await?;
            return Ok(AnswerOutcome::Finished { feedback, report });
        }

        let Some(next_id) = session.current_question() else {
            return Err(SessionError::NoActiveSession);
        };
        session.restart_question_clock();
        let index = session.current_index();
        let total = session.total();
        let mode = session.mode();
        let score = session.score();
        session.arm_timer(self.timeouts.schedule(user_id, next_id));

        match self.fetch(next_id).await {
            Ok(next) => {
                *guard = Some(session);
                Ok(AnswerOutcome::Next {
                    feedback,
                    next: QuestionPrompt {
                        question: next,
                        index,
                        total,
                        mode,
                    },
                    score,
                })
            }
            Err(SessionError::UnknownQuestion(missing)) => {
                self.abort(user_id, missing).await;
                Err(SessionError::UnknownQuestion(missing))
            }
            Err(err) => {
                *guard = Some(session);
                Err(err)
            }
        }
    }

    /// Mode-specific side effects of a scored answer.
    ///
    /// Returns the speed-round elapsed time and the rescheduled review date,
    /// where the mode has one. Write failures are logged and never undo the
    /// scoring.
    async fn apply_answer(
        &self,
        session: &mut Session,
        position: usize,
        question: &Question,
        chosen: AnswerOption,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> (Option<Duration>, Option<NaiveDate>) {
        let user_id = session.user_id();
        let is_correct = question.is_correct(chosen);

        match session.kind_mut() {
            SessionKind::Standard { .. } | SessionKind::Mock { .. } => {
                if !is_correct {
                    self.record_mistake(user_id, question, chosen, now).await;
                }
                (None, None)
            }
            SessionKind::Speed { elapsed: times } => {
                times.push(elapsed);
                if !is_correct {
                    self.record_mistake(user_id, question, chosen, now).await;
                }
                (Some(elapsed), None)
            }
            SessionKind::MistakeReview { mistakes } => {
                if is_correct {
                    for id in mistakes.get(position).into_iter().flatten() {
                        if let Err(err) = self.storage.mistakes.mark_reviewed(*id).await {
                            tracing::warn!(user = %user_id, mistake = %id, error = %err, "mistake not marked reviewed");
                        }
                    }
                }
                (None, None)
            }
            SessionKind::SpacedReview { card_ids } => {
                let Some(card_id) = card_ids.get(position).copied() else {
                    return (None, None);
                };
                match self
                    .reviews
                    .review_card(card_id, is_correct, self.clock.today())
                    .await
                {
                    Ok(applied) => (None, Some(applied.card.next_review_date)),
                    Err(err) => {
                        tracing::warn!(user = %user_id, card = %card_id, error = %err, "review card not updated");
                        (None, None)
                    }
                }
            }
        }
    }

    async fn record_mistake(
        &self,
        user_id: UserId,
        question: &Question,
        chosen: AnswerOption,
        now: DateTime<Utc>,
    ) {
        let mistake = NewMistake {
            user_id,
            question_id: question.id(),
            chosen,
            correct: question.correct(),
            answered_at: now,
        };
        if let Err(err) = self.storage.mistakes.create_mistake(mistake).await {
            tracing::warn!(user = %user_id, question = %question.id(), error = %err, "mistake not recorded");
        }
    }

    // ─── FINALIZE ──────────────────────────────────────────────────────────

    /// Summarize a finished session. The session has already left its slot.
    async fn finalize(
        &self,
        session: Session,
        now: DateTime<Utc>,
    ) -> Result<SessionReport, SessionError> {
        let user_id = session.user_id();
        self.timeouts.cancel(user_id);

        let score = session.score();
        let total = count(session.total());
        tracing::info!(user = %user_id, mode = %session.mode(), score, total, "session finished");

        let report = match session.kind() {
            SessionKind::Standard {
                subject_id,
                difficulty,
            } => {
                let result =
                    QuizResult::new(user_id, *subject_id, score, total, *difficulty, false, now)?;
                self.finalize_quiz(result, now).await
            }
            SessionKind::Mock { subject_id } => {
                let result = QuizResult::new(
                    user_id,
                    *subject_id,
                    score,
                    total,
                    DifficultyFilter::All,
                    true,
                    now,
                )?;
                self.finalize_quiz(result, now).await
            }
            SessionKind::Speed { elapsed } => {
                let total_secs: f64 = elapsed.iter().map(Duration::as_secs_f64).sum();
                let average_secs = if total == 0 {
                    0.0
                } else {
                    total_secs / f64::from(total)
                };
                SessionReport::Speed {
                    correct: score,
                    total,
                    total_secs,
                    average_secs,
                    rating: SpeedRating::from_average(average_secs),
                }
            }
            SessionKind::MistakeReview { .. } => SessionReport::MistakeReview {
                corrected: score,
                total,
            },
            SessionKind::SpacedReview { .. } => SessionReport::SpacedReview {
                remembered: score,
                total,
            },
        };
        Ok(report)
    }

    /// Persist a quiz result, then update the streak and evaluate achievements.
    ///
    /// Each step runs even if the previous one failed.
    async fn finalize_quiz(&self, result: QuizResult, now: DateTime<Utc>) -> SessionReport {
        let user_id = result.user_id();

        let saved = match self.storage.results.append_result(&result).await {
            Ok(id) => {
                tracing::debug!(user = %user_id, result = id, "result saved");
                true
            }
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "result not saved");
                false
            }
        };

        let streak = match self.streaks.record_activity(user_id, self.clock.today()).await {
            Ok(streak) => Some(streak),
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "streak not updated");
                None
            }
        };

        let new_achievements = match self.achievements.evaluate(user_id, now).await {
            Ok(fresh) => fresh,
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "achievements not evaluated");
                Vec::new()
            }
        };
        for achievement in &new_achievements {
            notify(
                &*self.notifier,
                user_id,
                Notification::AchievementUnlocked(*achievement),
            )
            .await;
        }

        SessionReport::Quiz {
            band: result.band(),
            result,
            saved,
            new_achievements,
            streak,
        }
    }

    /// Drop a session whose question vanished from the repository.
    ///
    /// Callers hold the user's slot lock and have already taken the session out.
    async fn abort(&self, user_id: UserId, question_id: QuestionId) {
        self.timeouts.cancel(user_id);
        tracing::warn!(user = %user_id, question = %question_id, "question missing, session aborted");
        notify(
            &*self.notifier,
            user_id,
            Notification::SessionAborted { question_id },
        )
        .await;
    }

    // ─── TIMERS AND QUERIES ────────────────────────────────────────────────

    /// React to an answer timer firing.
    ///
    /// The user is only told time is up if timer `generation` still guards
    /// `question_id` as the outstanding question; the session itself is left
    /// as it is.
    pub async fn handle_expired(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        generation: u64,
    ) -> ExpiryOutcome {
        let lease = SlotLease::new(&*self.sessions, user_id);
        let guard = lease.lock().await;

        let live = guard
            .as_ref()
            .is_some_and(|s| s.is_expiry_current(question_id, generation));
        if !live {
            tracing::debug!(user = %user_id, question = %question_id, generation, "stale timer ignored");
            return ExpiryOutcome::Stale;
        }

        notify(&*self.notifier, user_id, Notification::TimeUp { question_id }).await;
        ExpiryOutcome::Notified
    }

    /// The outstanding question of the user's session, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `UnknownQuestion` or a storage failure from loading the question.
    pub async fn current_prompt(
        &self,
        user_id: UserId,
    ) -> Result<Option<QuestionPrompt>, SessionError> {
        let lease = SlotLease::new(&*self.sessions, user_id);
        let guard = lease.lock().await;

        let Some(session) = guard.as_ref() else {
            return Ok(None);
        };
        let Some(question_id) = session.current_question() else {
            return Ok(None);
        };
        let question = self.fetch(question_id).await?;
        Ok(Some(QuestionPrompt {
            question,
            index: session.current_index(),
            total: session.total(),
            mode: session.mode(),
        }))
    }

    /// Mode of the user's running session.
    pub async fn active_mode(&self, user_id: UserId) -> Option<SessionMode> {
        let lease = SlotLease::new(&*self.sessions, user_id);
        let guard = lease.lock().await;
        guard.as_ref().map(Session::mode)
    }

    /// Drop the user's session without finalizing it. Returns `true` if one existed.
    pub async fn abandon(&self, user_id: UserId) -> bool {
        let lease = SlotLease::new(&*self.sessions, user_id);
        let mut guard = lease.lock().await;
        self.timeouts.cancel(user_id);
        let dropped = guard.take();
        if let Some(session) = &dropped {
            tracing::info!(user = %user_id, mode = %session.mode(), "session abandoned");
        }
        dropped.is_some()
    }

    async fn fetch(&self, question_id: QuestionId) -> Result<Question, SessionError> {
        self.storage
            .questions
            .get_question(question_id)
            .await
            .map_err(|err| match err {
                StorageError::NotFound => SessionError::UnknownQuestion(question_id),
                other => SessionError::Storage(other),
            })
    }
}
