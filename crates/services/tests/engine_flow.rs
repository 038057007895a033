use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_core::model::{
    Achievement, AnswerOption, Difficulty, DifficultyFilter, NewMistake, Question, QuestionId,
    QuizResult, SessionMode, Subject, SubjectId, UserId,
};
use quiz_core::time::{fixed_clock, fixed_now};
use quiz_services::{
    AnswerOutcome, AnswerRequest, ChannelNotifier, EngineConfig, EventReceiver,
    InMemorySessionStore, Notification, QuestionPrompt, QuestionSelector, QuizEngine, SessionError,
    SessionReport, SessionStore, StartOutcome, StartRequest, event_channel,
};
use quiz_storage::repository::{
    InMemoryRepository, MistakeRepository, QuestionRepository, ResultRepository,
    ReviewCardRepository, Storage, StorageError,
};
use tokio::sync::mpsc::UnboundedReceiver;

const USER: UserId = UserId::new(7);
const CORRECT: AnswerOption = AnswerOption::C;
const WRONG: AnswerOption = AnswerOption::A;

fn question(id: u64, subject: u64, difficulty: Difficulty) -> Question {
    Question::new(
        QuestionId::new(id),
        SubjectId::new(subject),
        format!("Question {id}?"),
        ["a".into(), "b".into(), "c".into(), "d".into()],
        CORRECT,
        difficulty,
    )
    .unwrap()
}

/// Subject 1 has questions 1..=12, subject 2 has 101..=105 of mixed difficulty.
async fn seed(repo: &InMemoryRepository) {
    repo.upsert_subject(&Subject::new(SubjectId::new(1), "Grammar", "📘").unwrap())
        .await
        .unwrap();
    repo.upsert_subject(&Subject::new(SubjectId::new(2), "Reading", "📗").unwrap())
        .await
        .unwrap();
    for id in 1..=12 {
        repo.upsert_question(&question(id, 1, Difficulty::Easy))
            .await
            .unwrap();
    }
    for (offset, difficulty) in [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Hard,
        Difficulty::Easy,
    ]
    .into_iter()
    .enumerate()
    {
        let id = 101 + offset as u64;
        repo.upsert_question(&question(id, 2, difficulty))
            .await
            .unwrap();
    }
}

struct Harness {
    engine: QuizEngine,
    storage: Storage,
    sessions: Arc<InMemorySessionStore>,
    notes: UnboundedReceiver<(UserId, Notification)>,
    _events: EventReceiver,
}

fn harness_with(storage: Storage, config: EngineConfig) -> Harness {
    let (tx, events) = event_channel();
    let (notifier, notes) = ChannelNotifier::new();
    let sessions = Arc::new(InMemorySessionStore::new());
    let engine = QuizEngine::new(storage.clone(), config, tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(11))
        .with_notifier(Arc::new(notifier))
        .with_session_store(Arc::clone(&sessions) as Arc<dyn SessionStore>);
    Harness {
        engine,
        storage,
        sessions,
        notes,
        _events: events,
    }
}

async fn harness() -> Harness {
    let repo = InMemoryRepository::new();
    seed(&repo).await;
    harness_with(Storage::from_repository(repo), EngineConfig::default())
}

fn start(mode: SessionMode, subject: Option<u64>, difficulty: DifficultyFilter) -> StartRequest {
    StartRequest {
        user_id: USER,
        mode,
        subject_id: subject.map(SubjectId::new),
        difficulty,
    }
}

fn answer(question_id: QuestionId, chosen: AnswerOption) -> AnswerRequest {
    AnswerRequest {
        user_id: USER,
        question_id,
        chosen,
    }
}

fn started(outcome: StartOutcome) -> QuestionPrompt {
    match outcome {
        StartOutcome::Started { first, .. } => first,
        other => panic!("session did not start: {other:?}"),
    }
}

/// Answer every remaining question, the first `correct` of them correctly.
async fn play(
    engine: &QuizEngine,
    first: QuestionPrompt,
    correct: usize,
) -> (Vec<QuestionId>, SessionReport) {
    let mut seen = vec![first.question.id()];
    let mut current = first;
    loop {
        let chosen = if current.index < correct { CORRECT } else { WRONG };
        match engine.answer(answer(current.question.id(), chosen)).await.unwrap() {
            AnswerOutcome::Next { next, .. } => {
                seen.push(next.question.id());
                current = next;
            }
            AnswerOutcome::Finished { report, .. } => return (seen, report),
        }
    }
}

#[tokio::test]
async fn standard_quiz_scores_persists_and_clears() {
    let mut h = harness().await;
    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    assert_eq!(first.total, 10);
    assert_eq!(first.index, 0);

    let (seen, report) = play(&h.engine, first, 7).await;
    assert_eq!(seen.len(), 10);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 10);
    assert!(seen.iter().all(|id| (1..=12).contains(&id.value())));

    let SessionReport::Quiz {
        result,
        saved,
        new_achievements,
        streak,
        ..
    } = report
    else {
        panic!("expected a quiz report");
    };
    assert_eq!(result.score(), 7);
    assert_eq!(result.total(), 10);
    assert!((result.percentage() - 70.0).abs() < f64::EPSILON);
    assert!(!result.is_mock());
    assert!(saved);
    assert_eq!(streak.map(|s| s.current), Some(1));
    assert!(new_achievements.contains(&Achievement::FirstTest));

    assert_eq!(h.storage.results.list_results(USER).await.unwrap().len(), 1);
    assert_eq!(
        h.storage
            .mistakes
            .unreviewed_for_user(USER, None)
            .await
            .unwrap()
            .len(),
        3
    );
    assert_eq!(h.engine.active_mode(USER).await, None);
    assert_eq!(h.engine.timeouts().pending(USER), None);

    let mut unlocked = Vec::new();
    while let Ok((_, note)) = h.notes.try_recv() {
        unlocked.push(note);
    }
    assert!(unlocked.contains(&Notification::AchievementUnlocked(Achievement::FirstTest)));
}

#[tokio::test]
async fn mock_exam_is_capped_by_pool_and_ignores_difficulty() {
    let h = harness().await;
    let first = started(
        h.engine
            .start(start(SessionMode::Mock, Some(2), DifficultyFilter::Hard))
            .await
            .unwrap(),
    );
    assert_eq!(first.total, 5);
    assert_eq!(first.mode, SessionMode::Mock);

    let (_, report) = play(&h.engine, first, 5).await;
    let SessionReport::Quiz { result, .. } = report else {
        panic!("expected a quiz report");
    };
    assert!(result.is_mock());
    assert_eq!(result.difficulty(), DifficultyFilter::All);
    assert_eq!(result.score(), 5);
}

#[tokio::test]
async fn difficulty_filter_narrows_standard_pool() {
    let h = harness().await;
    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(2), DifficultyFilter::Hard))
            .await
            .unwrap(),
    );
    assert_eq!(first.total, 2);
    assert_eq!(first.question.difficulty(), Difficulty::Hard);
}

#[tokio::test]
async fn quiz_modes_need_a_subject() {
    let h = harness().await;
    let err = h
        .engine
        .start(start(SessionMode::Standard, None, DifficultyFilter::All))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::SubjectRequired {
            mode: SessionMode::Standard
        }
    ));
}

#[tokio::test]
async fn empty_subject_is_insufficient_and_keeps_running_session() {
    let h = harness().await;
    started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );

    let err = h
        .engine
        .start(start(SessionMode::Standard, Some(9), DifficultyFilter::All))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InsufficientQuestions { .. }));
    assert_eq!(h.engine.active_mode(USER).await, Some(SessionMode::Standard));
}

#[tokio::test]
async fn new_session_replaces_old_one() {
    let h = harness().await;
    let quiz = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    started(
        h.engine
            .start(start(SessionMode::Mock, Some(2), DifficultyFilter::All))
            .await
            .unwrap(),
    );

    assert_eq!(h.engine.active_mode(USER).await, Some(SessionMode::Mock));
    let err = h
        .engine
        .answer(answer(quiz.question.id(), CORRECT))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
}

#[tokio::test]
async fn answer_without_session_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .answer(answer(QuestionId::new(1), CORRECT))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
}

#[tokio::test]
async fn duplicate_answer_does_not_rescore() {
    let h = harness().await;
    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    let id = first.question.id();

    let outcome = h.engine.answer(answer(id, CORRECT)).await.unwrap();
    let AnswerOutcome::Next { score, .. } = outcome else {
        panic!("expected next question");
    };
    assert_eq!(score, 1);

    let err = h.engine.answer(answer(id, CORRECT)).await.unwrap_err();
    assert!(matches!(err, SessionError::DuplicateAnswer { question_id } if question_id == id));

    let prompt = h.engine.current_prompt(USER).await.unwrap().unwrap();
    assert_eq!(prompt.index, 1);
}

#[tokio::test]
async fn answering_ahead_is_out_of_order() {
    let repo = InMemoryRepository::new();
    seed(&repo).await;
    let config = EngineConfig {
        questions_per_quiz: 12,
        ..EngineConfig::default()
    };
    let h = harness_with(Storage::from_repository(repo), config);

    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    let other = (1..=12)
        .map(QuestionId::new)
        .find(|id| *id != first.question.id())
        .unwrap();

    let err = h.engine.answer(answer(other, CORRECT)).await.unwrap_err();
    assert!(matches!(err, SessionError::OutOfOrder { expected, .. } if expected == first.question.id()));
}

#[tokio::test]
async fn speed_round_needs_minimum_pool() {
    let repo = InMemoryRepository::new();
    repo.upsert_subject(&Subject::new(SubjectId::new(1), "Tiny", "📕").unwrap())
        .await
        .unwrap();
    for id in 1..=3 {
        repo.upsert_question(&question(id, 1, Difficulty::Easy))
            .await
            .unwrap();
    }
    let h = harness_with(Storage::from_repository(repo), EngineConfig::default());

    let err = h
        .engine
        .start(start(SessionMode::Speed, None, DifficultyFilter::All))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InsufficientQuestions {
            available: 3,
            required: 5
        }
    ));
    assert_eq!(h.engine.active_mode(USER).await, None);
}

#[tokio::test]
async fn mistake_review_marks_grouped_mistakes_reviewed() {
    let h = harness().await;
    for q in [4_u64, 4, 5] {
        h.storage
            .mistakes
            .create_mistake(NewMistake {
                user_id: USER,
                question_id: QuestionId::new(q),
                chosen: WRONG,
                correct: CORRECT,
                answered_at: fixed_now(),
            })
            .await
            .unwrap();
    }

    let first = started(
        h.engine
            .start(start(SessionMode::MistakeReview, None, DifficultyFilter::All))
            .await
            .unwrap(),
    );
    assert_eq!(first.total, 2);
    assert_eq!(first.question.id(), QuestionId::new(5));

    let (_, report) = play(&h.engine, first, 2).await;
    assert_eq!(
        report,
        SessionReport::MistakeReview {
            corrected: 2,
            total: 2
        }
    );
    assert!(h
        .storage
        .mistakes
        .unreviewed_for_user(USER, None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.storage.mistakes.reviewed_count(USER).await.unwrap(), 3);
    assert!(h.storage.results.list_results(USER).await.unwrap().is_empty());

    assert_eq!(
        h.engine
            .start(start(SessionMode::MistakeReview, None, DifficultyFilter::All))
            .await
            .unwrap(),
        StartOutcome::NothingToReview
    );
}

#[tokio::test]
async fn wrong_review_answer_creates_no_new_mistake() {
    let h = harness().await;
    h.storage
        .mistakes
        .create_mistake(NewMistake {
            user_id: USER,
            question_id: QuestionId::new(2),
            chosen: WRONG,
            correct: CORRECT,
            answered_at: fixed_now(),
        })
        .await
        .unwrap();

    let first = started(
        h.engine
            .start(start(SessionMode::MistakeReview, None, DifficultyFilter::All))
            .await
            .unwrap(),
    );
    let (_, report) = play(&h.engine, first, 0).await;
    assert_eq!(
        report,
        SessionReport::MistakeReview {
            corrected: 0,
            total: 1
        }
    );
    assert_eq!(
        h.storage
            .mistakes
            .unreviewed_for_user(USER, None)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn spaced_review_with_nothing_due() {
    let h = harness().await;
    let outcome = h
        .engine
        .start(start(SessionMode::SpacedReview, None, DifficultyFilter::All))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        StartOutcome::NothingDue {
            next_due: None,
            total_cards: 0
        }
    );
    assert_eq!(h.engine.active_mode(USER).await, None);
}

#[tokio::test]
async fn spaced_review_reschedules_materialized_card() {
    let h = harness().await;
    let today = fixed_now().date_naive();
    h.storage
        .mistakes
        .create_mistake(NewMistake {
            user_id: USER,
            question_id: QuestionId::new(3),
            chosen: WRONG,
            correct: CORRECT,
            answered_at: fixed_now(),
        })
        .await
        .unwrap();

    let first = started(
        h.engine
            .start(start(SessionMode::SpacedReview, None, DifficultyFilter::All))
            .await
            .unwrap(),
    );
    assert_eq!(first.question.id(), QuestionId::new(3));

    let outcome = h
        .engine
        .answer(answer(QuestionId::new(3), CORRECT))
        .await
        .unwrap();
    assert_eq!(outcome.feedback().next_review, today.succ_opt());
    let AnswerOutcome::Finished { report, .. } = outcome else {
        panic!("single-card review should finish");
    };
    assert_eq!(
        report,
        SessionReport::SpacedReview {
            remembered: 1,
            total: 1
        }
    );

    let card = h
        .storage
        .review_cards
        .get_card(USER, QuestionId::new(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.repetitions, 1);
    assert_eq!(card.last_reviewed_date, Some(today));

    assert_eq!(
        h.engine
            .start(start(SessionMode::SpacedReview, None, DifficultyFilter::All))
            .await
            .unwrap(),
        StartOutcome::NothingDue {
            next_due: today.succ_opt(),
            total_cards: 1
        }
    );
}

//
// ─── FAILURE INJECTION ─────────────────────────────────────────────────────────
//

/// Question repository that can hide questions after a session started.
#[derive(Clone, Default)]
struct VanishingQuestions {
    inner: InMemoryRepository,
    hidden: Arc<Mutex<HashSet<QuestionId>>>,
}

impl VanishingQuestions {
    fn hide(&self, id: QuestionId) {
        self.hidden.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl QuestionRepository for VanishingQuestions {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        self.inner.upsert_subject(subject).await
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        self.inner.list_subjects().await
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        self.inner.upsert_question(question).await
    }

    async fn find_questions(
        &self,
        subject_id: SubjectId,
        filter: DifficultyFilter,
    ) -> Result<Vec<Question>, StorageError> {
        self.inner.find_questions(subject_id, filter).await
    }

    async fn all_questions(&self) -> Result<Vec<Question>, StorageError> {
        self.inner.all_questions().await
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        if self.hidden.lock().unwrap().contains(&id) {
            return Err(StorageError::NotFound);
        }
        self.inner.get_question(id).await
    }
}

#[tokio::test]
async fn missing_question_aborts_session() {
    let repo = InMemoryRepository::new();
    seed(&repo).await;
    let questions = VanishingQuestions {
        inner: repo.clone(),
        ..VanishingQuestions::default()
    };
    let mut storage = Storage::from_repository(repo);
    storage.questions = Arc::new(questions.clone());
    let mut h = harness_with(storage, EngineConfig::default());

    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    questions.hide(first.question.id());

    let err = h
        .engine
        .answer(answer(first.question.id(), CORRECT))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownQuestion(id) if id == first.question.id()));
    assert_eq!(h.engine.active_mode(USER).await, None);
    assert_eq!(h.engine.timeouts().pending(USER), None);
    assert!(h.storage.results.list_results(USER).await.unwrap().is_empty());
    assert_eq!(
        h.notes.try_recv().unwrap(),
        (
            USER,
            Notification::SessionAborted {
                question_id: first.question.id()
            }
        )
    );
}

#[tokio::test]
async fn review_of_missing_question_does_not_start() {
    let h = harness().await;
    h.storage
        .mistakes
        .create_mistake(NewMistake {
            user_id: USER,
            question_id: QuestionId::new(999),
            chosen: WRONG,
            correct: CORRECT,
            answered_at: fixed_now(),
        })
        .await
        .unwrap();

    let err = h
        .engine
        .start(start(SessionMode::MistakeReview, None, DifficultyFilter::All))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownQuestion(id) if id == QuestionId::new(999)));
    assert_eq!(h.engine.active_mode(USER).await, None);
}

/// Result store whose writes always fail.
struct BrokenResults;

#[async_trait]
impl ResultRepository for BrokenResults {
    async fn append_result(&self, _result: &QuizResult) -> Result<i64, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }

    async fn list_results(&self, _user_id: UserId) -> Result<Vec<QuizResult>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_result_write_still_clears_session() {
    let repo = InMemoryRepository::new();
    seed(&repo).await;
    let mut storage = Storage::from_repository(repo);
    storage.results = Arc::new(BrokenResults);
    let h = harness_with(storage, EngineConfig::default());

    let first = started(
        h.engine
            .start(start(SessionMode::Mock, Some(2), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    let (_, report) = play(&h.engine, first, 4).await;

    let SessionReport::Quiz {
        result,
        saved,
        streak,
        ..
    } = report
    else {
        panic!("expected a quiz report");
    };
    assert!(!saved);
    assert_eq!(result.score(), 4);
    assert_eq!(streak.map(|s| s.total_tests), Some(1));
    assert_eq!(h.engine.active_mode(USER).await, None);
}

#[tokio::test]
async fn finished_and_rejected_calls_leave_no_slots() {
    let h = harness().await;
    for user in 100..200 {
        let user_id = UserId::new(user);
        let err = h
            .engine
            .answer(AnswerRequest {
                user_id,
                question_id: QuestionId::new(1),
                chosen: CORRECT,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession));
        assert_eq!(h.engine.active_mode(user_id).await, None);
    }
    assert!(h.sessions.is_empty());

    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    assert_eq!(h.sessions.len(), 1);

    let (_, report) = play(&h.engine, first, 10).await;
    assert!(matches!(report, SessionReport::Quiz { .. }));
    assert_eq!(h.sessions.len(), 0);
    assert_eq!(h.engine.timeouts().live(), 0);
}

#[tokio::test]
async fn abandon_drops_session_and_timer_without_a_result() {
    let h = harness().await;
    let first = started(
        h.engine
            .start(start(SessionMode::Standard, Some(1), DifficultyFilter::All))
            .await
            .unwrap(),
    );
    assert_eq!(h.engine.timeouts().pending(USER), Some(first.question.id()));

    assert!(h.engine.abandon(USER).await);
    assert_eq!(h.engine.timeouts().pending(USER), None);
    assert!(h.sessions.is_empty());
    assert!(h.storage.results.list_results(USER).await.unwrap().is_empty());
    assert!(matches!(
        h.engine.answer(answer(first.question.id(), CORRECT)).await,
        Err(SessionError::NoActiveSession)
    ));
    assert!(!h.engine.abandon(USER).await);
}
