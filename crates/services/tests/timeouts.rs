use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{
    AnswerOption, Difficulty, DifficultyFilter, Question, QuestionId, SessionMode, Subject,
    SubjectId, UserId,
};
use quiz_core::time::fixed_clock;
use quiz_services::{
    AnswerOutcome, AnswerRequest, ChannelNotifier, EngineConfig, EngineReply, ExpiryOutcome,
    Notification, QuestionSelector, QuizEngine, QuizEvent, SessionReport, StartOutcome,
    StartRequest, event_channel,
};
use quiz_storage::repository::{InMemoryRepository, QuestionRepository, Storage};

const USER: UserId = UserId::new(3);
const TIMEOUT: Duration = Duration::from_secs(30);

async fn storage() -> Storage {
    let repo = InMemoryRepository::new();
    repo.upsert_subject(&Subject::new(SubjectId::new(1), "Grammar", "📘").unwrap())
        .await
        .unwrap();
    for id in 1..=6 {
        let q = Question::new(
            QuestionId::new(id),
            SubjectId::new(1),
            format!("Q{id}"),
            ["w".into(), "x".into(), "y".into(), "z".into()],
            AnswerOption::B,
            Difficulty::Medium,
        )
        .unwrap();
        repo.upsert_question(&q).await.unwrap();
    }
    Storage::from_repository(repo)
}

fn start_request(mode: SessionMode) -> StartRequest {
    StartRequest {
        user_id: USER,
        mode,
        subject_id: Some(SubjectId::new(1)),
        difficulty: DifficultyFilter::All,
    }
}

fn expired_question(event: QuizEvent) -> QuestionId {
    match event {
        QuizEvent::Expired {
            user_id,
            question_id,
            ..
        } => {
            assert_eq!(user_id, USER);
            question_id
        }
        other => panic!("expected an expiry, got {other:?}"),
    }
}

fn first_question(outcome: StartOutcome) -> QuestionId {
    match outcome {
        StartOutcome::Started { first, .. } => first.question.id(),
        other => panic!("session did not start: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn expiry_notifies_and_late_answer_still_counts() {
    let (tx, mut events) = event_channel();
    let (notifier, mut notes) = ChannelNotifier::new();
    let engine = QuizEngine::new(storage().await, EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(5))
        .with_notifier(Arc::new(notifier));

    let first = first_question(engine.start(start_request(SessionMode::Standard)).await.unwrap());

    let event = events.recv().await.unwrap();
    assert_eq!(expired_question(event), first);
    assert_eq!(
        engine.handle(event).await.unwrap(),
        EngineReply::Expired(ExpiryOutcome::Notified)
    );
    assert_eq!(
        notes.try_recv().unwrap(),
        (USER, Notification::TimeUp { question_id: first })
    );

    // Nothing was auto-scored; the late answer is accepted.
    let outcome = engine
        .answer(AnswerRequest {
            user_id: USER,
            question_id: first,
            chosen: AnswerOption::B,
        })
        .await
        .unwrap();
    let AnswerOutcome::Next { score, feedback, .. } = outcome else {
        panic!("expected next question");
    };
    assert!(feedback.is_correct);
    assert_eq!(score, 1);
}

#[tokio::test(start_paused = true)]
async fn answering_restarts_timer_for_next_question() {
    let (tx, mut events) = event_channel();
    let engine = QuizEngine::new(storage().await, EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(5));

    let first = first_question(engine.start(start_request(SessionMode::Standard)).await.unwrap());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let outcome = engine
        .answer(AnswerRequest {
            user_id: USER,
            question_id: first,
            chosen: AnswerOption::A,
        })
        .await
        .unwrap();
    let AnswerOutcome::Next { next, .. } = outcome else {
        panic!("expected next question");
    };
    let second = next.question.id();
    assert_eq!(engine.timeouts().pending(USER), Some(second));

    // The first question's deadline passes without an event.
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(events.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(expired_question(events.try_recv().unwrap()), second);
}

#[tokio::test(start_paused = true)]
async fn stale_expiry_is_ignored() {
    let (tx, _events) = event_channel();
    let (notifier, mut notes) = ChannelNotifier::new();
    let engine = QuizEngine::new(storage().await, EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(5))
        .with_notifier(Arc::new(notifier));

    let first = first_question(engine.start(start_request(SessionMode::Standard)).await.unwrap());
    engine
        .answer(AnswerRequest {
            user_id: USER,
            question_id: first,
            chosen: AnswerOption::B,
        })
        .await
        .unwrap();

    assert_eq!(
        engine.handle_expired(USER, first, 1).await,
        ExpiryOutcome::Stale
    );
    assert_eq!(
        engine.handle_expired(UserId::new(99), first, 1).await,
        ExpiryOutcome::Stale
    );
    assert!(notes.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn replacing_session_cancels_old_timer() {
    let (tx, mut events) = event_channel();
    let engine = QuizEngine::new(storage().await, EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(5));

    engine.start(start_request(SessionMode::Standard)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    let mock_first = first_question(engine.start(start_request(SessionMode::Mock)).await.unwrap());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(events.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(expired_question(events.try_recv().unwrap()), mock_first);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn earlier_expiry_does_not_hit_a_restarted_question() {
    let repo = InMemoryRepository::new();
    repo.upsert_subject(&Subject::new(SubjectId::new(1), "Grammar", "📘").unwrap())
        .await
        .unwrap();
    let only = Question::new(
        QuestionId::new(1),
        SubjectId::new(1),
        "Only one",
        ["w".into(), "x".into(), "y".into(), "z".into()],
        AnswerOption::B,
        Difficulty::Easy,
    )
    .unwrap();
    repo.upsert_question(&only).await.unwrap();

    let (tx, mut events) = event_channel();
    let (notifier, mut notes) = ChannelNotifier::new();
    let engine = QuizEngine::new(Storage::from_repository(repo), EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_notifier(Arc::new(notifier));

    let first = first_question(engine.start(start_request(SessionMode::Standard)).await.unwrap());
    let earlier = events.recv().await.unwrap();

    // A fresh session opens on the very same question before the expiry is handled.
    let again = first_question(engine.start(start_request(SessionMode::Standard)).await.unwrap());
    assert_eq!(again, first);
    assert_eq!(
        engine.handle(earlier).await.unwrap(),
        EngineReply::Expired(ExpiryOutcome::Stale)
    );
    assert!(notes.try_recv().is_err());

    let current = events.recv().await.unwrap();
    assert_eq!(
        engine.handle(current).await.unwrap(),
        EngineReply::Expired(ExpiryOutcome::Notified)
    );
    assert_eq!(
        notes.try_recv().unwrap(),
        (USER, Notification::TimeUp { question_id: first })
    );
}

#[tokio::test(start_paused = true)]
async fn speed_round_reports_elapsed_time() {
    let (tx, _events) = event_channel();
    let engine = QuizEngine::new(storage().await, EngineConfig::default(), tx)
        .with_clock(fixed_clock())
        .with_selector(QuestionSelector::seeded(9));

    let outcome = engine.start(start_request(SessionMode::Speed)).await.unwrap();
    let StartOutcome::Started { total, first, .. } = outcome else {
        panic!("speed round did not start");
    };
    assert_eq!(total, 6);

    let mut current = first.question.id();
    let report = loop {
        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = engine
            .answer(AnswerRequest {
                user_id: USER,
                question_id: current,
                chosen: AnswerOption::B,
            })
            .await
            .unwrap();
        assert_eq!(outcome.feedback().elapsed, Some(Duration::from_secs(2)));
        match outcome {
            AnswerOutcome::Next { next, .. } => current = next.question.id(),
            AnswerOutcome::Finished { report, .. } => break report,
        }
    };

    let SessionReport::Speed {
        correct,
        total,
        total_secs,
        average_secs,
        ..
    } = report
    else {
        panic!("expected a speed report");
    };
    assert_eq!((correct, total), (6, 6));
    assert!((total_secs - 12.0).abs() < 1e-9);
    assert!((average_secs - 2.0).abs() < 1e-9);
    assert_eq!(engine.timeouts().live(), 0);
}

#[test]
fn default_timeout_is_thirty_seconds() {
    assert_eq!(EngineConfig::default().answer_timeout(), TIMEOUT);
}
