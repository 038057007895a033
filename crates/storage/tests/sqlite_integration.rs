use chrono::Duration;
use quiz_core::model::{
    Achievement, AnswerOption, Difficulty, DifficultyFilter, MistakeId, NewMistake, Quality,
    Question, QuestionId, QuizResult, Streak, Subject, SubjectId, UserId,
};
use quiz_core::scheduler::Scheduler;
use quiz_core::time::fixed_now;
use quiz_storage::repository::{
    AchievementRepository, MistakeRepository, QuestionRepository, ResultRepository,
    ReviewCardRepository, StorageError, StreakRepository,
};
use quiz_storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn question(id: u64, subject: u64, difficulty: Difficulty) -> Question {
    Question::new(
        QuestionId::new(id),
        SubjectId::new(subject),
        format!("What is {id}?"),
        ["alpha".into(), "beta".into(), "gamma".into(), "delta".into()],
        AnswerOption::C,
        difficulty,
    )
    .unwrap()
}

async fn seed_bank(repo: &SqliteRepository) {
    repo.upsert_subject(&Subject::new(SubjectId::new(1), "Grammar", "📘").unwrap())
        .await
        .unwrap();
    repo.upsert_subject(&Subject::new(SubjectId::new(2), "Vocabulary", "📗").unwrap())
        .await
        .unwrap();
    for id in 1..=6 {
        let difficulty = if id % 2 == 0 { Difficulty::Hard } else { Difficulty::Easy };
        repo.upsert_question(&question(id, 1, difficulty)).await.unwrap();
    }
    repo.upsert_question(&question(7, 2, Difficulty::Medium))
        .await
        .unwrap();
}

#[tokio::test]
async fn sqlite_question_bank_roundtrip() {
    let repo = connect("memdb_questions").await;
    seed_bank(&repo).await;

    let subjects = repo.list_subjects().await.unwrap();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[1].name, "Vocabulary");

    let all = repo
        .find_questions(SubjectId::new(1), DifficultyFilter::All)
        .await
        .unwrap();
    assert_eq!(all.len(), 6);
    let hard = repo
        .find_questions(SubjectId::new(1), DifficultyFilter::Hard)
        .await
        .unwrap();
    assert_eq!(hard.len(), 3);
    assert!(hard.iter().all(|q| q.difficulty() == Difficulty::Hard));

    assert_eq!(repo.all_questions().await.unwrap().len(), 7);

    let fetched = repo.get_question(QuestionId::new(7)).await.unwrap();
    assert_eq!(fetched, question(7, 2, Difficulty::Medium));
    assert_eq!(fetched.option_text(AnswerOption::C), "gamma");

    assert!(matches!(
        repo.get_question(QuestionId::new(70)).await,
        Err(StorageError::NotFound)
    ));
    assert!(matches!(
        repo.upsert_question(&question(8, 9, Difficulty::Easy)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_results_are_appended_per_user() {
    let repo = connect("memdb_results").await;
    seed_bank(&repo).await;

    let user = UserId::new(42);
    let first = QuizResult::new(
        user,
        SubjectId::new(1),
        7,
        10,
        DifficultyFilter::All,
        false,
        fixed_now(),
    )
    .unwrap();
    let second = QuizResult::new(
        user,
        SubjectId::new(2),
        30,
        40,
        DifficultyFilter::All,
        true,
        fixed_now() + Duration::minutes(30),
    )
    .unwrap();

    let id1 = repo.append_result(&first).await.unwrap();
    let id2 = repo.append_result(&second).await.unwrap();
    assert!(id2 > id1);

    let results = repo.list_results(user).await.unwrap();
    assert_eq!(results, vec![first, second]);
    assert!(repo.list_results(UserId::new(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_mistakes_track_review_state() {
    let repo = connect("memdb_mistakes").await;
    seed_bank(&repo).await;
    let user = UserId::new(5);

    for (offset, q) in [1_u64, 2, 3].into_iter().enumerate() {
        repo.create_mistake(NewMistake {
            user_id: user,
            question_id: QuestionId::new(q),
            chosen: AnswerOption::A,
            correct: AnswerOption::C,
            answered_at: fixed_now() + Duration::seconds(i64::try_from(offset).unwrap()),
        })
        .await
        .unwrap();
    }

    let newest = repo.unreviewed_for_user(user, Some(2)).await.unwrap();
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].question_id, QuestionId::new(3));
    assert!(!newest[0].reviewed);

    repo.mark_reviewed(newest[0].id).await.unwrap();
    assert_eq!(repo.reviewed_count(user).await.unwrap(), 1);
    assert_eq!(repo.unreviewed_for_user(user, None).await.unwrap().len(), 2);

    assert_eq!(repo.clear_for_user(user).await.unwrap(), 2);
    assert_eq!(repo.reviewed_count(user).await.unwrap(), 3);
    assert!(matches!(
        repo.mark_reviewed(MistakeId::new(999)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_review_cards_follow_due_dates() {
    let repo = connect("memdb_cards").await;
    seed_bank(&repo).await;
    let user = UserId::new(9);
    let today = fixed_now().date_naive();

    let card = repo.create_card(user, QuestionId::new(1), today).await.unwrap();
    let other = repo.create_card(user, QuestionId::new(2), today).await.unwrap();
    assert!(matches!(
        repo.create_card(user, QuestionId::new(1), today).await,
        Err(StorageError::Conflict)
    ));

    let reviewed = Scheduler::new()
        .apply_review(&other, Quality::PASS, today)
        .unwrap()
        .card;
    repo.save_card(&reviewed).await.unwrap();

    let due = repo.due_for_user(user, today).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, card.id);

    let tomorrow = today.succ_opt().unwrap();
    assert_eq!(repo.due_for_user(user, tomorrow).await.unwrap().len(), 2);

    let stored = repo.get_card_by_id(reviewed.id).await.unwrap();
    assert_eq!(stored, reviewed);
    assert_eq!(
        repo.get_card(user, QuestionId::new(2)).await.unwrap(),
        Some(reviewed)
    );
    assert!(repo.get_card(user, QuestionId::new(3)).await.unwrap().is_none());
    assert_eq!(repo.list_for_user(user).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_streaks_and_achievements_persist() {
    let repo = connect("memdb_progress").await;
    let user = UserId::new(11);

    assert_eq!(repo.get_streak(user).await.unwrap(), Streak::default());

    let mut streak = Streak::default();
    streak.record_activity(fixed_now().date_naive());
    repo.save_streak(user, &streak).await.unwrap();
    streak.record_activity(fixed_now().date_naive().succ_opt().unwrap());
    repo.save_streak(user, &streak).await.unwrap();
    assert_eq!(repo.get_streak(user).await.unwrap(), streak);

    assert!(repo.award(user, Achievement::FirstTest, fixed_now()).await.unwrap());
    assert!(!repo.award(user, Achievement::FirstTest, fixed_now()).await.unwrap());
    assert!(repo.award(user, Achievement::Streak3, fixed_now()).await.unwrap());

    let awarded = repo.awarded(user).await.unwrap();
    let keys: Vec<&str> = awarded.iter().map(|a| a.achievement.key()).collect();
    assert_eq!(keys, vec!["first_test", "streak_3"]);
}
