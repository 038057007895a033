use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::{AnswerOption, DifficultyFilter, QuestionId, SessionMode, SubjectId, UserId};
use quiz_services::{
    AnswerFeedback, AnswerOutcome, AnswerRequest, BandHistory, ChannelNotifier, EngineConfig,
    EngineReply, Notification, QuestionPrompt, QuizEngine, QuizEvent, QuizRuntime, SessionError,
    SessionReport, SpeedRating, StartOutcome, StartRequest, StatsService, StatsSummary, Trend,
    event_channel,
};
use quiz_storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidSubjectId { raw: String },
    InvalidMode { raw: String },
    InvalidDifficulty { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidSubjectId { raw } => write!(f, "invalid --subject value: {raw}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidDifficulty { raw } => write!(f, "invalid --difficulty value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- play [options]");
    eprintln!("  cargo run -p app -- subjects [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- stats [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- clear-mistakes [--db <sqlite_url>] [--user <id>]");
    eprintln!();
    eprintln!("Options for play:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3)");
    eprintln!("  --user <id>               Player id (default: 1)");
    eprintln!("  --subject <id>            Subject, required for quiz and mock");
    eprintln!("  --mode <mode>             quiz | mock | speed | mistakes | spaced (default: quiz)");
    eprintln!("  --difficulty <level>      easy | medium | hard | all (default: all)");
    eprintln!("  --config <path>           JSON engine config");
    eprintln!();
    eprintln!("While playing, answer with a-d or type q to abandon the session.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_USER_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Subjects,
    Stats,
    ClearMistakes,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "subjects" => Some(Self::Subjects),
            "stats" => Some(Self::Stats),
            "clear-mistakes" => Some(Self::ClearMistakes),
            _ => None,
        }
    }
}

fn parse_mode(raw: &str) -> Option<SessionMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "quiz" | "standard" => Some(SessionMode::Standard),
        "mock" => Some(SessionMode::Mock),
        "speed" => Some(SessionMode::Speed),
        "mistakes" | "mistake_review" => Some(SessionMode::MistakeReview),
        "spaced" | "spaced_review" => Some(SessionMode::SpacedReview),
        _ => None,
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    user_id: UserId,
    subject_id: Option<SubjectId>,
    mode: SessionMode,
    difficulty: DifficultyFilter,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:quiz.sqlite3".into()), normalize_sqlite_url);
        let mut user_id = std::env::var("QUIZ_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or(UserId::new(1));
        let mut subject_id = None;
        let mut mode = SessionMode::Standard;
        let mut difficulty = DifficultyFilter::All;
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--subject" => {
                    let value = require_value(args, "--subject")?;
                    subject_id = Some(
                        value
                            .parse()
                            .map_err(|_| ArgsError::InvalidSubjectId { raw: value.clone() })?,
                    );
                }
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    mode = parse_mode(&value).ok_or(ArgsError::InvalidMode { raw: value })?;
                }
                "--difficulty" => {
                    let value = require_value(args, "--difficulty")?;
                    difficulty = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidDifficulty { raw: value.clone() })?;
                }
                "--config" => {
                    config = Some(PathBuf::from(require_value(args, "--config")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            subject_id,
            mode,
            difficulty,
            config,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn render_prompt(prompt: &QuestionPrompt) {
    let question = &prompt.question;
    println!();
    println!(
        "[{} {}/{}] {}",
        prompt.mode,
        prompt.index + 1,
        prompt.total,
        question.text()
    );
    for option in AnswerOption::ALL {
        println!("  {option}) {}", question.option_text(option));
    }
}

fn render_feedback(feedback: &AnswerFeedback) {
    if feedback.is_correct {
        println!("Correct.");
    } else {
        println!("Wrong, the answer was {}.", feedback.correct);
    }
    if let Some(elapsed) = feedback.elapsed {
        println!("  {:.1}s", elapsed.as_secs_f64());
    }
    if let Some(next) = feedback.next_review {
        println!("  next review on {next}");
    }
}

fn render_report(report: &SessionReport) {
    println!();
    match report {
        SessionReport::Quiz {
            result,
            band,
            saved,
            new_achievements,
            streak,
        } => {
            println!(
                "Finished: {}/{} ({:.1}%), band {}",
                result.score(),
                result.total(),
                result.percentage(),
                band.band_range()
            );
            if !saved {
                println!("(the result could not be saved)");
            }
            if let Some(streak) = streak {
                println!("Streak: {} day(s), best {}", streak.current, streak.longest);
            }
            for achievement in new_achievements {
                println!("Unlocked {} {}", achievement.emoji(), achievement.name());
            }
        }
        SessionReport::Speed {
            correct,
            total,
            total_secs,
            average_secs,
            rating,
        } => {
            let pace = match rating {
                SpeedRating::Lightning => "lightning fast",
                SpeedRating::Fast => "very fast",
                SpeedRating::Good => "good pace",
                SpeedRating::Slow => "keep practicing",
            };
            println!(
                "Speed round: {correct}/{total} in {total_secs:.1}s ({average_secs:.1}s per question, {pace})"
            );
        }
        SessionReport::MistakeReview { corrected, total } => {
            println!("Mistake review: {corrected}/{total} corrected");
        }
        SessionReport::SpacedReview { remembered, total } => {
            println!("Spaced review: {remembered}/{total} remembered");
        }
    }
}

fn render_summary(summary: &StatsSummary) {
    println!(
        "Average {:.1}% (band {}), {} tests, {} mock, best {:.0}%",
        summary.average,
        summary.band.band_range(),
        summary.total_tests,
        summary.mock_tests,
        summary.best
    );
    println!(
        "Streak: {} day(s), longest {}",
        summary.current_streak, summary.longest_streak
    );
    for subject in &summary.subjects {
        let label = subject
            .subject
            .as_ref()
            .map_or_else(|| "?".to_owned(), |s| format!("{} {}", s.emoji, s.name));
        println!(
            "  {label}: {} tests, average {:.0}%, best {:.0}%",
            subject.tests, subject.average, subject.best
        );
    }
}

fn render_history(history: &BandHistory) {
    println!();
    for (i, result) in history.recent.iter().enumerate() {
        let mock = if result.is_mock() { " mock" } else { "" };
        println!(
            "{:>2}. subject {} {:.0}% (band {}){mock} {}",
            i + 1,
            result.subject_id(),
            result.percentage(),
            result.band().band_range(),
            result.completed_at().format("%d.%m %H:%M")
        );
    }
    match history.trend {
        Some(Trend::Improving(delta)) => println!("Trend: +{delta:.1}%, improving"),
        Some(Trend::Declining(delta)) => println!("Trend: {delta:.1}%, practice more"),
        Some(Trend::Steady) => println!("Trend: steady"),
        None => {}
    }
}

fn render_notification(notification: &Notification) {
    match notification {
        Notification::TimeUp { .. } => println!("Time is up! You can still answer."),
        Notification::AchievementUnlocked(achievement) => {
            println!("Achievement: {} {}", achievement.emoji(), achievement.name());
        }
        Notification::SessionAborted { question_id } => {
            println!("Question {question_id} is no longer available; session stopped.");
        }
    }
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

/// What the play loop should do after an engine reply.
enum Step {
    Ask(QuestionId),
    Stay,
    Done,
}

fn on_reply(result: Result<EngineReply, SessionError>) -> Step {
    match result {
        Ok(EngineReply::Started(StartOutcome::Started { first, .. })) => {
            render_prompt(&first);
            Step::Ask(first.question.id())
        }
        Ok(EngineReply::Started(StartOutcome::NothingToReview)) => {
            println!("No mistakes to review.");
            Step::Done
        }
        Ok(EngineReply::Started(StartOutcome::NothingDue {
            next_due,
            total_cards,
        })) => {
            match next_due {
                Some(date) => println!("Nothing due today ({total_cards} cards, next on {date})."),
                None => println!("Nothing due today ({total_cards} cards)."),
            }
            Step::Done
        }
        Ok(EngineReply::Answered(AnswerOutcome::Next { feedback, next, .. })) => {
            render_feedback(&feedback);
            render_prompt(&next);
            Step::Ask(next.question.id())
        }
        Ok(EngineReply::Answered(AnswerOutcome::Finished { feedback, report })) => {
            render_feedback(&feedback);
            render_report(&report);
            Step::Done
        }
        Ok(EngineReply::Expired(_)) => Step::Stay,
        Err(err @ (SessionError::DuplicateAnswer { .. } | SessionError::OutOfOrder { .. })) => {
            println!("{err}");
            Step::Stay
        }
        Err(err) => {
            println!("{err}");
            Step::Done
        }
    }
}

async fn play(args: Args, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(args.config.as_deref())?;
    let (events, inbound) = event_channel();
    let (notifier, mut notes) = ChannelNotifier::new();
    let engine = Arc::new(
        QuizEngine::new(storage, config, events.clone()).with_notifier(Arc::new(notifier)),
    );
    let (runtime, mut outputs) = QuizRuntime::new(Arc::clone(&engine), inbound);
    tokio::spawn(runtime.run());

    let user_id = args.user_id;
    tracing::info!(user = %user_id, mode = %args.mode, "starting session");
    events.send(QuizEvent::Start(StartRequest {
        user_id,
        mode: args.mode,
        subject_id: args.subject_id,
        difficulty: args.difficulty,
    }))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current: Option<QuestionId> = None;

    loop {
        tokio::select! {
            Some(output) = outputs.recv() => {
                match on_reply(output.result) {
                    Step::Ask(question_id) => current = Some(question_id),
                    Step::Stay => {}
                    Step::Done => break,
                }
            }
            Some((_, notification)) = notes.recv() => render_notification(&notification),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if matches!(line.trim(), "q" | "quit") {
                    if engine.abandon(user_id).await {
                        println!("Session abandoned.");
                    }
                    break;
                }
                let Some(question_id) = current else { continue };
                match line.parse::<AnswerOption>() {
                    Ok(chosen) => events.send(QuizEvent::Answer(AnswerRequest {
                        user_id,
                        question_id,
                        chosen,
                    }))?,
                    Err(_) => println!("Answer with a, b, c or d."),
                }
            }
        }
    }

    // Achievement notifications may trail the final report.
    while let Ok((_, notification)) = notes.try_recv() {
        render_notification(&notification);
    }
    Ok(())
}

async fn list_subjects(storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let subjects = storage.questions.list_subjects().await?;
    if subjects.is_empty() {
        println!("No subjects yet. Run the seed binary first.");
    }
    for subject in subjects {
        println!("{:>4}  {} {}", subject.id, subject.emoji, subject.name);
    }
    Ok(())
}

async fn show_stats(storage: Storage, user_id: UserId) -> Result<(), Box<dyn std::error::Error>> {
    let stats = StatsService::new(&storage);
    let Some(summary) = stats.summary(user_id).await? else {
        println!("No finished quizzes yet.");
        return Ok(());
    };
    render_summary(&summary);
    render_history(&stats.history(user_id).await?);
    Ok(())
}

async fn clear_mistakes(storage: Storage, user_id: UserId) -> Result<(), Box<dyn std::error::Error>> {
    let cleared = storage.mistakes.clear_for_user(user_id).await?;
    tracing::info!(user = %user_id, cleared, "mistakes cleared");
    println!("Cleared {cleared} mistake(s).");
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Play,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Play,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite here so core and services stay storage-agnostic.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Play => play(parsed, storage).await,
        Command::Subjects => list_subjects(storage).await,
        Command::Stats => show_stats(storage, parsed.user_id).await,
        Command::ClearMistakes => clear_mistakes(storage, parsed.user_id).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
