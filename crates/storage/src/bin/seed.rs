use std::fmt;
use std::path::PathBuf;

use quiz_core::model::{AnswerOption, Difficulty, Question, QuestionId, Subject, SubjectId};
use quiz_storage::repository::Storage;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    file: Option<PathBuf>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:quiz.sqlite3?mode=rwc".into());
        let mut file = std::env::var("QUIZ_SEED_FILE").ok().map(PathBuf::from);

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--file" => {
                    file = Some(PathBuf::from(require_value(&mut args, "--file")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, file })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p quiz-storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3?mode=rwc)");
    eprintln!("  --file <path>             JSON question bank (default: built-in demo set)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_SEED_FILE");
}

//
// ─── SEED FILE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct SeedFile {
    subjects: Vec<SeedSubject>,
    questions: Vec<SeedQuestion>,
}

#[derive(Debug, Deserialize)]
struct SeedSubject {
    id: u64,
    name: String,
    #[serde(default = "default_emoji")]
    emoji: String,
}

#[derive(Debug, Deserialize)]
struct SeedQuestion {
    id: u64,
    subject_id: u64,
    text: String,
    options: [String; 4],
    correct: String,
    #[serde(default = "default_difficulty")]
    difficulty: u8,
}

fn default_emoji() -> String {
    "📚".to_owned()
}

fn default_difficulty() -> u8 {
    1
}

fn demo_bank() -> SeedFile {
    let q = |id: u64, subject_id: u64, text: &str, options: [&str; 4], correct: &str, difficulty| {
        SeedQuestion {
            id,
            subject_id,
            text: text.to_owned(),
            options: options.map(str::to_owned),
            correct: correct.to_owned(),
            difficulty,
        }
    };

    SeedFile {
        subjects: vec![
            SeedSubject {
                id: 1,
                name: "Grammar".into(),
                emoji: "📘".into(),
            },
            SeedSubject {
                id: 2,
                name: "Vocabulary".into(),
                emoji: "📗".into(),
            },
        ],
        questions: vec![
            q(1, 1, "She ___ to work every day.", ["go", "goes", "going", "gone"], "b", 1),
            q(2, 1, "I have lived here ___ 2015.", ["for", "since", "during", "from"], "b", 1),
            q(3, 1, "If I ___ rich, I would travel.", ["am", "was", "were", "be"], "c", 2),
            q(4, 1, "The report ___ by Friday.", ["must finish", "must be finished", "must finished", "finishing"], "b", 2),
            q(5, 1, "Hardly ___ when the phone rang.", ["I had sat", "had I sat", "I sat", "sat I"], "b", 3),
            q(6, 1, "He denied ___ the window.", ["to break", "break", "breaking", "broke"], "c", 2),
            q(7, 2, "Opposite of 'scarce'?", ["rare", "plentiful", "tiny", "costly"], "b", 1),
            q(8, 2, "'Meticulous' means…", ["careless", "very careful", "quick", "loud"], "b", 2),
            q(9, 2, "'Ubiquitous' means…", ["everywhere", "unique", "hidden", "ancient"], "a", 3),
            q(10, 2, "Synonym of 'brief'?", ["long", "short", "slow", "bright"], "b", 1),
            q(11, 2, "'Mitigate' means…", ["worsen", "ignore", "lessen", "measure"], "c", 3),
            q(12, 2, "'Candid' means…", ["frank", "sweet", "hidden", "angry"], "a", 2),
        ],
    }
}

fn build(bank: SeedFile) -> Result<(Vec<Subject>, Vec<Question>), Box<dyn std::error::Error>> {
    let subjects = bank
        .subjects
        .into_iter()
        .map(|s| Subject::new(SubjectId::new(s.id), s.name, s.emoji))
        .collect::<Result<Vec<_>, _>>()?;

    let mut questions = Vec::with_capacity(bank.questions.len());
    for raw in bank.questions {
        questions.push(Question::new(
            QuestionId::new(raw.id),
            SubjectId::new(raw.subject_id),
            raw.text,
            raw.options,
            raw.correct.parse::<AnswerOption>()?,
            Difficulty::from_level(raw.difficulty)?,
        )?);
    }
    Ok((subjects, questions))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let bank = match &args.file {
        Some(path) => serde_json::from_str::<SeedFile>(&std::fs::read_to_string(path)?)?,
        None => demo_bank(),
    };
    let (subjects, questions) = build(bank)?;

    let storage = Storage::sqlite(&args.db_url).await?;
    for subject in &subjects {
        storage.questions.upsert_subject(subject).await?;
    }
    for question in &questions {
        storage.questions.upsert_question(question).await?;
    }

    tracing::info!(
        subjects = subjects.len(),
        questions = questions.len(),
        db = %args.db_url,
        "seeded question bank"
    );
    println!(
        "Seeded {} subjects and {} questions into {}",
        subjects.len(),
        questions.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
