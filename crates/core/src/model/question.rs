use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, SubjectId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("option {0} cannot be empty")]
    EmptyOption(AnswerOption),

    #[error("invalid answer option: {0:?}")]
    InvalidOption(String),

    #[error("invalid difficulty: {0:?}")]
    InvalidDifficulty(String),

    #[error("subject name cannot be empty")]
    EmptySubjectName,
}

//
// ─── ANSWER OPTION ─────────────────────────────────────────────────────────────
//

/// One of the four choices of a multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 4] = [Self::A, Self::B, Self::C, Self::D];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
        }
    }

    #[must_use]
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerOption {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            _ => Err(QuestionError::InvalidOption(s.to_owned())),
        }
    }
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Stored difficulty level of a question (1..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }

    /// # Errors
    ///
    /// Returns `QuestionError::InvalidDifficulty` for levels outside 1..=3.
    pub fn from_level(level: u8) -> Result<Self, QuestionError> {
        match level {
            1 => Ok(Self::Easy),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Hard),
            other => Err(QuestionError::InvalidDifficulty(other.to_string())),
        }
    }
}

/// Difficulty requested when starting a session. `All` applies no filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyFilter {
    Easy,
    Medium,
    Hard,
    #[default]
    All,
}

impl DifficultyFilter {
    #[must_use]
    pub fn matches(self, difficulty: Difficulty) -> bool {
        match self {
            Self::All => true,
            Self::Easy => difficulty == Difficulty::Easy,
            Self::Medium => difficulty == Difficulty::Medium,
            Self::Hard => difficulty == Difficulty::Hard,
        }
    }

    /// The single difficulty this filter selects, or `None` for `All`.
    #[must_use]
    pub fn difficulty(self) -> Option<Difficulty> {
        match self {
            Self::All => None,
            Self::Easy => Some(Difficulty::Easy),
            Self::Medium => Some(Difficulty::Medium),
            Self::Hard => Some(Difficulty::Hard),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::All => "all",
        }
    }
}

impl fmt::Display for DifficultyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyFilter {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "all" => Ok(Self::All),
            _ => Err(QuestionError::InvalidDifficulty(s.to_owned())),
        }
    }
}

//
// ─── SUBJECT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub emoji: String,
}

impl Subject {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptySubjectName` if the name is blank.
    pub fn new(
        id: SubjectId,
        name: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(QuestionError::EmptySubjectName);
        }
        Ok(Self {
            id,
            name,
            emoji: emoji.into(),
        })
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A four-option multiple-choice question belonging to one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    subject_id: SubjectId,
    text: String,
    options: [String; 4],
    correct: AnswerOption,
    difficulty: Difficulty,
}

impl Question {
    /// Build a question, rejecting blank text or options.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` or `QuestionError::EmptyOption`.
    pub fn new(
        id: QuestionId,
        subject_id: SubjectId,
        text: impl Into<String>,
        options: [String; 4],
        correct: AnswerOption,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        for option in AnswerOption::ALL {
            if options[option.index()].trim().is_empty() {
                return Err(QuestionError::EmptyOption(option));
            }
        }

        Ok(Self {
            id,
            subject_id,
            text,
            options,
            correct,
            difficulty,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    #[must_use]
    pub fn option_text(&self, option: AnswerOption) -> &str {
        &self.options[option.index()]
    }

    #[must_use]
    pub fn correct(&self) -> AnswerOption {
        self.correct
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn is_correct(&self, chosen: AnswerOption) -> bool {
        chosen == self.correct
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
