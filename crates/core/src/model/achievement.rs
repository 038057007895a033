use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Badges a user can earn by finishing quizzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    FirstTest,
    TenTests,
    FiftyTests,
    HundredTests,
    PerfectScore,
    Band7,
    Streak3,
    Streak7,
    Streak30,
    AllSections,
    MistakeFixer,
    MockMaster,
}

impl Achievement {
    pub const ALL: [Achievement; 12] = [
        Self::FirstTest,
        Self::TenTests,
        Self::FiftyTests,
        Self::HundredTests,
        Self::PerfectScore,
        Self::Band7,
        Self::Streak3,
        Self::Streak7,
        Self::Streak30,
        Self::AllSections,
        Self::MistakeFixer,
        Self::MockMaster,
    ];

    /// Stable storage key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::FirstTest => "first_test",
            Self::TenTests => "ten_tests",
            Self::FiftyTests => "fifty_tests",
            Self::HundredTests => "hundred_tests",
            Self::PerfectScore => "perfect_score",
            Self::Band7 => "band_7",
            Self::Streak3 => "streak_3",
            Self::Streak7 => "streak_7",
            Self::Streak30 => "streak_30",
            Self::AllSections => "all_sections",
            Self::MistakeFixer => "mistake_fixer",
            Self::MockMaster => "mock_master",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::FirstTest => "First step",
            Self::TenTests => "Active learner",
            Self::FiftyTests => "Warrior",
            Self::HundredTests => "Master",
            Self::PerfectScore => "Perfect!",
            Self::Band7 => "Band 7+",
            Self::Streak3 => "3 days in a row",
            Self::Streak7 => "Weekly streak",
            Self::Streak30 => "Monthly streak",
            Self::AllSections => "Universal",
            Self::MistakeFixer => "Learns from mistakes",
            Self::MockMaster => "Mock test master",
        }
    }

    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            Self::FirstTest => "🎯",
            Self::TenTests => "📚",
            Self::FiftyTests => "⚔️",
            Self::HundredTests => "👑",
            Self::PerfectScore => "💯",
            Self::Band7 => "🥇",
            Self::Streak3 => "🔥",
            Self::Streak7 => "🌟",
            Self::Streak30 => "💎",
            Self::AllSections => "🌍",
            Self::MistakeFixer => "🔧",
            Self::MockMaster => "🏆",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::FirstTest => "Finish your first test",
            Self::TenTests => "Finish 10 tests",
            Self::FiftyTests => "Finish 50 tests",
            Self::HundredTests => "Finish 100 tests",
            Self::PerfectScore => "Score 100% on a test",
            Self::Band7 => "Score 75% or more on a test",
            Self::Streak3 => "Take tests 3 days in a row",
            Self::Streak7 => "Take tests 7 days in a row",
            Self::Streak30 => "Take tests 30 days in a row",
            Self::AllSections => "Take a test in every subject",
            Self::MistakeFixer => "Correct 10 mistakes",
            Self::MockMaster => "Score 70% or more on a mock test",
        }
    }
}

impl FromStr for Achievement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.key() == s)
            .ok_or_else(|| format!("unknown achievement key: {s}"))
    }
}

/// An achievement granted to a user at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardedAchievement {
    pub achievement: Achievement,
    pub awarded_at: DateTime<Utc>,
}
