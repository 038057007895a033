//! Engine configuration: defaults, optional JSON file, environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_QUESTIONS_PER_QUIZ: &str = "QUIZ_QUESTIONS_PER_QUIZ";
pub const ENV_MOCK_QUESTIONS: &str = "QUIZ_MOCK_QUESTIONS";
pub const ENV_SPEED_QUESTIONS: &str = "QUIZ_SPEED_QUESTIONS";
pub const ENV_ANSWER_TIMEOUT_SECS: &str = "QUIZ_ANSWER_TIMEOUT_SECS";

const fn default_questions_per_quiz() -> u32 {
    10
}

const fn default_mock_questions() -> u32 {
    40
}

const fn default_speed_questions() -> u32 {
    15
}

const fn default_speed_min_pool() -> u32 {
    5
}

const fn default_mistake_review_limit() -> u32 {
    10
}

const fn default_answer_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Session sizes and timing used by the quiz engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Questions in a standard quiz.
    #[serde(default = "default_questions_per_quiz")]
    pub questions_per_quiz: u32,

    /// Questions in a mock exam (capped by the subject's pool).
    #[serde(default = "default_mock_questions")]
    pub mock_questions: u32,

    /// Questions in a speed round.
    #[serde(default = "default_speed_questions")]
    pub speed_questions: u32,

    /// Minimum cross-subject pool required to start a speed round.
    #[serde(default = "default_speed_min_pool")]
    pub speed_min_pool: u32,

    /// Most unreviewed mistakes pulled into one review session.
    #[serde(default = "default_mistake_review_limit")]
    pub mistake_review_limit: u32,

    /// Per-question answer timer.
    #[serde(default = "default_answer_timeout_secs")]
    pub answer_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            questions_per_quiz: default_questions_per_quiz(),
            mock_questions: default_mock_questions(),
            speed_questions: default_speed_questions(),
            speed_min_pool: default_speed_min_pool(),
            mistake_review_limit: default_mistake_review_limit(),
            answer_timeout_secs: default_answer_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional JSON file, then apply process environment overrides.
    ///
    /// A missing file falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is unreadable or malformed, an
    /// override does not parse, or the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Io` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file missing, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply overrides read through `lookup` (the process environment in production).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Env` if a present variable does not parse.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Env { var, value: raw })
        }

        if let Some(raw) = lookup(ENV_QUESTIONS_PER_QUIZ) {
            self.questions_per_quiz = parse(ENV_QUESTIONS_PER_QUIZ, raw)?;
        }
        if let Some(raw) = lookup(ENV_MOCK_QUESTIONS) {
            self.mock_questions = parse(ENV_MOCK_QUESTIONS, raw)?;
        }
        if let Some(raw) = lookup(ENV_SPEED_QUESTIONS) {
            self.speed_questions = parse(ENV_SPEED_QUESTIONS, raw)?;
        }
        if let Some(raw) = lookup(ENV_ANSWER_TIMEOUT_SECS) {
            self.answer_timeout_secs = parse(ENV_ANSWER_TIMEOUT_SECS, raw)?;
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when any size or the timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.questions_per_quiz == 0 {
            return Err(ConfigError::Invalid("questions_per_quiz must be greater than 0"));
        }
        if self.mock_questions == 0 {
            return Err(ConfigError::Invalid("mock_questions must be greater than 0"));
        }
        if self.speed_questions == 0 {
            return Err(ConfigError::Invalid("speed_questions must be greater than 0"));
        }
        if self.speed_min_pool == 0 {
            return Err(ConfigError::Invalid("speed_min_pool must be greater than 0"));
        }
        if self.mistake_review_limit == 0 {
            return Err(ConfigError::Invalid("mistake_review_limit must be greater than 0"));
        }
        if self.answer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("answer_timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    #[must_use]
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_quiz_sizes() {
        let config = EngineConfig::default();
        assert_eq!(config.questions_per_quiz, 10);
        assert_eq!(config.mock_questions, 40);
        assert_eq!(config.speed_questions, 15);
        assert_eq!(config.speed_min_pool, 5);
        assert_eq!(config.mistake_review_limit, 10);
        assert_eq!(config.answer_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "questions_per_quiz": 5 }"#).unwrap();
        assert_eq!(config.questions_per_quiz, 5);
        assert_eq!(config.mock_questions, 40);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_MOCK_QUESTIONS, "20"), (ENV_ANSWER_TIMEOUT_SECS, " 45 ")]);
        let config = EngineConfig::default()
            .with_env(|var| env.get(var).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.mock_questions, 20);
        assert_eq!(config.answer_timeout_secs, 45);
        assert_eq!(config.questions_per_quiz, 10);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let err = EngineConfig::default()
            .with_env(|var| (var == ENV_SPEED_QUESTIONS).then(|| "many".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_SPEED_QUESTIONS, .. }));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let config = EngineConfig {
            answer_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            EngineConfig::from_file(Path::new("/definitely/not/here/quiz.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
