#![forbid(unsafe_code)]

pub mod achievements;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod notifier;
pub mod review_service;
pub mod runtime;
pub mod selector;
pub mod session;
pub mod stats;
pub mod streak;
pub mod timeout;

pub use quiz_core::Clock;

pub use achievements::{AchievementEvaluator, RuleBasedAchievements};
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    AnswerFeedback, AnswerOutcome, EngineReply, ExpiryOutcome, QuestionPrompt, QuizEngine,
    SessionReport, SpeedRating, StartOutcome,
};
pub use error::{ReviewServiceError, SessionError};
pub use event::{AnswerRequest, EventReceiver, EventSender, QuizEvent, StartRequest, event_channel};
pub use notifier::{ChannelNotifier, LogNotifier, Notification, Notifier, NotifyError};
pub use review_service::{DueSet, ReviewService};
pub use runtime::{DEFAULT_WORKER_IDLE, LiveWorkers, OutputReceiver, QuizRuntime, RuntimeOutput};
pub use selector::QuestionSelector;
pub use session::{InMemorySessionStore, Session, SessionKind, SessionStore, SlotLease};
pub use stats::{BandHistory, HISTORY_LEN, StatsService, StatsSummary, SubjectStats, Trend};
pub use streak::{StoredStreakTracker, StreakTracker};
pub use timeout::TimeoutManager;
