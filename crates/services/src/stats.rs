//! Per-user progress summaries built from stored quiz results.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use quiz_core::model::{QuizResult, ResultBand, Subject, SubjectId, UserId};
use quiz_storage::repository::{
    QuestionRepository, ResultRepository, Storage, StorageError, StreakRepository,
};

/// Results shown in a band history, newest first.
pub const HISTORY_LEN: usize = 15;

/// Newest results compared against the rest when computing a trend.
const TREND_WINDOW: usize = 5;

/// A drop smaller than this still counts as steady.
const DECLINE_MARGIN: f64 = 2.0;

//
// ─── SUMMARY TYPES ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectStats {
    pub subject_id: SubjectId,
    /// `None` when the subject no longer exists.
    pub subject: Option<Subject>,
    pub tests: u32,
    pub average: f64,
    pub best: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub total_tests: u32,
    pub mock_tests: u32,
    pub average: f64,
    pub band: ResultBand,
    pub best: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Ordered by subject id.
    pub subjects: Vec<SubjectStats>,
}

/// Recent average against older results, in percentage points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    Improving(f64),
    Declining(f64),
    Steady,
}

impl Trend {
    /// Compare the newest `TREND_WINDOW` percentages with the older ones.
    ///
    /// `newest_first` must be ordered newest to oldest. Returns `None` when
    /// there is nothing older to compare against.
    #[must_use]
    pub fn from_percentages(newest_first: &[f64]) -> Option<Self> {
        let split = newest_first.len().min(TREND_WINDOW);
        let (recent, older) = newest_first.split_at(split);
        if recent.is_empty() || older.is_empty() {
            return None;
        }

        let delta = mean(recent) - mean(older);
        Some(if delta > 0.0 {
            Self::Improving(delta)
        } else if delta < -DECLINE_MARGIN {
            Self::Declining(delta)
        } else {
            Self::Steady
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandHistory {
    /// At most `HISTORY_LEN` results, newest first.
    pub recent: Vec<QuizResult>,
    pub trend: Option<Trend>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Read-only statistics over results, streaks and the subject list.
#[derive(Clone)]
pub struct StatsService {
    results: Arc<dyn ResultRepository>,
    streaks: Arc<dyn StreakRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            results: Arc::clone(&storage.results),
            streaks: Arc::clone(&storage.streaks),
            questions: Arc::clone(&storage.questions),
        }
    }

    /// Overall and per-subject figures for `user_id`, or `None` before the
    /// first finished quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results, the streak or subjects cannot be read.
    pub async fn summary(&self, user_id: UserId) -> Result<Option<StatsSummary>, StorageError> {
        let results = self.results.list_results(user_id).await?;
        if results.is_empty() {
            return Ok(None);
        }

        let percentages: Vec<f64> = results.iter().map(QuizResult::percentage).collect();
        let average = mean(&percentages);
        let best = percentages.iter().copied().fold(0.0, f64::max);
        let mock_tests = count(results.iter().filter(|r| r.is_mock()).count());

        let streak = self.streaks.get_streak(user_id).await?;
        let mut names: HashMap<SubjectId, Subject> = self
            .questions
            .list_subjects()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut per_subject: BTreeMap<SubjectId, Vec<f64>> = BTreeMap::new();
        for result in &results {
            per_subject
                .entry(result.subject_id())
                .or_default()
                .push(result.percentage());
        }
        let subjects = per_subject
            .into_iter()
            .map(|(subject_id, scores)| SubjectStats {
                subject_id,
                subject: names.remove(&subject_id),
                tests: count(scores.len()),
                average: mean(&scores),
                best: scores.iter().copied().fold(0.0, f64::max),
            })
            .collect();

        tracing::debug!(user = %user_id, tests = results.len(), "stats summary built");
        Ok(Some(StatsSummary {
            total_tests: count(results.len()),
            mock_tests,
            average,
            band: ResultBand::from_percentage(average),
            best,
            current_streak: streak.current,
            longest_streak: streak.longest,
            subjects,
        }))
    }

    /// The newest results with their trend.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    pub async fn history(&self, user_id: UserId) -> Result<BandHistory, StorageError> {
        let mut results = self.results.list_results(user_id).await?;
        results.reverse();
        results.sort_by(|a, b| b.completed_at().cmp(&a.completed_at()));
        results.truncate(HISTORY_LEN);

        let percentages: Vec<f64> = results.iter().map(QuizResult::percentage).collect();
        Ok(BandHistory {
            trend: Trend::from_percentages(&percentages),
            recent: results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::{DifficultyFilter, Streak};
    use quiz_core::time::fixed_now;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    async fn record(storage: &Storage, subject: u64, score: u32, mock: bool, minutes: i64) {
        let result = QuizResult::new(
            UserId::new(1),
            SubjectId::new(subject),
            score,
            10,
            DifficultyFilter::All,
            mock,
            fixed_now() + Duration::minutes(minutes),
        )
        .unwrap();
        storage.results.append_result(&result).await.unwrap();
    }

    #[tokio::test]
    async fn summary_averages_overall_and_per_subject() {
        let storage = Storage::in_memory();
        storage
            .questions
            .upsert_subject(&Subject::new(SubjectId::new(1), "Grammar", "📘").unwrap())
            .await
            .unwrap();
        record(&storage, 1, 7, false, 0).await;
        record(&storage, 1, 9, true, 1).await;
        record(&storage, 2, 5, false, 2).await;
        storage
            .streaks
            .save_streak(
                UserId::new(1),
                &Streak {
                    current: 2,
                    longest: 4,
                    last_active: Some(fixed_now().date_naive()),
                    total_tests: 3,
                },
            )
            .await
            .unwrap();

        let summary = StatsService::new(&storage)
            .summary(UserId::new(1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.total_tests, 3);
        assert_eq!(summary.mock_tests, 1);
        assert!(close(summary.average, 70.0));
        assert_eq!(summary.band, ResultBand::Average);
        assert!(close(summary.best, 90.0));
        assert_eq!((summary.current_streak, summary.longest_streak), (2, 4));

        assert_eq!(summary.subjects.len(), 2);
        let grammar = &summary.subjects[0];
        assert_eq!(grammar.subject.as_ref().map(|s| s.name.as_str()), Some("Grammar"));
        assert_eq!(grammar.tests, 2);
        assert!(close(grammar.average, 80.0));
        assert!(close(grammar.best, 90.0));
        // Subject 2 was never stored.
        assert!(summary.subjects[1].subject.is_none());
        assert!(close(summary.subjects[1].average, 50.0));
    }

    #[tokio::test]
    async fn no_results_means_no_summary() {
        let storage = Storage::in_memory();
        let stats = StatsService::new(&storage);
        assert!(stats.summary(UserId::new(1)).await.unwrap().is_none());
        let history = stats.history(UserId::new(1)).await.unwrap();
        assert!(history.recent.is_empty());
        assert!(history.trend.is_none());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let storage = Storage::in_memory();
        for minute in 0..20 {
            record(&storage, 1, if minute >= 15 { 9 } else { 5 }, false, minute).await;
        }

        let history = StatsService::new(&storage)
            .history(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(history.recent.len(), HISTORY_LEN);
        assert_eq!(
            history.recent[0].completed_at(),
            fixed_now() + Duration::minutes(19)
        );
        // Newest five at 90% against ten older at 50%.
        match history.trend {
            Some(Trend::Improving(delta)) => assert!(close(delta, 40.0)),
            other => panic!("unexpected trend: {other:?}"),
        }
    }

    #[test]
    fn trend_needs_results_beyond_the_window() {
        assert_eq!(Trend::from_percentages(&[]), None);
        assert_eq!(Trend::from_percentages(&[80.0, 20.0, 50.0]), None);
        assert_eq!(Trend::from_percentages(&[50.0; 5]), None);
    }

    #[test]
    fn small_drops_are_steady() {
        let mut scores = vec![59.0; 5];
        scores.extend([60.0, 60.0]);
        assert_eq!(Trend::from_percentages(&scores), Some(Trend::Steady));

        let mut scores = vec![40.0; 5];
        scores.push(70.0);
        match Trend::from_percentages(&scores) {
            Some(Trend::Declining(delta)) => assert!(close(delta, -30.0)),
            other => panic!("unexpected trend: {other:?}"),
        }
    }
}
