use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Consecutive-days activity counter for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
    pub last_active: Option<NaiveDate>,
    pub total_tests: u32,
}

impl Streak {
    /// Count one finished quiz on `today`.
    ///
    /// A second activity on the same day only bumps `total_tests`. Activity on
    /// the day after `last_active` extends the streak; any larger gap restarts it.
    pub fn record_activity(&mut self, today: NaiveDate) {
        self.total_tests = self.total_tests.saturating_add(1);

        match self.last_active {
            Some(last) if last == today => return,
            Some(last) if last.succ_opt() == Some(today) => {
                self.current = self.current.saturating_add(1);
            }
            _ => self.current = 1,
        }

        self.longest = self.longest.max(self.current);
        self.last_active = Some(today);
    }
}
