//! Midnight reset of the checklist.

use crate::clock::Clock;
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

/// Result of a day-boundary check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Less than a day since the last reset.
    NotDue,
    /// Tasks were reset and the day marker moved to `day_start`.
    Reset {
        day_start: DateTime<Utc>,
        tasks_reset: usize,
    },
}

/// Polls for the day boundary and resets completion once per day.
#[derive(Debug, Clone)]
pub struct DailyResetScheduler {
    poll_interval: Duration,
    resets: u64,
}

impl DailyResetScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_secs(1)),
            resets: 0,
        }
    }

    /// Upper bound on how late after midnight a reset can happen.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Number of resets performed by this scheduler.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Whether a full day has passed since `last_day_start`.
    pub fn is_due(last_day_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_day_start) >= chrono::Duration::days(1)
    }

    /// Reset the store if the day boundary has been crossed.
    ///
    /// Level-triggered: once the marker has advanced, further calls on the
    /// same day are no-ops.
    pub fn check(&mut self, store: &mut TaskStore, clock: &dyn Clock) -> ResetOutcome {
        let now = clock.now();
        let last = store.last_day_start();
        if !Self::is_due(last, now) {
            debug!(%last, %now, "day boundary not reached");
            return ResetOutcome::NotDue;
        }

        let day_start = clock.start_of_day(now);
        let tasks_reset = store.reset_day(day_start);
        self.resets += 1;
        info!(%day_start, tasks_reset, "new day, checklist reset");

        ResetOutcome::Reset {
            day_start,
            tasks_reset,
        }
    }
}

impl Default for DailyResetScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Completion;
    use crate::storage::{MemoryStore, Persistence};
    use chrono::{Duration as ChronoDuration, FixedOffset, TimeZone};

    fn yesterday_midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn completed_store(clock: &ManualClock, count: usize) -> TaskStore {
        let mut store = TaskStore::open(Persistence::new(MemoryStore::new()), clock);
        for i in 0..count {
            let id = store.add(format!("task {i}"));
            store.toggle(id, clock.now()).unwrap();
        }
        store
    }

    #[test]
    fn test_reset_after_midnight() {
        let clock = ManualClock::new(yesterday_midnight() + ChronoDuration::hours(9));
        let mut store = completed_store(&clock, 3);
        assert_eq!(store.last_day_start(), yesterday_midnight());

        clock.set(Utc.with_ymd_and_hms(2024, 6, 2, 0, 5, 0).unwrap());
        let mut daily = DailyResetScheduler::default();
        let today = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();

        assert_eq!(
            daily.check(&mut store, &clock),
            ResetOutcome::Reset {
                day_start: today,
                tasks_reset: 3
            }
        );
        assert!(store
            .tasks()
            .iter()
            .all(|t| t.completion == Completion::Pending));
        assert_eq!(store.last_day_start(), today);
    }

    #[test]
    fn test_check_is_idempotent_within_day() {
        let clock = ManualClock::new(yesterday_midnight() + ChronoDuration::hours(20));
        let mut store = completed_store(&clock, 2);
        clock.set(Utc.with_ymd_and_hms(2024, 6, 2, 7, 0, 0).unwrap());
        let mut daily = DailyResetScheduler::default();

        assert!(matches!(
            daily.check(&mut store, &clock),
            ResetOutcome::Reset { .. }
        ));

        let id = store.id_at(0).unwrap();
        store.toggle(id, clock.now()).unwrap();
        assert_eq!(daily.check(&mut store, &clock), ResetOutcome::NotDue);
        assert_eq!(store.get(id).unwrap().completion, Completion::Completed);
        assert_eq!(daily.resets(), 1);
    }

    #[test]
    fn test_not_due_before_midnight() {
        let clock = ManualClock::new(yesterday_midnight() + ChronoDuration::hours(1));
        let mut store = completed_store(&clock, 1);
        clock.set(yesterday_midnight() + ChronoDuration::hours(23) + ChronoDuration::minutes(59));

        let mut daily = DailyResetScheduler::default();
        assert_eq!(daily.check(&mut store, &clock), ResetOutcome::NotDue);
        assert_eq!(store.tasks()[0].completion, Completion::Completed);
    }

    #[test]
    fn test_reopen_after_several_days_snaps_to_today() {
        let clock = ManualClock::new(yesterday_midnight() + ChronoDuration::hours(9));
        let mut store = completed_store(&clock, 1);
        clock.set(Utc.with_ymd_and_hms(2024, 6, 5, 18, 30, 0).unwrap());

        let mut daily = DailyResetScheduler::default();
        daily.check(&mut store, &clock);
        assert_eq!(
            store.last_day_start(),
            Utc.with_ymd_and_hms(2024, 6, 5, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_local_offset_defines_the_day() {
        // UTC+10: local midnight of June 2nd is 14:00 UTC on June 1st.
        let offset = FixedOffset::east_opt(10 * 3600).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let clock = ManualClock::with_offset(start, offset);
        let mut store = completed_store(&clock, 1);
        assert_eq!(
            store.last_day_start(),
            Utc.with_ymd_and_hms(2024, 5, 31, 14, 0, 0).unwrap()
        );

        clock.set(Utc.with_ymd_and_hms(2024, 6, 1, 14, 10, 0).unwrap());
        let mut daily = DailyResetScheduler::default();
        assert!(matches!(
            daily.check(&mut store, &clock),
            ResetOutcome::Reset { .. }
        ));
        assert_eq!(
            store.last_day_start(),
            Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_poll_interval_has_floor() {
        assert_eq!(
            DailyResetScheduler::new(Duration::ZERO).poll_interval(),
            Duration::from_secs(1)
        );
    }
}
