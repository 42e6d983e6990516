//! Per-task countdowns.

use crate::alarm::Alarm;
use crate::models::{Completion, TaskId, TimeLimit};
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between countdown re-evaluations.
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

const MINUTE_MS: i64 = 60_000;

/// Minutes left on a running countdown.
///
/// `minutes - floor((now - start) / 1min)`; `None` when the limit has not
/// been started.
pub fn remaining_minutes(limit: &TimeLimit, now: DateTime<Utc>) -> Option<i64> {
    let start = limit.start_time?;
    let elapsed_ms = now.signed_duration_since(start).num_milliseconds();
    Some(i64::from(limit.minutes) - elapsed_ms.div_euclid(MINUTE_MS))
}

/// Delay until the countdown crosses its next whole minute.
fn until_next_minute(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let elapsed_ms = now.signed_duration_since(start).num_milliseconds();
    let into_minute = elapsed_ms.rem_euclid(MINUTE_MS);
    Duration::from_millis((MINUTE_MS - into_minute) as u64)
}

/// The values a countdown was armed with. A change re-arms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    completion: Completion,
    minutes: u32,
    start_time: Option<DateTime<Utc>>,
}

/// Scheduling decision produced by [`TimerEngine::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerChange {
    /// Start ticking: first tick after `first_in`, then every [`TICK_PERIOD`].
    Arm { id: TaskId, first_in: Duration },
    /// Stop ticking.
    Disarm(TaskId),
}

/// Result of a single countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Task is gone or not counting down.
    Idle,
    /// Countdown still running.
    Running { remaining: i64 },
    /// Time ran out and the task was completed.
    Expired { alarm_played: bool },
}

/// Tracks which countdowns should run and what they display.
#[derive(Debug, Default)]
pub struct TimerEngine {
    follow_all: bool,
    observed: HashSet<TaskId>,
    armed: HashMap<TaskId, Fingerprint>,
    displayed: HashMap<TaskId, i64>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that counts down every task, observed or not.
    pub fn follow_all() -> Self {
        Self {
            follow_all: true,
            ..Self::default()
        }
    }

    /// Start watching a task (e.g. its row or edit view was opened).
    pub fn observe(&mut self, id: TaskId) {
        self.observed.insert(id);
    }

    /// Stop watching a task.
    pub fn unobserve(&mut self, id: TaskId) {
        self.observed.remove(&id);
    }

    pub fn is_observed(&self, id: TaskId) -> bool {
        self.follow_all || self.observed.contains(&id)
    }

    pub fn is_armed(&self, id: TaskId) -> bool {
        self.armed.contains_key(&id)
    }

    /// Countdown currently shown for a task.
    pub fn displayed(&self, id: TaskId) -> Option<i64> {
        self.displayed.get(&id).copied()
    }

    pub fn countdowns(&self) -> &HashMap<TaskId, i64> {
        &self.displayed
    }

    /// Reconcile armed countdowns with the store.
    ///
    /// A countdown is armed for every observed task that is counting down.
    /// It is re-armed when its completion, length or start changes, and
    /// disarmed once the task is unobserved, removed or no longer running.
    pub fn sync(&mut self, store: &TaskStore, now: DateTime<Utc>) -> Vec<TimerChange> {
        let mut changes = Vec::new();
        let mut wanted = HashSet::new();
        self.displayed.clear();
        self.observed.retain(|id| store.get(*id).is_some());

        for task in store.tasks() {
            if !self.is_observed(task.id) {
                continue;
            }
            if !task.time_limit.active {
                continue;
            }

            let Some(remaining) = task
                .is_counting_down()
                .then(|| remaining_minutes(&task.time_limit, now))
                .flatten()
            else {
                self.displayed
                    .insert(task.id, i64::from(task.time_limit.minutes));
                continue;
            };

            self.displayed.insert(task.id, remaining.max(0));
            wanted.insert(task.id);

            let fingerprint = Fingerprint {
                completion: task.completion,
                minutes: task.time_limit.minutes,
                start_time: task.time_limit.start_time,
            };
            if self.armed.get(&task.id) == Some(&fingerprint) {
                continue;
            }

            let first_in = match (remaining > 0, task.time_limit.start_time) {
                (true, Some(start)) => until_next_minute(start, now),
                _ => Duration::ZERO,
            };
            debug!(task = %task.id, remaining, ?first_in, "countdown armed");
            self.armed.insert(task.id, fingerprint);
            changes.push(TimerChange::Arm {
                id: task.id,
                first_in,
            });
        }

        let stale: Vec<TaskId> = self
            .armed
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for id in stale {
            debug!(task = %id, "countdown disarmed");
            self.armed.remove(&id);
            changes.push(TimerChange::Disarm(id));
        }

        changes
    }

    /// Re-evaluate one countdown.
    ///
    /// Unobserved tasks are left alone, since a wakeup may still be queued
    /// after the task was closed. On expiry the alarm is played (failures are logged and ignored), the
    /// task is toggled to completed and the display resets to the full limit.
    pub fn tick(
        &mut self,
        id: TaskId,
        store: &mut TaskStore,
        alarm: &dyn Alarm,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if !self.is_observed(id) {
            return TickOutcome::Idle;
        }
        let Some(task) = store.get(id) else {
            return TickOutcome::Idle;
        };
        if !task.is_counting_down() {
            return TickOutcome::Idle;
        }
        let Some(remaining) = remaining_minutes(&task.time_limit, now) else {
            return TickOutcome::Idle;
        };

        if remaining > 0 {
            self.displayed.insert(id, remaining);
            return TickOutcome::Running { remaining };
        }

        let minutes = task.time_limit.minutes;
        info!(task = %id, title = %task.title, minutes, "time limit reached");

        let alarm_played = match alarm.play() {
            Ok(()) => true,
            Err(e) => {
                warn!(task = %id, error = %e, "alarm failed");
                false
            }
        };

        if let Err(e) = store.toggle(id, now) {
            warn!(task = %id, error = %e, "cannot complete expired task");
        }
        self.displayed.insert(id, i64::from(minutes));

        TickOutcome::Expired { alarm_played }
    }
}
