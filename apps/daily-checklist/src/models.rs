//! Data models for the daily checklist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::store::{StoreError, StoreResult};

/// Unique task identifier, stable across reorders and removals.
pub type TaskId = Uuid;

/// Tri-state completion of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Not started.
    #[default]
    Pending,
    /// Countdown running. Only reachable with an active time limit.
    InProgress,
    /// Done for today.
    Completed,
}

impl Completion {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

// Older checklists stored `done` as `false | true | "indeterminate"`.
impl<'de> Deserialize<'de> for Completion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(false) => Ok(Self::Pending),
            Repr::Flag(true) => Ok(Self::Completed),
            Repr::Name(name) => match name.as_str() {
                "pending" => Ok(Self::Pending),
                "in_progress" | "indeterminate" => Ok(Self::InProgress),
                "completed" => Ok(Self::Completed),
                other => Err(serde::de::Error::unknown_variant(
                    other,
                    &["pending", "in_progress", "completed"],
                )),
            },
        }
    }
}

/// Optional countdown attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimit {
    /// Whether the countdown is armed for this task.
    #[serde(default)]
    pub active: bool,
    /// Countdown length in minutes.
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub minutes: u32,
    /// When the task last entered the in-progress state.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
}

impl TimeLimit {
    /// Active limit of the given length that has not started yet.
    pub fn minutes(minutes: u32) -> Self {
        Self {
            active: true,
            minutes,
            start_time: None,
        }
    }

    pub fn increment_minutes(&mut self, by: u32) {
        self.minutes = self.minutes.saturating_add(by);
    }

    /// Shorten the limit, clamping at zero.
    pub fn decrement_minutes(&mut self, by: u32) {
        self.minutes = self.minutes.saturating_sub(by);
    }
}

fn deserialize_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_finite() && raw > 0.0 {
        Ok(raw.floor().min(f64::from(u32::MAX)) as u32)
    } else {
        Ok(0)
    }
}

/// A checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier.
    #[serde(default = "Uuid::new_v4")]
    pub id: TaskId,
    /// Task title.
    pub title: String,
    /// Completion state.
    #[serde(default, alias = "done")]
    pub completion: Completion,
    /// Countdown settings.
    #[serde(default)]
    pub time_limit: TimeLimit,
}

impl Task {
    /// Create a pending task without a time limit.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            completion: Completion::Pending,
            time_limit: TimeLimit::default(),
        }
    }

    /// Create a pending task with an active time limit.
    pub fn with_time_limit(title: impl Into<String>, minutes: u32) -> Self {
        Self {
            time_limit: TimeLimit::minutes(minutes),
            ..Self::new(title)
        }
    }

    /// Whether the countdown for this task is currently running.
    pub fn is_counting_down(&self) -> bool {
        self.completion == Completion::InProgress
            && self.time_limit.active
            && self.time_limit.start_time.is_some()
    }

    /// Replace the editable fields wholesale.
    ///
    /// Entering the in-progress state starts the countdown at `now`.
    pub fn apply(&mut self, edit: TaskEdit, now: DateTime<Utc>) {
        let started = self.completion != Completion::InProgress
            && edit.completion == Completion::InProgress;
        self.title = edit.title;
        self.time_limit = edit.time_limit;
        self.completion = edit.completion;
        if started && self.time_limit.active {
            self.time_limit.start_time = Some(now);
        }
        self.normalize(now);
    }

    /// Restore the completion/time-limit invariants. Returns true if anything changed.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        if self.completion != Completion::InProgress {
            return false;
        }
        if !self.time_limit.active {
            self.completion = Completion::Pending;
            return true;
        }
        if self.time_limit.start_time.is_none() {
            self.time_limit.start_time = Some(now);
            return true;
        }
        false
    }
}

/// Edit-form payload for [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: String,
    pub time_limit: TimeLimit,
    pub completion: Completion,
}

impl From<&Task> for TaskEdit {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            time_limit: task.time_limit,
            completion: task.completion,
        }
    }
}

/// Everything the checklist persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    /// Tasks in display order.
    pub tasks: Vec<Task>,
    /// Local midnight of the day the tasks were last reset.
    pub last_day_start: DateTime<Utc>,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSnapshot {
    pub tasks: Vec<Task>,
    pub last_day_start: DateTime<Utc>,
    /// Minutes shown on the countdown of each observed timed task.
    pub countdowns: HashMap<TaskId, i64>,
    /// Saves that failed since the store was opened. Non-zero means the
    /// on-disk copy is behind what is shown.
    pub write_failures: u64,
}

impl AppSnapshot {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            tasks: state.tasks.clone(),
            last_day_start: state.last_day_start,
            countdowns: HashMap::new(),
            write_failures: 0,
        }
    }

    /// Resolve a display position to a task id.
    pub fn id_at(&self, index: usize) -> StoreResult<TaskId> {
        self.tasks
            .get(index)
            .map(|t| t.id)
            .ok_or(StoreError::IndexOutOfRange {
                index,
                len: self.tasks.len(),
            })
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.completion.is_completed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("Buy milk");
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.completion, Completion::Pending);
        assert_eq!(task.time_limit, TimeLimit::default());
        assert!(!task.time_limit.active);
        assert_eq!(task.time_limit.minutes, 0);
        assert!(task.time_limit.start_time.is_none());
    }

    #[test]
    fn test_decrement_clamps_at_zero() {
        let mut limit = TimeLimit::minutes(2);
        limit.decrement_minutes(5);
        assert_eq!(limit.minutes, 0);
        limit.increment_minutes(3);
        assert_eq!(limit.minutes, 3);
    }

    #[test]
    fn test_task_json_shape() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = Task::with_time_limit("Stretch", 5);
        task.completion = Completion::InProgress;
        task.time_limit.start_time = Some(start);

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["completion"], "in_progress");
        assert_eq!(value["timeLimit"]["active"], true);
        assert_eq!(value["timeLimit"]["minutes"], 5);
        assert_eq!(value["timeLimit"]["startTime"], start.timestamp_millis());

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_legacy_done_field() {
        let json = r#"[
            {"title": "a", "timeLimit": {"active": false, "minutes": 0}, "done": false},
            {"title": "b", "timeLimit": {"active": false, "minutes": 0}, "done": true},
            {"title": "c", "timeLimit": {"active": true, "minutes": 10, "startTime": 1700000000000}, "done": "indeterminate"}
        ]"#;
        let tasks: Vec<Task> = serde_json::from_str(json).unwrap();

        assert_eq!(tasks[0].completion, Completion::Pending);
        assert_eq!(tasks[1].completion, Completion::Completed);
        assert_eq!(tasks[2].completion, Completion::InProgress);
        assert_eq!(
            tasks[2].time_limit.start_time.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_ne!(tasks[0].id, tasks[1].id);
    }

    #[test]
    fn test_negative_minutes_clamp_on_load() {
        let task: Task =
            serde_json::from_str(r#"{"title": "x", "timeLimit": {"active": true, "minutes": -4}}"#)
                .unwrap();
        assert_eq!(task.time_limit.minutes, 0);
    }

    #[test]
    fn test_unknown_completion_rejected() {
        let result: Result<Task, _> =
            serde_json::from_str(r#"{"title": "x", "completion": "maybe"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_edit_keeps_invariants() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut task = Task::new("Read");

        task.apply(
            TaskEdit {
                title: "Read a chapter".into(),
                time_limit: TimeLimit::default(),
                completion: Completion::InProgress,
            },
            now,
        );
        assert_eq!(task.title, "Read a chapter");
        assert_eq!(task.completion, Completion::Pending);

        task.apply(
            TaskEdit {
                title: "Read a chapter".into(),
                time_limit: TimeLimit::minutes(20),
                completion: Completion::InProgress,
            },
            now,
        );
        assert_eq!(task.completion, Completion::InProgress);
        assert_eq!(task.time_limit.start_time, Some(now));
        assert!(task.is_counting_down());
    }

    #[test]
    fn test_snapshot_id_at() {
        let state = AppState {
            tasks: vec![Task::new("a"), Task::new("b")],
            last_day_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let snapshot = AppSnapshot::from_state(&state);

        assert_eq!(snapshot.id_at(1).unwrap(), state.tasks[1].id);
        assert_eq!(
            snapshot.id_at(2),
            Err(StoreError::IndexOutOfRange { index: 2, len: 2 })
        );
    }
}
