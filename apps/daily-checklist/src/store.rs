//! Ordered task list with write-through persistence.

use crate::clock::Clock;
use crate::models::{AppSnapshot, AppState, Completion, Task, TaskEdit, TaskId};
use crate::storage::{Persistence, LAST_DAY_START_KEY, TASKS_KEY};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Task store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),
    #[error("Task index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Owns the checklist state. Every mutation is saved before it returns.
pub struct TaskStore {
    persistence: Persistence,
    state: AppState,
    write_failures: u64,
}

impl TaskStore {
    /// Load state from storage, defaulting to an empty list reset today.
    pub fn open(mut persistence: Persistence, clock: &dyn Clock) -> Self {
        let now = clock.now();
        let today = clock.start_of_day(now);

        let mut tasks: Vec<Task> = persistence.load(TASKS_KEY, Vec::new());
        let stored_day: i64 = persistence.load(LAST_DAY_START_KEY, today.timestamp_millis());
        let last_day_start = DateTime::from_timestamp_millis(stored_day).unwrap_or_else(|| {
            warn!(stored_day, "stored day start out of range, using today");
            today
        });

        let mut repaired = 0;
        for task in &mut tasks {
            if task.normalize(now) {
                repaired += 1;
            }
        }
        if repaired > 0 {
            warn!(repaired, "repaired tasks with inconsistent completion state");
        }

        let mut store = Self {
            persistence,
            state: AppState {
                tasks,
                last_day_start,
            },
            write_failures: 0,
        };
        // Pins ids assigned to tasks stored without one.
        store.persist_tasks();

        info!(
            tasks = store.state.tasks.len(),
            last_day_start = %store.state.last_day_start,
            "checklist loaded"
        );
        store
    }

    /// Tasks in display order.
    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn len(&self) -> usize {
        self.state.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.tasks.is_empty()
    }

    pub fn last_day_start(&self) -> DateTime<Utc> {
        self.state.last_day_start
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let mut snapshot = AppSnapshot::from_state(&self.state);
        snapshot.write_failures = self.write_failures;
        snapshot
    }

    /// Number of saves that failed since the store was opened.
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.state.tasks.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.state.tasks.iter().position(|t| t.id == id)
    }

    /// Resolve a display position to a task id.
    pub fn id_at(&self, index: usize) -> StoreResult<TaskId> {
        self.state
            .tasks
            .get(index)
            .map(|t| t.id)
            .ok_or(StoreError::IndexOutOfRange {
                index,
                len: self.state.tasks.len(),
            })
    }

    fn task_mut(&mut self, id: TaskId) -> StoreResult<&mut Task> {
        self.state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Append a pending task without a time limit.
    pub fn add(&mut self, title: impl Into<String>) -> TaskId {
        let task = Task::new(title);
        let id = task.id;
        debug!(task = %id, title = %task.title, "task added");
        self.state.tasks.push(task);
        self.persist_tasks();
        id
    }

    /// Remove a task, keeping the order of the rest.
    pub fn remove(&mut self, id: TaskId) -> StoreResult<Task> {
        let index = self.position(id).ok_or(StoreError::NotFound(id))?;
        let task = self.state.tasks.remove(index);
        debug!(task = %id, index, "task removed");
        self.persist_tasks();
        Ok(task)
    }

    /// Replace title, time limit and completion of a task.
    pub fn update(&mut self, id: TaskId, edit: TaskEdit, now: DateTime<Utc>) -> StoreResult<()> {
        self.task_mut(id)?.apply(edit, now);
        debug!(task = %id, "task updated");
        self.persist_tasks();
        Ok(())
    }

    pub fn rename(&mut self, id: TaskId, title: impl Into<String>) -> StoreResult<()> {
        self.task_mut(id)?.title = title.into();
        self.persist_tasks();
        Ok(())
    }

    /// Change the time limit of a task, leaving its countdown start alone.
    pub fn set_time_limit(
        &mut self,
        id: TaskId,
        active: bool,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let task = self.task_mut(id)?;
        task.time_limit.active = active;
        task.time_limit.minutes = minutes;
        task.normalize(now);
        self.persist_tasks();
        Ok(())
    }

    /// Advance a task's completion.
    ///
    /// Untimed tasks flip between pending and completed. Timed tasks cycle
    /// pending, in progress, completed; every toggle of a timed task stamps
    /// the countdown start with `now`.
    pub fn toggle(&mut self, id: TaskId, now: DateTime<Utc>) -> StoreResult<Completion> {
        let task = self.task_mut(id)?;
        let next = if task.time_limit.active {
            task.time_limit.start_time = Some(now);
            match task.completion {
                Completion::Pending => Completion::InProgress,
                Completion::InProgress => Completion::Completed,
                Completion::Completed => Completion::Pending,
            }
        } else {
            match task.completion {
                Completion::Completed => Completion::Pending,
                Completion::Pending | Completion::InProgress => Completion::Completed,
            }
        };
        let from = task.completion;
        task.completion = next;

        debug!(task = %id, from = from.label(), to = next.label(), "task toggled");
        self.persist_tasks();
        Ok(next)
    }

    /// Start a new day: mark every task pending and move the day marker.
    ///
    /// Time-limit fields are left as they are. Returns how many tasks changed.
    pub fn reset_day(&mut self, day_start: DateTime<Utc>) -> usize {
        self.state.last_day_start = day_start;
        let mut changed = 0;
        for task in &mut self.state.tasks {
            if task.completion != Completion::Pending {
                task.completion = Completion::Pending;
                changed += 1;
            }
        }

        self.persist_day();
        self.persist_tasks();
        changed
    }

    fn persist_tasks(&mut self) {
        if let Err(e) = self.persistence.save(TASKS_KEY, &self.state.tasks) {
            self.write_failures += 1;
            warn!(error = %e, "failed to save tasks, keeping in-memory state");
        }
    }

    fn persist_day(&mut self) {
        let millis = self.state.last_day_start.timestamp_millis();
        if let Err(e) = self.persistence.save(LAST_DAY_START_KEY, &millis) {
            self.write_failures += 1;
            warn!(error = %e, "failed to save day marker, keeping in-memory state");
        }
    }
}
