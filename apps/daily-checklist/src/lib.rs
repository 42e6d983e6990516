//! Daily Checklist - tasks with optional countdowns, reset every midnight.
//!
//! The engine is presentation-agnostic: a front end drives it through a
//! [`SessionHandle`] and renders [`AppSnapshot`]s.

pub mod alarm;
pub mod clock;
pub mod config;
pub mod daily;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod store;
pub mod timer;

pub use alarm::{Alarm, AlarmError};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use daily::{DailyResetScheduler, ResetOutcome};
pub use models::{AppSnapshot, AppState, Completion, Task, TaskEdit, TaskId, TimeLimit};
pub use session::{Session, SessionError, SessionHandle, SessionOptions};
pub use storage::{KeyValueStore, MemoryStore, Persistence, SqliteStore, StorageError};
pub use store::{StoreError, TaskStore};
pub use timer::{TickOutcome, TimerEngine};
