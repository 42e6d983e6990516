//! Single-owner event loop driving the checklist engine.
//!
//! The session task owns the [`TaskStore`] and is its only mutator. User
//! commands arrive through a [`SessionHandle`], countdown and day-boundary
//! wakeups through the [`TickScheduler`]. After every event timers are
//! re-synced and a fresh [`AppSnapshot`] is published.

use crate::alarm::Alarm;
use crate::clock::Clock;
use crate::config::Config;
use crate::daily::{DailyResetScheduler, ResetOutcome};
use crate::models::{AppSnapshot, Completion, Task, TaskEdit, TaskId};
use crate::scheduler::{TickScheduler, WakeKey};
use crate::store::{StoreError, StoreResult, TaskStore};
use crate::timer::{TickOutcome, TimerChange, TimerEngine, TICK_PERIOD};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;

/// Session errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session closed")]
    Closed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// How often the day boundary is checked.
    pub reset_poll: Duration,
    /// Count down every task instead of only observed ones.
    pub follow_all: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reset_poll: Duration::from_secs(10),
            follow_all: false,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            reset_poll: config.reset.poll_interval(),
            follow_all: config.timer.follow_all,
        }
    }
}

enum Command {
    Add {
        title: String,
        reply: oneshot::Sender<TaskId>,
    },
    Remove {
        id: TaskId,
        reply: oneshot::Sender<StoreResult<Task>>,
    },
    Update {
        id: TaskId,
        edit: TaskEdit,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Toggle {
        id: TaskId,
        reply: oneshot::Sender<StoreResult<Completion>>,
    },
    Open(TaskId),
    Close(TaskId),
    Shutdown,
}

/// The checklist engine before it is started.
pub struct Session {
    store: TaskStore,
    timers: TimerEngine,
    daily: DailyResetScheduler,
    alarm: Box<dyn Alarm>,
    clock: Arc<dyn Clock>,
}

impl Session {
    /// Assemble the engine. Alarm initialization failures are logged and
    /// otherwise ignored.
    pub fn new(
        store: TaskStore,
        mut alarm: Box<dyn Alarm>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        if let Err(e) = alarm.initialize() {
            warn!(error = %e, "alarm unavailable, countdowns will complete silently");
        }

        let timers = if options.follow_all {
            TimerEngine::follow_all()
        } else {
            TimerEngine::new()
        };

        Self {
            store,
            timers,
            daily: DailyResetScheduler::new(options.reset_poll),
            alarm,
            clock,
        }
    }

    /// Start the event loop on the current runtime.
    ///
    /// The join handle yields the store back once the session shuts down.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<TaskStore>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.snapshot());
        let join = tokio::spawn(self.run(commands_rx, snapshot_tx));

        let handle = SessionHandle {
            commands: commands_tx,
            snapshots: snapshot_rx,
        };
        (handle, join)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        snapshots: watch::Sender<AppSnapshot>,
    ) -> TaskStore {
        let (mut scheduler, mut wakes) = TickScheduler::new();
        let poll = self.daily.poll_interval();

        self.check_day();
        scheduler.arm(WakeKey::DailyCheck, poll, poll);
        self.sync_timers(&mut scheduler);
        snapshots.send_replace(self.snapshot());
        info!(tasks = self.store.len(), "session started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command),
                },
                Some(key) = wakes.recv() => self.wake(key),
            }

            self.sync_timers(&mut scheduler);
            snapshots.send_replace(self.snapshot());
        }

        scheduler.cancel_all();
        info!("session stopped");
        self.store
    }

    fn apply(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Add { title, reply } => {
                let _ = reply.send(self.store.add(title));
            }
            Command::Remove { id, reply } => {
                let result = self.store.remove(id);
                if result.is_ok() {
                    self.timers.unobserve(id);
                }
                let _ = reply.send(result);
            }
            Command::Update { id, edit, reply } => {
                let _ = reply.send(self.store.update(id, edit, now));
            }
            Command::Toggle { id, reply } => {
                let _ = reply.send(self.store.toggle(id, now));
            }
            Command::Open(id) => self.timers.observe(id),
            Command::Close(id) => self.timers.unobserve(id),
            Command::Shutdown => {}
        }
    }

    fn wake(&mut self, key: WakeKey) {
        match key {
            WakeKey::DailyCheck => self.check_day(),
            WakeKey::Countdown(id) => {
                let now = self.clock.now();
                match self.timers.tick(id, &mut self.store, self.alarm.as_ref(), now) {
                    TickOutcome::Expired { alarm_played } => {
                        info!(task = %id, alarm_played, "countdown finished");
                    }
                    TickOutcome::Running { remaining } => {
                        debug!(task = %id, remaining, "countdown tick");
                    }
                    TickOutcome::Idle => {}
                }
            }
        }
    }

    fn check_day(&mut self) {
        if let ResetOutcome::Reset { tasks_reset, .. } =
            self.daily.check(&mut self.store, self.clock.as_ref())
        {
            debug!(tasks_reset, "day reset applied");
        }
    }

    fn sync_timers(&mut self, scheduler: &mut TickScheduler) {
        let now = self.clock.now();
        for change in self.timers.sync(&self.store, now) {
            match change {
                TimerChange::Arm { id, first_in } => {
                    scheduler.arm(WakeKey::Countdown(id), first_in, TICK_PERIOD)
                }
                TimerChange::Disarm(id) => {
                    scheduler.cancel(WakeKey::Countdown(id));
                }
            }
        }
    }

    fn snapshot(&self) -> AppSnapshot {
        let mut snapshot = self.store.snapshot();
        snapshot.countdowns = self.timers.countdowns().clone();
        snapshot
    }
}

/// Command and snapshot access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<AppSnapshot>,
}

impl SessionHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> AppSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<AppSnapshot> {
        self.snapshots.clone()
    }

    pub async fn add(&self, title: impl Into<String>) -> SessionResult<TaskId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Add {
            title: title.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn remove(&self, id: TaskId) -> SessionResult<Task> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Remove { id, reply }).await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    pub async fn update(&self, id: TaskId, edit: TaskEdit) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Update { id, edit, reply }).await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    pub async fn toggle(&self, id: TaskId) -> SessionResult<Completion> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Toggle { id, reply }).await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Mark a task as being looked at so its countdown runs.
    pub async fn open(&self, id: TaskId) -> SessionResult<()> {
        self.send(Command::Open(id)).await
    }

    pub async fn close(&self, id: TaskId) -> SessionResult<()> {
        self.send(Command::Close(id)).await
    }

    pub async fn shutdown(&self) -> SessionResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> SessionResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}
