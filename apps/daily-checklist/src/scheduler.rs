//! Timer service that turns armed intervals into session wakeups.

use crate::models::TaskId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a wakeup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeKey {
    /// Day-boundary poll.
    DailyCheck,
    /// Countdown re-evaluation for one task.
    Countdown(TaskId),
}

/// Owns every armed callback and its cancellation token.
///
/// Wakeups are delivered on the channel returned by [`TickScheduler::new`].
/// A wakeup already queued when its key is cancelled may still be received,
/// so handlers must tolerate stale keys.
pub struct TickScheduler {
    tx: mpsc::UnboundedSender<WakeKey>,
    root: CancellationToken,
    armed: HashMap<WakeKey, CancellationToken>,
}

impl TickScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WakeKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            root: CancellationToken::new(),
            armed: HashMap::new(),
        };
        (scheduler, rx)
    }

    /// Deliver `key` after `first_in`, then every `every`, until cancelled.
    ///
    /// Arming a key that is already armed replaces the previous callback.
    pub fn arm(&mut self, key: WakeKey, first_in: Duration, every: Duration) {
        self.cancel(key);

        let token = self.root.child_token();
        let cancel = token.clone();
        let tx = self.tx.clone();
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + first_in, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        debug!(?key, ?first_in, ?every, "wakeup armed");
        self.armed.insert(key, token);
    }

    /// Cancel the callback for `key`. Returns whether one was armed.
    pub fn cancel(&mut self, key: WakeKey) -> bool {
        match self.armed.remove(&key) {
            Some(token) => {
                token.cancel();
                debug!(?key, "wakeup cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, token) in self.armed.drain() {
            token.cancel();
        }
    }

    pub fn is_armed(&self, key: WakeKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_interval_delivers_repeatedly() {
        let (mut scheduler, mut rx) = TickScheduler::new();
        scheduler.arm(
            WakeKey::DailyCheck,
            Duration::from_secs(1),
            Duration::from_secs(10),
        );

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(WakeKey::DailyCheck));
        assert_eq!(rx.recv().await, Some(WakeKey::DailyCheck));
        assert!(started.elapsed() >= Duration::from_secs(11));
        assert!(scheduler.is_armed(WakeKey::DailyCheck));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_delivery() {
        let (mut scheduler, mut rx) = TickScheduler::new();
        let key = WakeKey::Countdown(uuid::Uuid::new_v4());
        scheduler.arm(key, Duration::from_secs(60), Duration::from_secs(60));

        assert!(scheduler.cancel(key));
        assert!(!scheduler.cancel(key));
        assert!(timeout(Duration::from_secs(600), rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_callback() {
        let (mut scheduler, mut rx) = TickScheduler::new();
        let key = WakeKey::Countdown(uuid::Uuid::new_v4());
        scheduler.arm(key, Duration::from_secs(30), Duration::from_secs(60));
        scheduler.arm(key, Duration::from_secs(90), Duration::from_secs(60));
        assert_eq!(scheduler.armed_count(), 1);

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(key));
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_everything() {
        let (mut scheduler, mut rx) = TickScheduler::new();
        scheduler.arm(
            WakeKey::DailyCheck,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        drop(scheduler);
        assert_eq!(rx.recv().await, None);
    }
}
