//! Daily Checklist - headless runner.
//!
//! Keeps the checklist reset at midnight and rings the alarm when a task's
//! countdown runs out. Stops on Ctrl-C.

use anyhow::Context;
use daily_checklist::config::LoggingConfig;
use daily_checklist::{
    alarm, AppSnapshot, Config, Persistence, Session, SessionOptions, SqliteStore, SystemClock,
    TaskStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_tracing(&config.logging);

    let db_path = config
        .db_path()
        .unwrap_or_else(|| "checklist.db".into());
    let backend = SqliteStore::open(&db_path)
        .with_context(|| format!("cannot open checklist at {}", db_path.display()))?;
    info!(path = %db_path.display(), "storage opened");

    let clock = Arc::new(SystemClock);
    let store = TaskStore::open(Persistence::new(backend), clock.as_ref());
    let session = Session::new(
        store,
        alarm::from_config(&config.alarm),
        clock,
        SessionOptions::from(&config),
    );
    let (handle, join) = session.spawn();

    let mut snapshots = handle.subscribe();
    let mut last = summary(&snapshots.borrow());
    info!("{last}");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl-C")?;
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = summary(&snapshots.borrow_and_update());
                if current != last {
                    info!("{current}");
                    last = current;
                }
            }
        }
    }

    info!("shutting down");
    let _ = handle.shutdown().await;
    let store = join.await.context("session task failed")?;
    if store.write_failures() > 0 {
        tracing::warn!(failures = store.write_failures(), "some saves failed this session");
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .init();
}

fn summary(snapshot: &AppSnapshot) -> String {
    let mut line = format!(
        "{}/{} tasks done, {} timed",
        snapshot.completed_count(),
        snapshot.tasks.len(),
        snapshot.countdowns.len()
    );
    if snapshot.write_failures > 0 {
        line.push_str(&format!(", {} failed saves", snapshot.write_failures));
    }
    line
}
