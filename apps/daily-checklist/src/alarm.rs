//! Alarm played when a countdown runs out.

use crate::config::{AlarmConfig, AlarmKind};
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Alarm errors.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Alarm command not configured")]
    NotConfigured,
    #[error("Alarm failed: {0}")]
    Failed(String),
}

pub type AlarmResult<T> = Result<T, AlarmError>;

/// Audible or visual alert capability.
pub trait Alarm: Send {
    /// Prepare the alarm. Called once by the owner before first use.
    fn initialize(&mut self) -> AlarmResult<()> {
        Ok(())
    }

    /// Trigger the alert. Must not block on playback.
    fn play(&self) -> AlarmResult<()>;
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default)]
pub struct BellAlarm;

impl Alarm for BellAlarm {
    fn play(&self) -> AlarmResult<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Runs an external command, typically a sound player.
#[derive(Debug)]
pub struct CommandAlarm {
    argv: Vec<String>,
    ready: bool,
}

impl CommandAlarm {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, ready: false }
    }
}

impl Alarm for CommandAlarm {
    fn initialize(&mut self) -> AlarmResult<()> {
        match self.argv.first() {
            Some(program) if !program.trim().is_empty() => {
                self.ready = true;
                debug!(program = %program, "alarm command ready");
                Ok(())
            }
            _ => Err(AlarmError::NotConfigured),
        }
    }

    fn play(&self) -> AlarmResult<()> {
        if !self.ready {
            return Err(AlarmError::NotConfigured);
        }
        let (program, args) = self.argv.split_first().ok_or(AlarmError::NotConfigured)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Reap in the background so playback never blocks the session.
        let program = program.clone();
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                warn!(program = %program, %status, "alarm command exited with failure")
            }
            Err(e) => warn!(program = %program, error = %e, "cannot wait for alarm command"),
            Ok(_) => {}
        });
        Ok(())
    }
}

/// Logs instead of making noise.
#[derive(Debug, Default)]
pub struct SilentAlarm;

impl Alarm for SilentAlarm {
    fn play(&self) -> AlarmResult<()> {
        info!("alarm (silent)");
        Ok(())
    }
}

/// Build the alarm selected in the config.
pub fn from_config(config: &AlarmConfig) -> Box<dyn Alarm> {
    match config.kind {
        AlarmKind::Bell => Box::new(BellAlarm),
        AlarmKind::Command => Box::new(CommandAlarm::new(config.command.clone())),
        AlarmKind::Silent => Box::new(SilentAlarm),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts plays; optionally fails every time.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingAlarm {
        plays: Arc<AtomicUsize>,
        fail: bool,
    }

    impl RecordingAlarm {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn plays(&self) -> usize {
            self.plays.load(Ordering::SeqCst)
        }
    }

    impl Alarm for RecordingAlarm {
        fn play(&self) -> AlarmResult<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AlarmError::Failed("speaker unplugged".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_command_alarm_requires_program() {
        let mut alarm = CommandAlarm::new(Vec::new());
        assert!(matches!(alarm.initialize(), Err(AlarmError::NotConfigured)));
        assert!(matches!(alarm.play(), Err(AlarmError::NotConfigured)));
    }

    #[test]
    fn test_command_alarm_missing_binary_is_an_error() {
        let mut alarm = CommandAlarm::new(vec!["/nonexistent/alarm-player".into()]);
        alarm.initialize().unwrap();
        assert!(matches!(alarm.play(), Err(AlarmError::Io(_))));
    }

    #[test]
    fn test_from_config_selects_kind() {
        let config = AlarmConfig {
            kind: AlarmKind::Silent,
            command: Vec::new(),
        };
        let mut alarm = from_config(&config);
        alarm.initialize().unwrap();
        alarm.play().unwrap();
    }
}
