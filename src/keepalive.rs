// Host keep-alive signalling
//
// Battery-powered hosts cut power to the board between recordings. The
// daemon tells the power controller when it is working and when the queue
// has drained so the host can schedule shutdown. Delivery is best-effort:
// a handful of quick retries, then give up and log.

use std::process::Command;
use std::time::Duration;

use crate::constants::{KEEPALIVE_ATTEMPTS, KEEPALIVE_RETRY_DELAY};
use crate::error::{Result, UploaderError};

/// Power-controller signalling capability.
pub trait KeepAlive {
    /// Ask the host to stay powered for roughly `duration_hint` more.
    fn notify_active(&self, duration_hint: Duration) -> Result<()>;

    /// Tell the host the upload queue has drained.
    fn notify_idle(&self) -> Result<()>;
}

/// For hosts without a power controller.
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn notify_active(&self, _duration_hint: Duration) -> Result<()> {
        Ok(())
    }

    fn notify_idle(&self) -> Result<()> {
        Ok(())
    }
}

/// Signals the power controller by running configured host commands. The
/// active command receives the duration hint in seconds as its argument.
pub struct CommandKeepAlive {
    stay_awake_command: Option<String>,
    idle_command: Option<String>,
}

impl CommandKeepAlive {
    pub fn new(stay_awake_command: Option<String>, idle_command: Option<String>) -> Self {
        CommandKeepAlive {
            stay_awake_command,
            idle_command,
        }
    }

    fn run(command: &str, arg: Option<String>) -> Result<()> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| UploaderError::Config("empty keep-alive command".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(parts);
        if let Some(arg) = arg {
            cmd.arg(arg);
        }
        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UploaderError::Other(format!(
                "keep-alive command failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl KeepAlive for CommandKeepAlive {
    fn notify_active(&self, duration_hint: Duration) -> Result<()> {
        match &self.stay_awake_command {
            Some(command) => Self::run(command, Some(duration_hint.as_secs().to_string())),
            None => Ok(()),
        }
    }

    fn notify_idle(&self) -> Result<()> {
        match &self.idle_command {
            Some(command) => Self::run(command, None),
            None => Ok(()),
        }
    }
}

/// Send the stay-awake signal, retrying a few times. Terminal failure is
/// logged, never surfaced -- power signalling must not disturb uploads.
pub fn signal_active(bus: &dyn KeepAlive, duration_hint: Duration) {
    retry_signal("stay-on request", || bus.notify_active(duration_hint));
}

/// Send the idle signal, retrying a few times. Terminal failure is logged.
pub fn signal_idle(bus: &dyn KeepAlive) {
    retry_signal("idle notification", || bus.notify_idle());
}

fn retry_signal<F: Fn() -> Result<()>>(what: &str, send: F) {
    for attempt in 1..=KEEPALIVE_ATTEMPTS {
        match send() {
            Ok(()) => {
                log::debug!("{} delivered", what);
                return;
            }
            Err(e) if attempt < KEEPALIVE_ATTEMPTS => {
                log::info!("retrying {}: {}", what, e);
                std::thread::sleep(KEEPALIVE_RETRY_DELAY);
            }
            Err(e) => {
                log::warn!("{} failed: {}", what, e);
            }
        }
    }
}
