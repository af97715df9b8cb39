// Directory change notification
//
// Wraps a debounced filesystem watcher into a single "something changed"
// signal. Signals collapse: the loop always rescans the whole directory, so
// only the fact of activity matters, never which event carried it.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::classify;
use crate::constants::WATCH_DEBOUNCE;
use crate::error::{Result, UploaderError};

pub struct DirWatcher {
    dir: PathBuf,
    rx: Receiver<DebounceEventResult>,
    // Dropping the debouncer stops the watch; hold it for our lifetime.
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl DirWatcher {
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(WATCH_DEBOUNCE, tx)
            .map_err(|e| UploaderError::Watch(e.to_string()))?;
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| UploaderError::Watch(e.to_string()))?;
        log::info!("watching {}", dir.display());
        Ok(DirWatcher {
            dir: dir.to_path_buf(),
            rx,
            _debouncer: debouncer,
        })
    }

    /// Block until new uploadable content appears in the watched directory
    /// or `timeout` elapses. Returns true on activity, after draining any
    /// further queued signals.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(Ok(events)) => {
                    if events.iter().any(|e| self.is_relevant(&e.path)) {
                        self.drain();
                        return true;
                    }
                    // Our own deletes and moves also generate events; keep
                    // waiting for something worth a rescan.
                }
                Ok(Err(e)) => {
                    log::warn!("watch error: {:?}", e);
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!("watch channel disconnected");
                    return false;
                }
            }
        }
    }

    /// Discard queued signals without acting on them.
    pub fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    fn is_relevant(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && (classify::is_recognized_media(path) || classify::is_sidecar_file(path))
            && path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wakes_on_new_recording() {
        let tmp = TempDir::new().unwrap();
        let watcher = DirWatcher::new(tmp.path()).unwrap();

        std::fs::write(tmp.path().join("20240119-150405.cptv"), b"frames").unwrap();
        assert!(watcher.wait(Duration::from_secs(10)));
    }

    #[test]
    fn test_times_out_when_quiet() {
        let tmp = TempDir::new().unwrap();
        let watcher = DirWatcher::new(tmp.path()).unwrap();

        assert!(!watcher.wait(Duration::from_millis(100)));
    }

    #[test]
    fn test_ignores_unrecognized_files() {
        let tmp = TempDir::new().unwrap();
        let watcher = DirWatcher::new(tmp.path()).unwrap();

        std::fs::write(tmp.path().join("notes.xyz"), b"nope").unwrap();
        assert!(!watcher.wait(Duration::from_secs(2)));
    }
}
