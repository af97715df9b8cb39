// Upload worker loop
//
// The single logical worker: one iteration per wake, everything sequential.
// Each iteration holds the connection up, drains the working directory,
// runs the recovery scheduler when due, then signals idle and sleeps until
// filesystem activity or the next recovery deadline.

use std::path::{Path, PathBuf};
use std::time::Instant;

use walkdir::WalkDir;

use crate::api::UploadClient;
use crate::classify;
use crate::connectivity::ConnectionGate;
use crate::constants::{
    ACTIVE_HINT, CONNECTION_MAX_RETRIES, CONNECTION_RETRY_INTERVAL, CONNECTION_TIMEOUT,
    IDLE_GRACE, IDLE_RECHECK_MAX,
};
use crate::error::Result;
use crate::keepalive::{self, KeepAlive};
use crate::transcode::Transcoder;
use crate::upload::{recovery, retry, RecoveryScheduler, UploadJob};
use crate::watch::DirWatcher;

pub struct Worker<'a> {
    directory: PathBuf,
    client: &'a dyn UploadClient,
    transcoder: &'a dyn Transcoder,
    gate: &'a dyn ConnectionGate,
    keepalive: &'a dyn KeepAlive,
    watcher: DirWatcher,
    recovery: RecoveryScheduler,
}

impl<'a> Worker<'a> {
    pub fn new(
        directory: &Path,
        client: &'a dyn UploadClient,
        transcoder: &'a dyn Transcoder,
        gate: &'a dyn ConnectionGate,
        keepalive: &'a dyn KeepAlive,
        watcher: DirWatcher,
    ) -> Worker<'a> {
        Worker {
            directory: directory.to_path_buf(),
            client,
            transcoder,
            gate,
            keepalive,
            watcher,
            recovery: RecoveryScheduler::new(),
        }
    }

    /// Run forever. Only unrecoverable errors return: a connectivity wait
    /// that never comes up, or a filesystem move that fails. The supervisor
    /// restarts the daemon in both cases.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.iterate()?;
        }
    }

    fn iterate(&mut self) -> Result<()> {
        keepalive::signal_active(self.keepalive, ACTIVE_HINT);

        self.gate.request();
        self.gate.wait_until_up(
            CONNECTION_TIMEOUT,
            CONNECTION_RETRY_INTERVAL,
            CONNECTION_MAX_RETRIES,
        )?;

        process_directory(&self.directory, self.client, self.transcoder)?;

        if self.recovery.is_due(Instant::now()) {
            if recovery::run_pass(&self.directory, self.client, self.transcoder) {
                self.recovery.record_success(Instant::now());
            } else {
                self.recovery.record_failure(Instant::now());
            }
        }

        // Nothing new during the pass: let the host power the link down,
        // then sleep until activity or the next recovery deadline. The
        // timer bound keeps backoff deadlines honored on a quiet device.
        if !self.watcher.wait(IDLE_GRACE) {
            keepalive::signal_idle(self.keepalive);
            self.gate.release();
            let until_due = self.recovery.until_due(Instant::now());
            let wait = if until_due.is_zero() {
                IDLE_RECHECK_MAX
            } else {
                until_due.clamp(IDLE_GRACE, IDLE_RECHECK_MAX)
            };
            self.watcher.wait(wait);
        }
        Ok(())
    }
}

/// Upload every recognized media file currently in the working directory.
/// Preprocessing failures quarantine the file without consuming an upload
/// attempt; upload failures are handled by the retry wrapper.
pub fn process_directory(
    directory: &Path,
    client: &dyn UploadClient,
    transcoder: &dyn Transcoder,
) -> Result<()> {
    for path in scan_media(directory) {
        let mut job = match UploadJob::new(&path) {
            Some(job) => job,
            None => continue,
        };
        if let Err(e) = job.preprocess(transcoder) {
            log::warn!("failed to preprocess {}: {}", path.display(), e);
            job.quarantine()?;
            continue;
        }
        retry::upload_with_retries(client, &mut job)?;
    }
    Ok(())
}

/// Recognized media files directly inside the working directory, sorted.
/// The failed-uploads subdirectory is not descended into.
pub fn scan_media(directory: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if classify::is_recognized_media(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}
