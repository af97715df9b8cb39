// Failed-upload recovery scheduler
//
// Quarantined items are retried in batches: one pass attempts every item,
// and the whole batch succeeds or fails together. A failed pass backs the
// batch off quadratically (capped) so a degraded server is not hammered,
// while a successful pass makes the queue eligible again immediately. Each
// pass starts at a random offset so a single always-failing item cannot
// permanently starve the rest of the batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use walkdir::WalkDir;

use crate::api::UploadClient;
use crate::classify;
use crate::constants::{FAILED_UPLOADS_FOLDER, RETRY_BASE_INTERVAL, RETRY_MAX_INTERVAL};
use crate::transcode::Transcoder;

use super::job::UploadJob;
use super::sidecar;

/// Owns the batch backoff state: how many consecutive passes have failed
/// and when the next one becomes eligible.
pub struct RecoveryScheduler {
    attempts: u32,
    next_attempt: Instant,
}

impl RecoveryScheduler {
    pub fn new() -> RecoveryScheduler {
        RecoveryScheduler {
            attempts: 0,
            next_attempt: Instant::now(),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_attempt
    }

    /// Time left until the next pass becomes eligible; zero when due.
    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_attempt.saturating_duration_since(now)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A fully successful pass resets the backoff: eligible again on the
    /// very next loop iteration.
    pub fn record_success(&mut self, now: Instant) {
        self.attempts = 0;
        self.next_attempt = now;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.attempts += 1;
        let delay = backoff_delay(self.attempts);
        self.next_attempt = now + delay;
        log::info!(
            "failed uploads still failing, next attempt in {}s",
            delay.as_secs()
        );
    }
}

impl Default for RecoveryScheduler {
    fn default() -> Self {
        RecoveryScheduler::new()
    }
}

/// Backoff after `attempts` consecutive failed passes:
/// min(base * attempts^2, cap).
pub fn backoff_delay(attempts: u32) -> Duration {
    let squared = attempts.saturating_mul(attempts);
    (RETRY_BASE_INTERVAL * squared).min(RETRY_MAX_INTERVAL)
}

/// Attempt every quarantined item once, in circular order from a random
/// start. Returns true only if the quarantine is empty afterwards; the
/// first failure aborts the pass and leaves the remainder untouched.
pub fn run_pass(directory: &Path, client: &dyn UploadClient, transcoder: &dyn Transcoder) -> bool {
    let failed_dir = directory.join(FAILED_UPLOADS_FOLDER);
    let mut jobs = scan_quarantine(&failed_dir);
    if jobs.is_empty() {
        return true;
    }
    // Random start so the same failing file is not always attempted first.
    let start = rand::thread_rng().gen_range(0..jobs.len());
    run_pass_from(&mut jobs, start, client, transcoder)
}

pub(crate) fn run_pass_from(
    jobs: &mut [UploadJob],
    start: usize,
    client: &dyn UploadClient,
    transcoder: &dyn Transcoder,
) -> bool {
    for idx in visit_order(jobs.len(), start) {
        let job = &mut jobs[idx];
        let what = job.describe();
        let result = job
            .preprocess(transcoder)
            .and_then(|_| job.upload(client));
        if let Err(e) = result {
            log::warn!("still failing to upload {}: {}", what, e);
            return false;
        }
        log::info!("recovered {}", what);
    }
    true
}

// Indices 0..len visited exactly once, starting at `start` and wrapping.
fn visit_order(len: usize, start: usize) -> impl Iterator<Item = usize> {
    (0..len).map(move |i| (start + i) % len)
}

/// Rebuild jobs from the quarantine directory listing. Media files become
/// ordinary jobs (their same-stem sidecars ride along); id-prefixed
/// sidecars with no surviving media become sidecar-only jobs.
pub fn scan_quarantine(failed_dir: &Path) -> Vec<UploadJob> {
    let mut media = Vec::new();
    let mut sidecars = Vec::new();
    for entry in WalkDir::new(failed_dir)
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
            media.push(path.to_path_buf());
        } else if classify::is_sidecar_file(path) {
            sidecars.push(path.to_path_buf());
        }
    }
    media.sort();
    sidecars.sort();

    let mut jobs: Vec<UploadJob> = media.iter().filter_map(|p| UploadJob::new(p)).collect();

    let claimed: HashSet<PathBuf> = jobs.iter().filter_map(|j| j.sidecar.clone()).collect();
    for sc in sidecars {
        if claimed.contains(&sc) {
            continue;
        }
        let name = match sc.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if let Some((recording_id, _)) = sidecar::parse_prefixed_id(name) {
            jobs.push(UploadJob::for_sidecar(&sc, recording_id));
        }
        // An unclaimed sidecar without an id prefix has no media and no
        // recording to attach to; it stays where it is.
    }
    jobs
}
