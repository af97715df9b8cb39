// Upload job state machine
//
// One recording (or one orphaned metadata sidecar) carried from discovery
// through preprocessing and upload to deletion or quarantine. Jobs are
// ephemeral value objects rebuilt from directory scans on every pass; only
// their on-disk side effects survive a restart, so the filesystem itself is
// the durable queue.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::api::UploadClient;
use crate::classify::{self, MediaKind};
use crate::constants::FAILED_UPLOADS_FOLDER;
use crate::error::{Result, UploaderError};
use crate::timestamp;
use crate::transcode::Transcoder;

use super::sidecar::{self, SidecarMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Preprocessed,
    Uploading,
    MetadataPending,
    Done,
    Quarantined,
}

#[derive(Debug)]
pub struct UploadJob {
    /// Media file, None once uploaded-and-deleted or for sidecar-only jobs.
    pub primary: Option<PathBuf>,
    /// Companion metadata file, probed once at creation.
    pub sidecar: Option<PathBuf>,
    pub kind: Option<MediaKind>,
    pub needs_conversion: bool,
    /// Assigned by the server after the media upload; 0 until then.
    pub recording_id: i64,
    pub duration_seconds: i64,
    pub recording_timestamp: Option<DateTime<Local>>,
    pub phase: Phase,
}

impl UploadJob {
    /// Job for a media file. Returns None for unrecognized extensions,
    /// which the glob-based scan upstream should never produce.
    pub fn new(path: &Path) -> Option<UploadJob> {
        let classification = classify::classify(path)?;
        Some(UploadJob {
            primary: Some(path.to_path_buf()),
            sidecar: classify::existing_sidecar(path),
            kind: Some(classification.kind),
            needs_conversion: classification.needs_conversion,
            recording_id: 0,
            duration_seconds: 0,
            recording_timestamp: None,
            phase: Phase::Created,
        })
    }

    /// Job for a quarantined sidecar whose media upload already succeeded.
    /// The recording id comes from the filename prefix.
    pub fn for_sidecar(path: &Path, recording_id: i64) -> UploadJob {
        UploadJob {
            primary: None,
            sidecar: Some(path.to_path_buf()),
            kind: None,
            needs_conversion: false,
            recording_id,
            duration_seconds: 0,
            recording_timestamp: None,
            phase: Phase::Created,
        }
    }

    /// Path used when talking about this job in logs.
    pub fn describe(&self) -> String {
        self.primary
            .as_deref()
            .or(self.sidecar.as_deref())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<consumed job>".to_string())
    }

    /// Parse the recording timestamp, convert to the canonical upload
    /// format if needed, and probe the duration. Idempotent; a second call
    /// is a no-op. Conversion and duration-probe failures are fatal to the
    /// job and the caller routes it straight to quarantine.
    pub fn preprocess(&mut self, transcoder: &dyn Transcoder) -> Result<()> {
        if self.phase != Phase::Created {
            return Ok(());
        }
        let primary = match self.primary.clone() {
            Some(p) => p,
            None => {
                // Sidecar-only jobs carry nothing to preprocess.
                self.phase = Phase::Preprocessed;
                return Ok(());
            }
        };

        self.recording_timestamp = timestamp::parse_from_filename(&primary);
        if self.recording_timestamp.is_none() {
            log::debug!("no timestamp pattern matched for {}", primary.display());
        }

        if self.needs_conversion {
            let (converted, duration) = transcoder.transcode(&primary)?;
            self.primary = Some(converted);
            self.needs_conversion = false;
            self.duration_seconds = duration;
        } else if self.kind == Some(MediaKind::InfraredRaw) {
            self.duration_seconds = transcoder.probe_duration(&primary)?;
        }

        self.phase = Phase::Preprocessed;
        Ok(())
    }

    /// Drive the job through the remote API: upload the media file (deleted
    /// on success), then submit sidecar tracks, then delete the sidecar.
    /// Re-enterable: a retry after a metadata failure skips the already-
    /// completed media leg and the tracks marked uploaded in the ledger.
    pub fn upload(&mut self, client: &dyn UploadClient) -> Result<()> {
        if self.phase == Phase::Done {
            return Ok(());
        }

        if let Some(media) = self.primary.clone() {
            let kind = self.kind.ok_or_else(|| {
                UploaderError::Other(format!("unclassified media file: {}", media.display()))
            })?;

            self.phase = Phase::Uploading;
            if !media.exists() {
                // Disappeared between listing and open. Ignore.
                log::debug!("{} vanished before upload", media.display());
                self.phase = Phase::Done;
                return Ok(());
            }

            self.recording_id = client.upload_media(
                kind,
                self.recording_timestamp,
                self.duration_seconds,
                &media,
            )?;
            log::info!(
                "media upload complete: {} (recording {})",
                media.display(),
                self.recording_id
            );
            remove_file_logged(&media);
            self.primary = None;
        }

        if let Some(sidecar_path) = self.sidecar.clone() {
            self.phase = Phase::MetadataPending;
            self.upload_metadata(client, &sidecar_path)?;
            remove_file_logged(&sidecar_path);
            self.sidecar = None;
        }

        self.phase = Phase::Done;
        Ok(())
    }

    // Submit every track not yet marked uploaded, tagging those with a
    // confident tag. On any failure the ledger is rewritten to disk first
    // so the next pass resumes where this one stopped.
    fn upload_metadata(&self, client: &dyn UploadClient, path: &Path) -> Result<()> {
        let mut meta = SidecarMeta::load(path)?;

        let recording_id = if self.recording_id != 0 {
            self.recording_id
        } else {
            meta.recording_id.unwrap_or(0)
        };
        if recording_id == 0 {
            return Err(UploaderError::Sidecar(format!(
                "no recording id for {}",
                path.display()
            )));
        }

        let algorithm = meta.algorithm_or_null();
        let model_name = meta.model_name_or_default().to_string();

        for i in 0..meta.tracks.len() {
            if meta.tracks[i].uploaded {
                continue;
            }
            let submitted = {
                let track = &meta.tracks[i];
                client
                    .add_track(recording_id, &track.api_data(), &algorithm)
                    .and_then(|resp| match track.tag_payload() {
                        Some(tag) => client.add_track_tag(
                            recording_id,
                            resp.track_id,
                            true,
                            &tag,
                            &model_name,
                        ),
                        None => Ok(()),
                    })
            };
            match submitted {
                Ok(()) => meta.tracks[i].uploaded = true,
                Err(e) => {
                    if let Err(save_err) = meta.save(path) {
                        log::error!(
                            "failed to persist track progress for {}: {}",
                            path.display(),
                            save_err
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Move the job's remaining files into the failed-uploads directory.
    /// After a successful media upload only the sidecar remains, and it is
    /// renamed to embed the assigned recording id.
    pub fn quarantine(&mut self) -> Result<()> {
        if self.phase == Phase::MetadataPending {
            if let Some(sc) = self.sidecar.take() {
                let recording_id = self.recording_id;
                let target = quarantine_target(&sc, |name| {
                    if recording_id != 0 {
                        sidecar::prefixed_name(recording_id, name)
                    } else {
                        name.to_string()
                    }
                })?;
                rename_benign(&sc, &target)?;
            }
        } else {
            if let Some(media) = self.primary.take() {
                let target = quarantine_target(&media, |name| name.to_string())?;
                rename_benign(&media, &target)?;
            }
            if let Some(sc) = self.sidecar.take() {
                let target = quarantine_target(&sc, |name| name.to_string())?;
                rename_benign(&sc, &target)?;
            }
        }
        self.phase = Phase::Quarantined;
        Ok(())
    }
}

fn quarantine_target(path: &Path, name_for: impl Fn(&str) -> String) -> Result<PathBuf> {
    let dir = path.parent().ok_or_else(|| {
        UploaderError::Other(format!("no parent directory for {}", path.display()))
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| UploaderError::Other(format!("unusable file name: {}", path.display())))?;
    let failed_dir = dir.join(FAILED_UPLOADS_FOLDER);
    std::fs::create_dir_all(&failed_dir)?;
    Ok(failed_dir.join(name_for(name)))
}

// A file vanishing between listing and move is a benign no-op.
fn rename_benign(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{} vanished before move", from.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn remove_file_logged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("failed to delete {}: {}", path.display(), e);
        }
    }
}
