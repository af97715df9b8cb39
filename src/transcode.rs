// External transcoder wrapper
//
// Conversion to the canonical upload formats is delegated to ffmpeg, and
// duration probing to ffprobe. Both block the single worker for their
// duration, which is acceptable under the sequential processing model.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::classify;
use crate::constants::{CANONICAL_AUDIO_EXTENSION, CANONICAL_VIDEO_EXTENSION};
use crate::error::{Result, UploaderError};
use crate::tools;

/// The external media transcoder capability.
pub trait Transcoder {
    /// Convert a file to its canonical upload format. Deletes the original
    /// on success and returns the new path together with the probed duration
    /// of the converted file in seconds.
    fn transcode(&self, path: &Path) -> Result<(PathBuf, i64)>;

    /// Probe a file's duration in seconds without converting it.
    fn probe_duration(&self, path: &Path) -> Result<i64>;
}

/// Transcoder shelling out to ffmpeg/ffprobe.
pub struct FfmpegTranscoder;

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, path: &Path) -> Result<(PathBuf, i64)> {
        let classification = classify::classify(path).ok_or_else(|| {
            UploaderError::Transcode(format!("unrecognized media file: {}", path.display()))
        })?;
        if !classification.needs_conversion {
            let duration = self.probe_duration(path)?;
            return Ok((path.to_path_buf(), duration));
        }

        let output = match classification.kind {
            classify::MediaKind::Audio => convert_audio(path)?,
            _ => convert_video(path)?,
        };

        // The original is no longer needed; a failed delete is not worth
        // failing the job over.
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("failed to delete {}: {}", path.display(), e);
        }

        let duration = self.probe_duration(&output)?;
        Ok((output, duration))
    }

    fn probe_duration(&self, path: &Path) -> Result<i64> {
        let output = Command::new(tools::ffprobe_path())
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .map_err(|e| UploaderError::FFprobe(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UploaderError::FFprobe(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text.trim().parse().map_err(|_| {
            UploaderError::FFprobe(format!("unparseable duration {:?} for {}", text.trim(), path.display()))
        })?;
        Ok(seconds as i64)
    }
}

// avi -> mp4: re-encode video to H.264, copy audio, strip container metadata.
fn convert_video(path: &Path) -> Result<PathBuf> {
    let out = path.with_extension(CANONICAL_VIDEO_EXTENSION);
    let output = Command::new(tools::ffmpeg_path())
        .arg("-y")
        .arg("-i")
        .arg(path)
        .args(["-map_metadata", "-1", "-vcodec", "libx264", "-c:a", "copy"])
        .arg(&out)
        .output()
        .map_err(|e| UploaderError::Transcode(format!("failed to run ffmpeg: {}", e)))?;

    check_ffmpeg_status(path, &out, output)
}

// wav -> aac in an mp4 container, metadata mapped through.
fn convert_audio(path: &Path) -> Result<PathBuf> {
    let out = path.with_extension(CANONICAL_AUDIO_EXTENSION);
    let output = Command::new(tools::ffmpeg_path())
        .arg("-y")
        .arg("-i")
        .arg(path)
        .args([
            "-codec:a",
            "aac",
            "-b:a",
            "128k",
            "-q:a",
            "1.2",
            "-aac_coder",
            "fast",
            "-movflags",
            "faststart",
            "-movflags",
            "+use_metadata_tags",
            "-map_metadata",
            "0",
            "-f",
            "mp4",
        ])
        .arg(&out)
        .output()
        .map_err(|e| UploaderError::Transcode(format!("failed to run ffmpeg: {}", e)))?;

    check_ffmpeg_status(path, &out, output)
}

fn check_ffmpeg_status(
    source: &Path,
    out: &Path,
    output: std::process::Output,
) -> Result<PathBuf> {
    if !output.status.success() {
        // Clean up any partial output so the quarantined file stays the
        // lone artifact of this job.
        let _ = std::fs::remove_file(out);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UploaderError::Transcode(format!(
            "ffmpeg failed for {}: {}",
            source.display(),
            last_line(&stderr)
        )));
    }
    Ok(out.to_path_buf())
}

// ffmpeg writes pages of progress to stderr; the final line carries the error.
fn last_line(stderr: &str) -> &str {
    stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\nb\nc\n"), "c");
        assert_eq!(last_line("only"), "only");
        assert_eq!(last_line("x\n\n  \n"), "x");
        assert_eq!(last_line(""), "");
    }
}
