// Media file classification
//
// Maps file extensions onto the closed set of media kinds the ingestion API
// accepts, and probes for companion metadata sidecars. Pure filesystem reads;
// no side effects beyond a stat call for the sidecar probe.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::constants::{
    AUDIO_EXTENSIONS, CONVERT_AUDIO_EXTENSION, CONVERT_VIDEO_EXTENSION, INFRARED_EXTENSIONS,
    SIDECAR_EXTENSION, THERMAL_EXTENSIONS,
};

/// Media kind as understood by the ingestion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    ThermalRaw,
    InfraredRaw,
    Audio,
}

impl MediaKind {
    /// Kind for a lowercased file extension, if recognized.
    pub fn from_extension(ext: &str) -> Option<MediaKind> {
        if THERMAL_EXTENSIONS.contains(&ext) {
            Some(MediaKind::ThermalRaw)
        } else if INFRARED_EXTENSIONS.contains(&ext) {
            Some(MediaKind::InfraredRaw)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// The `type` value the API expects for this kind.
    pub fn api_name(&self) -> &'static str {
        match self {
            MediaKind::ThermalRaw => "thermalRaw",
            MediaKind::InfraredRaw => "irRaw",
            MediaKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub kind: MediaKind,
    pub needs_conversion: bool,
}

/// Classify a candidate path by extension. Unknown extensions return None
/// and are skipped by the directory scan.
pub fn classify(path: &Path) -> Option<Classification> {
    let ext = extension_of(path)?;
    let kind = MediaKind::from_extension(&ext)?;
    let needs_conversion = ext == CONVERT_VIDEO_EXTENSION || ext == CONVERT_AUDIO_EXTENSION;
    Some(Classification {
        kind,
        needs_conversion,
    })
}

/// Check if a path carries a recognized media extension.
pub fn is_recognized_media(path: &Path) -> bool {
    classify(path).is_some()
}

/// Check if a path is a metadata sidecar by extension.
pub fn is_sidecar_file(path: &Path) -> bool {
    extension_of(path).as_deref() == Some(SIDECAR_EXTENSION)
}

/// The sidecar path a media file would have (same stem, sidecar extension),
/// regardless of whether it exists.
pub fn sidecar_path(media_path: &Path) -> PathBuf {
    media_path.with_extension(SIDECAR_EXTENSION)
}

/// Probe for an existing sidecar next to a media file.
pub fn existing_sidecar(media_path: &Path) -> Option<PathBuf> {
    let candidate = sidecar_path(media_path);
    if candidate.exists() {
        Some(candidate)
    } else {
        None
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
