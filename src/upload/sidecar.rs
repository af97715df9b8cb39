// Sidecar metadata ledger
//
// A sidecar is the JSON companion of a recording: classifier output, the
// algorithm descriptor, and the detected tracks. It doubles as the durable
// ledger of per-track upload progress -- the `uploaded` flag on each track
// is rewritten to disk after every partial failure, so a resumed pass never
// re-submits a completed track. All fields this daemon does not understand
// are carried through untouched.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::constants::DEFAULT_MODEL_NAME;
use crate::error::{Result, UploaderError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMeta {
    /// Recording id recorded in the content. The filename-embedded id wins
    /// over this when both exist; see `parse_prefixed_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Opaque algorithm descriptor, passed through to the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Value>,

    #[serde(default)]
    pub tracks: Vec<Track>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Durable marker: this track has been accepted by the server (and
    /// tagged, when a confident tag exists). Never resubmitted once set.
    #[serde(default)]
    pub uploaded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confident_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<Value>,

    /// Opaque track data (positions, times, predictions), passed through.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Track {
    /// The track body submitted to the API.
    pub fn api_data(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// The tag record for this track, when it carries a confident tag.
    pub fn tag_payload(&self) -> Option<Value> {
        let tag = self.confident_tag.as_ref()?;
        let mut payload = json!({ "what": tag });
        if let Some(scores) = &self.confidence_scores {
            payload["confidenceScores"] = scores.clone();
        }
        Some(payload)
    }
}

impl SidecarMeta {
    pub fn load(path: &Path) -> Result<SidecarMeta> {
        let buf = std::fs::read_to_string(path)?;
        serde_json::from_str(&buf)
            .map_err(|e| UploaderError::Sidecar(format!("{}: {}", path.display(), e)))
    }

    /// Rewrite the ledger in place. Uses temp-fsync-rename so a crash
    /// mid-write never leaves a torn sidecar.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            UploaderError::Sidecar(format!("no parent directory for {}", path.display()))
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sidecar");
        let tmp_path = dir.join(format!(".tmp_{}", name));

        let buf = serde_json::to_string_pretty(self)?;
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(buf.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        if let Ok(dir) = std::fs::File::open(dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    pub fn model_name_or_default(&self) -> &str {
        self.model_name.as_deref().unwrap_or(DEFAULT_MODEL_NAME)
    }

    /// Algorithm descriptor to submit with each track; null when the
    /// sidecar carries none.
    pub fn algorithm_or_null(&self) -> Value {
        self.algorithm.clone().unwrap_or(Value::Null)
    }
}

static PREFIXED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(.+)$").expect("prefix pattern must compile"));

/// Filename for a sidecar quarantined after its media upload succeeded:
/// the assigned recording id becomes a filename prefix so a later pass can
/// resume without re-deriving it.
pub fn prefixed_name(recording_id: i64, file_name: &str) -> String {
    format!("{}-{}", recording_id, file_name)
}

/// Split a quarantined sidecar filename into its embedded recording id and
/// the original name. None when no id prefix is present.
pub fn parse_prefixed_id(file_name: &str) -> Option<(i64, &str)> {
    let caps = PREFIXED_ID.captures(file_name)?;
    let id: i64 = caps.get(1)?.as_str().parse().ok()?;
    let rest = caps.get(2)?.as_str();
    Some((id, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "modelName": "inference-v2",
        "algorithm": { "model_name": "inference-v2", "tracker_version": 10 },
        "tracks": [
            {
                "start_s": 1.5,
                "end_s": 4.0,
                "confidentTag": "possum",
                "confidenceScores": { "possum": 0.93, "rodent": 0.04 },
                "positions": [[1.5, [10, 20, 40, 50]]]
            },
            { "start_s": 6.0, "end_s": 7.2, "uploaded": true }
        ],
        "deviceId": 991
    }"#;

    #[test]
    fn test_load_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rec.txt");
        std::fs::write(&path, SAMPLE).unwrap();

        let meta = SidecarMeta::load(&path).unwrap();
        assert_eq!(meta.model_name_or_default(), "inference-v2");
        assert_eq!(meta.tracks.len(), 2);
        assert!(!meta.tracks[0].uploaded);
        assert!(meta.tracks[1].uploaded);
        assert_eq!(meta.tracks[0].confident_tag.as_deref(), Some("possum"));
        // Unknown top-level keys ride along
        assert_eq!(meta.extra["deviceId"], 991);
    }

    #[test]
    fn test_rewrite_preserves_opaque_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rec.txt");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut meta = SidecarMeta::load(&path).unwrap();
        meta.tracks[0].uploaded = true;
        meta.save(&path).unwrap();

        let reloaded = SidecarMeta::load(&path).unwrap();
        assert!(reloaded.tracks[0].uploaded);
        assert_eq!(reloaded.tracks[0].data["start_s"], 1.5);
        assert_eq!(
            reloaded.tracks[0].data["positions"],
            serde_json::json!([[1.5, [10, 20, 40, 50]]])
        );
        assert_eq!(reloaded.extra["deviceId"], 991);
        // No temp file left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_default_model_name() {
        let meta: SidecarMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.model_name_or_default(), DEFAULT_MODEL_NAME);
        assert!(meta.tracks.is_empty());
    }

    #[test]
    fn test_tag_payload() {
        let meta: SidecarMeta = serde_json::from_str(SAMPLE).unwrap();
        let payload = meta.tracks[0].tag_payload().unwrap();
        assert_eq!(payload["what"], "possum");
        assert_eq!(payload["confidenceScores"]["possum"], 0.93);
        assert!(meta.tracks[1].tag_payload().is_none());
    }

    #[test]
    fn test_prefixed_names() {
        assert_eq!(prefixed_name(4821, "rec.txt"), "4821-rec.txt");
        assert_eq!(parse_prefixed_id("4821-rec.txt"), Some((4821, "rec.txt")));
        assert_eq!(parse_prefixed_id("rec.txt"), None);
        assert_eq!(parse_prefixed_id("-rec.txt"), None);
    }

    #[test]
    fn test_malformed_sidecar_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rec.txt");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SidecarMeta::load(&path),
            Err(UploaderError::Sidecar(_))
        ));
    }
}
