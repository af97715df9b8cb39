// Trailcam Uploader Constants

use std::time::Duration;

// Directories
pub const FAILED_UPLOADS_FOLDER: &str = "failed-uploads";
pub const DEFAULT_RECORDINGS_DIR: &str = "/var/spool/trailcam";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/trailcam-uploader.yaml";

// Per-job retry policy (immediate, no delay -- connectivity is already held
// up by the watch loop while these run)
pub const UPLOAD_ATTEMPTS: u32 = 3;

// Failed-upload recovery scheduler: quadratic backoff, capped
pub const RETRY_BASE_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// Connectivity gate
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);
pub const CONNECTION_RETRY_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const CONNECTION_MAX_RETRIES: u32 = 5;
pub const CONNECTION_PROBE_INTERVAL: Duration = Duration::from_secs(5);

// Keep-alive signalling to the host power controller (best-effort)
pub const KEEPALIVE_ATTEMPTS: u32 = 3;
pub const KEEPALIVE_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const ACTIVE_HINT: Duration = Duration::from_secs(60);

// Watch loop timing
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const IDLE_GRACE: Duration = Duration::from_secs(1);
pub const IDLE_RECHECK_MAX: Duration = Duration::from_secs(10 * 60);

// HTTP
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

// Media extensions by kind. Extensions not listed here are ignored entirely.
pub const THERMAL_EXTENSIONS: [&str; 1] = ["cptv"];
pub const INFRARED_EXTENSIONS: [&str; 2] = ["avi", "mp4"];
pub const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "aac"];

// Formats requiring conversion to the canonical upload format
pub const CONVERT_VIDEO_EXTENSION: &str = "avi";
pub const CONVERT_AUDIO_EXTENSION: &str = "wav";
pub const CANONICAL_VIDEO_EXTENSION: &str = "mp4";
pub const CANONICAL_AUDIO_EXTENSION: &str = "aac";

// Sidecar metadata files share the media file's stem with this extension
pub const SIDECAR_EXTENSION: &str = "txt";

// Default classifier model name when a sidecar omits it
pub const DEFAULT_MODEL_NAME: &str = "master";

// Accepted filename timestamp patterns, tried in order; first match wins.
// Each entry pairs an anchored prefix regex with the chrono format that
// parses the matched text.
pub const TIMESTAMP_PATTERNS: [(&str, &str); 3] = [
    (
        r"^\d{4}-\d{2}-\d{2}--\d{2}-\d{2}-\d{2}",
        "%Y-%m-%d--%H-%M-%S",
    ),
    (r"^\d{8}-\d{6}\.\d{6}", "%Y%m%d-%H%M%S%.6f"),
    (r"^\d{8}-\d{6}", "%Y%m%d-%H%M%S"),
];
