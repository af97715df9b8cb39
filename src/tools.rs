// External tool resolver for ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (TRAILCAM_FFMPEG_PATH, TRAILCAM_FFPROBE_PATH)
// 2) PATH

use std::env;
use std::path::PathBuf;

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }
    PathBuf::from(default_name)
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool("TRAILCAM_FFMPEG_PATH", "ffmpeg")
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool("TRAILCAM_FFPROBE_PATH", "ffprobe")
}
