// Daemon configuration
//
// Public settings live in a YAML file (default /etc/trailcam-uploader.yaml).
// Device credentials live beside it in "<stem>-priv.yaml", written by the
// registration tool. A missing credentials file means the device has not
// registered yet.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::DEFAULT_RECORDINGS_DIR;
use crate::error::{Result, UploaderError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub server_url: String,
    pub group: String,
    pub device_name: String,

    /// Directory watched for new recordings.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// host:port probed to decide whether the network link is up. When
    /// absent the link is assumed permanently up.
    #[serde(default)]
    pub probe_address: Option<String>,

    /// Host command invoked to ask the power controller to stay on while
    /// uploads run. Best-effort.
    #[serde(default)]
    pub stay_awake_command: Option<String>,

    /// Host command invoked once the upload queue drains. Best-effort.
    #[serde(default)]
    pub idle_command: Option<String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_RECORDINGS_DIR)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(UploaderError::Config("server-url missing".to_string()));
        }
        if self.group.is_empty() {
            return Err(UploaderError::Config("group missing".to_string()));
        }
        if self.device_name.is_empty() {
            return Err(UploaderError::Config("device-name missing".to_string()));
        }
        Ok(())
    }
}

/// Load and validate the daemon configuration.
pub fn load_config(path: &Path) -> Result<Config> {
    let buf = std::fs::read_to_string(path)?;
    parse_config(&buf)
}

fn parse_config(buf: &str) -> Result<Config> {
    let conf: Config = serde_yaml::from_str(buf)?;
    conf.validate()?;
    Ok(conf)
}

/// Device credentials, written out-of-band by the registration tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceCredentials {
    pub password: String,
}

/// Path of the private credentials file for a given config file:
/// "/etc/trailcam-uploader.yaml" -> "/etc/trailcam-uploader-priv.yaml".
pub fn private_config_path(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trailcam-uploader");
    let name = format!("{}-priv.yaml", stem);
    match config_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Read device credentials. Ok(None) when the file does not exist, which
/// means the device has not been registered yet.
pub fn load_credentials(path: &Path) -> Result<Option<DeviceCredentials>> {
    let buf = match std::fs::read_to_string(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let creds: DeviceCredentials = serde_yaml::from_str(&buf)?;
    Ok(Some(creds))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
server-url: https://api.example.org
group: ridgeline
device-name: cam-07
directory: /data/recordings
";

    #[test]
    fn test_parse_valid() {
        let conf = parse_config(VALID).unwrap();
        assert_eq!(conf.server_url, "https://api.example.org");
        assert_eq!(conf.group, "ridgeline");
        assert_eq!(conf.device_name, "cam-07");
        assert_eq!(conf.directory, PathBuf::from("/data/recordings"));
        assert!(conf.probe_address.is_none());
    }

    #[test]
    fn test_directory_defaults() {
        let conf = parse_config(
            "server-url: https://api.example.org\ngroup: g\ndevice-name: d\n",
        )
        .unwrap();
        assert_eq!(conf.directory, PathBuf::from(DEFAULT_RECORDINGS_DIR));
    }

    #[test]
    fn test_missing_fields_rejected() {
        for broken in [
            "group: g\ndevice-name: d\n",
            "server-url: u\ndevice-name: d\n",
            "server-url: u\ngroup: g\n",
            "server-url: \"\"\ngroup: g\ndevice-name: d\n",
        ] {
            assert!(parse_config(broken).is_err(), "accepted: {}", broken);
        }
    }

    #[test]
    fn test_private_config_path() {
        assert_eq!(
            private_config_path(Path::new("/etc/trailcam-uploader.yaml")),
            PathBuf::from("/etc/trailcam-uploader-priv.yaml")
        );
        assert_eq!(
            private_config_path(Path::new("uploader.yaml")),
            PathBuf::from("uploader-priv.yaml")
        );
    }

    #[test]
    fn test_credentials_missing_file_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("uploader-priv.yaml");
        assert!(load_credentials(&path).unwrap().is_none());

        std::fs::write(&path, "password: hunter2\n").unwrap();
        let creds = load_credentials(&path).unwrap().unwrap();
        assert_eq!(creds.password, "hunter2");
    }
}
