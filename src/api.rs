// Ingestion API client
//
// The upload path only needs three calls: upload a recording, add a track,
// tag a track. Authentication is a device-name + password exchange for a
// bearer token; a 401 mid-run means the token expired and is retried once
// with a fresh token.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::classify::MediaKind;
use crate::config::{Config, DeviceCredentials};
use crate::constants::API_TIMEOUT;
use crate::error::{Result, UploaderError};

#[derive(Debug, Clone, Copy)]
pub struct TrackResponse {
    pub track_id: i64,
    pub algorithm_id: i64,
}

/// The remote ingestion API, as seen by upload jobs.
pub trait UploadClient {
    /// Upload a media file. Returns the recording id assigned by the server.
    fn upload_media(
        &self,
        kind: MediaKind,
        timestamp: Option<DateTime<Local>>,
        duration_seconds: i64,
        file: &Path,
    ) -> Result<i64>;

    /// Submit one detected track for a recording.
    fn add_track(&self, recording_id: i64, track: &Value, algorithm: &Value)
        -> Result<TrackResponse>;

    /// Submit the tag/classification record for an already-submitted track.
    fn add_track_tag(
        &self,
        recording_id: i64,
        track_id: i64,
        confident: bool,
        tag: &Value,
        model_name: &str,
    ) -> Result<()>;
}

/// Build the JSON `data` field accompanying a media upload.
pub fn media_params(
    kind: MediaKind,
    timestamp: Option<DateTime<Local>>,
    duration_seconds: i64,
) -> Value {
    let mut data = json!({ "type": kind.api_name() });
    if let Some(ts) = timestamp {
        data["recordingDateTime"] = json!(ts.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if duration_seconds > 0 {
        data["duration"] = json!(duration_seconds);
    }
    data
}

pub struct HttpUploadClient {
    server_url: String,
    device_name: String,
    password: String,
    client: reqwest::blocking::Client,
    token: Mutex<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingResponse {
    recording_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTrackResponse {
    track_id: i64,
    #[serde(default)]
    algorithm_id: i64,
}

impl HttpUploadClient {
    /// Create a client and obtain a fresh bearer token.
    pub fn new(conf: &Config, creds: &DeviceCredentials) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(API_TIMEOUT)
            .build()?;
        let api = HttpUploadClient {
            server_url: conf.server_url.trim_end_matches('/').to_string(),
            device_name: conf.device_name.clone(),
            password: creds.password.clone(),
            client,
            token: Mutex::new(String::new()),
        };
        api.authenticate()?;
        Ok(api)
    }

    fn authenticate(&self) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/authenticate_device", self.server_url))
            .json(&json!({
                "devicename": self.device_name,
                "password": self.password,
            }))
            .send()?;
        let body: TokenResponse = resp.json()?;
        if !body.success {
            let message = body
                .messages
                .first()
                .map(String::as_str)
                .unwrap_or("unknown");
            return Err(UploaderError::Api(format!(
                "failed getting new token: {}",
                message
            )));
        }
        *self.token.lock().unwrap() = body.token;
        Ok(())
    }

    // Run a request with the current token; on 401 re-authenticate once and
    // replay. The closure builds a fresh request each time because multipart
    // bodies cannot be reused.
    fn with_auth<F>(&self, send: F) -> Result<reqwest::blocking::Response>
    where
        F: Fn(&str) -> Result<reqwest::blocking::Response>,
    {
        let token = self.token.lock().unwrap().clone();
        let resp = send(&token)?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            log::info!("token rejected, re-authenticating");
            self.authenticate()?;
            let token = self.token.lock().unwrap().clone();
            return send(&token);
        }
        Ok(resp)
    }
}

// Check the HTTP status and decode the JSON body.
fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::blocking::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        log::warn!("status code: {}, body: {}", status, body);
        return Err(UploaderError::Api(format!("non-success status {}", status)));
    }
    Ok(resp.json()?)
}

impl UploadClient for HttpUploadClient {
    fn upload_media(
        &self,
        kind: MediaKind,
        timestamp: Option<DateTime<Local>>,
        duration_seconds: i64,
        file: &Path,
    ) -> Result<i64> {
        let data = media_params(kind, timestamp, duration_seconds).to_string();
        let url = format!("{}/api/v1/recordings", self.server_url);
        let resp = self.with_auth(|token| {
            let form = reqwest::blocking::multipart::Form::new()
                .text("data", data.clone())
                .file("file", file)?;
            Ok(self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, token)
                .multipart(form)
                .send()?)
        })?;
        let body: RecordingResponse = decode(resp)?;
        Ok(body.recording_id)
    }

    fn add_track(
        &self,
        recording_id: i64,
        track: &Value,
        algorithm: &Value,
    ) -> Result<TrackResponse> {
        let url = format!("{}/api/v1/recordings/{}/tracks", self.server_url, recording_id);
        let payload = json!({ "data": track, "algorithm": algorithm });
        let resp = self.with_auth(|token| {
            Ok(self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, token)
                .json(&payload)
                .send()?)
        })?;
        let body: NewTrackResponse = decode(resp)?;
        Ok(TrackResponse {
            track_id: body.track_id,
            algorithm_id: body.algorithm_id,
        })
    }

    fn add_track_tag(
        &self,
        recording_id: i64,
        track_id: i64,
        confident: bool,
        tag: &Value,
        model_name: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/api/v1/recordings/{}/tracks/{}/tags",
            self.server_url, recording_id, track_id
        );
        let payload = json!({
            "confident": confident,
            "data": tag,
            "model": { "name": model_name },
        });
        let resp = self.with_auth(|token| {
            Ok(self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, token)
                .json(&payload)
                .send()?)
        })?;
        decode::<Value>(resp)?;
        Ok(())
    }
}
