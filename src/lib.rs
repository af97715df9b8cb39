// Trailcam Uploader - Library Entry Point
//
// Watches a working directory for recorded media, delivers it to the remote
// ingestion API, and quarantines what will not go through for later
// recovery. The binary in main.rs wires the collaborators together.

pub mod api;
pub mod classify;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod error;
pub mod keepalive;
pub mod timestamp;
pub mod tools;
pub mod transcode;
pub mod upload;
pub mod watch;
pub mod worker;

pub use error::{Result, UploaderError};
