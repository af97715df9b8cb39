// Upload orchestration
//
// The per-file job lifecycle and the policies wrapped around it: bounded
// immediate retries for fresh files, batch recovery with backoff for
// quarantined ones.

pub mod job;
pub mod recovery;
pub mod retry;
pub mod sidecar;

pub use job::{Phase, UploadJob};
pub use recovery::RecoveryScheduler;
