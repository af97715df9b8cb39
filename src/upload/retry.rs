// Bounded immediate-retry wrapper
//
// Transient network and server errors are common enough that one failure
// should not quarantine a recording, but repeated immediate retries beyond
// a handful add nothing without backoff. Real backoff belongs to the
// recovery scheduler, which works at batch grain.

use crate::api::UploadClient;
use crate::constants::UPLOAD_ATTEMPTS;
use crate::error::Result;

use super::job::UploadJob;

/// Attempt a job's upload up to the fixed bound, with no inter-attempt
/// delay (connectivity is already held up by the caller). On exhaustion the
/// job is quarantined and Ok is returned; only a failure of the quarantine
/// move itself propagates.
pub fn upload_with_retries(client: &dyn UploadClient, job: &mut UploadJob) -> Result<()> {
    let what = job.describe();
    log::info!("uploading: {}", what);
    for remaining in (0..UPLOAD_ATTEMPTS).rev() {
        match job.upload(client) {
            Ok(()) => {
                log::info!("upload complete: {}", what);
                return Ok(());
            }
            Err(e) => {
                log::warn!("upload failed: {}", e);
                if remaining > 0 {
                    log::info!("trying {} more times", remaining);
                }
            }
        }
    }
    log::warn!(
        "upload failed multiple times, moving {} to the failed uploads folder",
        what
    );
    job.quarantine()
}
