//! In-memory guard enforcing at-most-one terminal transition per upload
//! (component D: "Concurrent completes for the same upload ID are not
//! protected in the source; implementations should enforce at-most-one
//! terminal transition per upload ID").
//!
//! The registry only tracks the STAGING -> {FINALIZED, ABORTED} edge; the
//! filesystem (via [`crate::ArtifactStore`]) remains the source of truth for
//! whether a staging file exists at all.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use cache_domain::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Staging,
    Finalized,
    Aborted,
}

/// Tracks upload state across the lifetime of one process. Upload ids are
/// server-chosen UUIDs, so a single registry can be shared across every
/// cache without key collisions.
#[derive(Default)]
pub struct UploadRegistry {
    uploads: Mutex<HashMap<Uuid, UploadState>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` has begun staging.
    pub fn begin(&self, id: Uuid) {
        self.uploads.lock().insert(id, UploadState::Staging);
    }

    /// Transition `id` from STAGING to FINALIZED. Fails if `id` is unknown
    /// or already in a terminal state.
    pub fn try_complete(&self, id: Uuid) -> Result<()> {
        self.transition(id, UploadState::Finalized)
    }

    /// Transition `id` from STAGING to ABORTED. Fails if `id` is unknown or
    /// already in a terminal state.
    pub fn try_abort(&self, id: Uuid) -> Result<()> {
        self.transition(id, UploadState::Aborted)
    }

    fn transition(&self, id: Uuid, to: UploadState) -> Result<()> {
        let mut uploads = self.uploads.lock();
        match uploads.get(&id) {
            Some(UploadState::Staging) => {
                uploads.insert(id, to);
                Ok(())
            }
            Some(_) => Err(Error::BadRequest(format!(
                "upload {id} already reached a terminal state"
            ))),
            None => Err(Error::BadRequest(format!("unknown upload {id}"))),
        }
    }
}
