use std::collections::BTreeSet;

use cotext_core::DocumentId;
use parking_lot::Mutex;

use crate::activity::ChecksumActivity;
use crate::document::SessionDocument;

/// Outcome of comparing a host checksum with the local copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    Inconsistent,
    /// Local edits are still in flight, so the host state cannot be compared yet.
    Deferred,
}

/// Client-side record of documents known to have diverged from the host.
#[derive(Debug, Default)]
pub struct ConsistencyWatchdog {
    inconsistent: Mutex<BTreeSet<DocumentId>>,
}

impl ConsistencyWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify(&self, document: &SessionDocument, remote: &ChecksumActivity) -> Verdict {
        let Some(local) = document.settled_checksum() else {
            tracing::trace!(document = %remote.document, "checksum deferred, local edits in flight");
            return Verdict::Deferred;
        };
        if local == remote.checksum {
            if self.inconsistent.lock().remove(&remote.document) {
                tracing::info!(document = %remote.document, "document consistent again");
            }
            Verdict::Consistent
        } else {
            tracing::warn!(
                document = %remote.document,
                local_len = local.length,
                remote_len = remote.checksum.length,
                "checksum mismatch"
            );
            self.inconsistent.lock().insert(remote.document.clone());
            Verdict::Inconsistent
        }
    }

    pub fn mark_inconsistent(&self, document: DocumentId) {
        self.inconsistent.lock().insert(document);
    }

    pub fn clear(&self, document: &DocumentId) {
        self.inconsistent.lock().remove(document);
    }

    pub fn inconsistencies(&self) -> Vec<DocumentId> {
        self.inconsistent.lock().iter().cloned().collect()
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistent.lock().is_empty()
    }
}
