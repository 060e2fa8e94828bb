use std::fmt;

use cotext_core::{DocumentChecksum, DocumentId, Request, SiteId, VectorTime};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of one stop request, shared by the lock request, its acknowledgment, and the
/// start handle it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StopId(pub Uuid);

impl StopId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StopId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopKind {
    LockRequest,
    UnlockRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopState {
    Initiated,
    Acknowledged,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StopActivity {
    pub id: StopId,
    /// User that asked for the stop and holds the start handle.
    pub initiator: SiteId,
    /// User whose editing is stopped.
    pub affected: SiteId,
    pub kind: StopKind,
    pub state: StopState,
}

impl StopActivity {
    pub fn lock_request(id: StopId, initiator: SiteId, affected: SiteId) -> Self {
        Self {
            id,
            initiator,
            affected,
            kind: StopKind::LockRequest,
            state: StopState::Initiated,
        }
    }

    pub fn unlock_request(id: StopId, initiator: SiteId, affected: SiteId) -> Self {
        Self {
            id,
            initiator,
            affected,
            kind: StopKind::UnlockRequest,
            state: StopState::Initiated,
        }
    }

    pub fn acknowledged(&self) -> Self {
        Self {
            state: StopState::Acknowledged,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChecksumActivity {
    pub document: DocumentId,
    pub checksum: DocumentChecksum,
}

/// Everything a session exchanges with its peers.
///
/// Edits, acknowledgments and stop messages travel through one ordered channel per peer:
/// a stop must never overtake an edit sent before it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Activity {
    Jupiter {
        document: DocumentId,
        request: Request,
    },
    /// Host confirms which client requests it has incorporated.
    Acknowledge {
        document: DocumentId,
        timestamp: VectorTime,
    },
    Checksum(ChecksumActivity),
    /// Client reports documents whose checksum disagreed with the host's.
    ChecksumError {
        documents: Vec<DocumentId>,
    },
    Stop(StopActivity),
    /// Host content replacing a client's copy during recovery.
    Resync {
        document: DocumentId,
        content: String,
    },
}
