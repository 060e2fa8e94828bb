use thiserror::Error;

use crate::ids::SiteId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionViolation),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("edit out of bounds: {position}+{len} exceeds document length {doc_len}")]
    OutOfBounds {
        position: usize,
        len: usize,
        doc_len: usize,
    },
    #[error("unknown site: {0}")]
    UnknownSite(SiteId),
}

/// The two sites' logical clocks disagree; the peer channel can no longer be trusted.
///
/// Counts are named from the receiving engine's point of view.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionViolation {
    /// #1: the peer acknowledges fewer operations than the oldest one still pending.
    #[error("#1 peer acknowledged {acknowledged} operations but oldest pending was generated at {oldest_pending}")]
    AcknowledgedUnsent {
        acknowledged: u32,
        oldest_pending: u32,
    },
    /// #2: the peer claims to have received more operations than were generated.
    #[error("#2 peer acknowledged {acknowledged} operations but only {generated} were generated")]
    RemoteAhead { acknowledged: u32, generated: u32 },
    /// #3: the peer's count of sent operations differs from the count received here.
    #[error("#3 peer sent {sent} operations but {received} were received")]
    ReceivedCountMismatch { sent: u32, received: u32 },
}

impl PreconditionViolation {
    pub fn kind(&self) -> u8 {
        match self {
            PreconditionViolation::AcknowledgedUnsent { .. } => 1,
            PreconditionViolation::RemoteAhead { .. } => 2,
            PreconditionViolation::ReceivedCountMismatch { .. } => 3,
        }
    }
}

impl Error {
    /// Precondition kind (1..=3) when this is a clock desynchronization.
    pub fn precondition_kind(&self) -> Option<u8> {
        match self {
            Error::Precondition(v) => Some(v.kind()),
            _ => None,
        }
    }
}
