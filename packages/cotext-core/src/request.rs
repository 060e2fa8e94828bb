use crate::ids::SiteId;
use crate::operation::Operation;
use crate::vector_time::VectorTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unit exchanged between two Jupiter engines: who sent it, the sender's clock when it was
/// generated, and the edit itself.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Request {
    pub site_id: SiteId,
    pub timestamp: VectorTime,
    pub operation: Operation,
}

impl Request {
    pub fn new(site_id: SiteId, timestamp: VectorTime, operation: Operation) -> Self {
        Self {
            site_id,
            timestamp,
            operation,
        }
    }
}
