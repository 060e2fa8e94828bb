use crate::error::Result;
use crate::ids::SiteId;
use crate::jupiter::{Jupiter, SiteRole};
use crate::operation::Operation;
use crate::request::Request;
use crate::vector_time::VectorTime;

/// Client end of a hub topology: one Jupiter engine towards the host.
pub struct ConcurrentDocumentClient {
    host: SiteId,
    jupiter: Jupiter,
}

impl ConcurrentDocumentClient {
    pub fn new(local: SiteId, host: SiteId) -> Self {
        Self {
            host,
            jupiter: Jupiter::new(local, SiteRole::Client),
        }
    }

    pub fn host(&self) -> &SiteId {
        &self.host
    }

    /// Request to send to the host for an edit already applied locally.
    pub fn apply_local(&mut self, op: Operation) -> Request {
        self.jupiter.generate_request(op)
    }

    /// Transforms a request from the host into an operation to apply locally.
    pub fn receive(&mut self, request: Request) -> Result<Operation> {
        self.jupiter.receive_request(request)
    }

    /// Host confirmed receipt of our requests up to `timestamp.remote()`.
    pub fn acknowledge(&mut self, timestamp: VectorTime) {
        self.jupiter.acknowledge(&self.host, timestamp);
    }

    pub fn transform_indices(&self, timestamp: VectorTime, indices: &[usize]) -> Result<Vec<usize>> {
        self.jupiter.transform_indices(timestamp, indices)
    }

    pub fn timestamp(&self) -> VectorTime {
        self.jupiter.timestamp()
    }

    pub fn pending_len(&self) -> usize {
        self.jupiter.pending_len()
    }

    pub fn reset(&mut self) {
        self.jupiter.reset();
    }
}
