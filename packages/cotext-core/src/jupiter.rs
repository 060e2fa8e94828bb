use crate::error::{Error, PreconditionViolation, Result};
use crate::ids::SiteId;
use crate::operation::Operation;
use crate::request::Request;
use crate::transform::{GotoTransformation, InclusionTransformation};
use crate::vector_time::VectorTime;

/// Which end of a hub link an engine sits on.
///
/// Clients order their own edits first on ties, servers order the client's edits first, so
/// both ends of every link agree on a single order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteRole {
    Client,
    Server,
}

#[derive(Clone, Debug)]
struct PendingOperation {
    operation: Operation,
    /// Local count at generation time; acknowledged once the peer's remote count exceeds it.
    generated_at: u32,
}

/// Jupiter control algorithm for one (document, remote site) pair.
///
/// Not synchronized: every call on one instance must be serialized by the owner.
pub struct Jupiter<T = GotoTransformation>
where
    T: InclusionTransformation,
{
    site_id: SiteId,
    role: SiteRole,
    vector_time: VectorTime,
    pending: Vec<PendingOperation>, // oldest first
    transformation: T,
}

impl Jupiter<GotoTransformation> {
    pub fn new(site_id: SiteId, role: SiteRole) -> Self {
        Self::with_transformation(site_id, role, GotoTransformation)
    }
}

impl<T> Jupiter<T>
where
    T: InclusionTransformation,
{
    pub fn with_transformation(site_id: SiteId, role: SiteRole, transformation: T) -> Self {
        Self {
            site_id,
            role,
            vector_time: VectorTime::default(),
            pending: Vec::new(),
            transformation,
        }
    }

    /// Wraps a locally generated operation for the peer and queues it until acknowledged.
    pub fn generate_request(&mut self, op: Operation) -> Request {
        let request = Request::new(self.site_id.clone(), self.vector_time, op.clone());
        let generated_at = self.vector_time.local();
        match op {
            Operation::Split { first, second } => {
                self.pending.push(PendingOperation {
                    operation: *first,
                    generated_at,
                });
                self.pending.push(PendingOperation {
                    operation: *second,
                    generated_at,
                });
            }
            operation => self.pending.push(PendingOperation {
                operation,
                generated_at,
            }),
        }
        self.vector_time.increment_local();
        tracing::trace!(
            site = %self.site_id,
            time = %self.vector_time,
            pending = self.pending.len(),
            "generated request"
        );
        request
    }

    /// Incorporates a request from the peer and returns its operation transformed against
    /// every local operation the peer had not seen yet.
    pub fn receive_request(&mut self, request: Request) -> Result<Operation> {
        self.check_preconditions(&request.timestamp)?;
        self.discard_acknowledged(request.timestamp.remote());

        let incoming_priority = !self.is_client_side();
        let transformation = &self.transformation;
        let pending = std::mem::take(&mut self.pending);
        let capacity = pending.len();
        let (operation, pending) = pending.into_iter().fold(
            (request.operation, Vec::with_capacity(capacity)),
            |(incoming, mut queue), record| {
                let transformed =
                    transformation.transform(&incoming, &record.operation, incoming_priority);
                queue.push(PendingOperation {
                    operation: transformation.transform(
                        &record.operation,
                        &incoming,
                        !incoming_priority,
                    ),
                    generated_at: record.generated_at,
                });
                (transformed, queue)
            },
        );
        self.pending = pending;
        self.vector_time.increment_remote();
        tracing::trace!(
            site = %self.site_id,
            from = %request.site_id,
            time = %self.vector_time,
            "received request"
        );
        Ok(operation)
    }

    /// Like [`Jupiter::receive_request`] for operations a relay already transformed: the
    /// clock bookkeeping happens, the operation is returned as sent.
    pub fn receive_transformed_request(&mut self, request: Request) -> Result<Operation> {
        self.check_preconditions(&request.timestamp)?;
        self.discard_acknowledged(request.timestamp.remote());
        self.vector_time.increment_remote();
        Ok(request.operation)
    }

    /// Out-of-band acknowledgment: drops pending operations the peer has already received.
    ///
    /// Never transforms anything, and is idempotent for repeated or stale timestamps.
    pub fn acknowledge(&mut self, site_id: &SiteId, timestamp: VectorTime) {
        if timestamp.remote() > self.vector_time.local() {
            tracing::warn!(
                site = %self.site_id,
                from = %site_id,
                acknowledged = timestamp.remote(),
                generated = self.vector_time.local(),
                "ignoring acknowledgment for operations never generated"
            );
            return;
        }
        self.discard_acknowledged(timestamp.remote());
    }

    /// Maps char offsets from the peer's view at `timestamp` into the local view.
    ///
    /// Pending state is left untouched.
    pub fn transform_indices(&self, timestamp: VectorTime, indices: &[usize]) -> Result<Vec<usize>> {
        self.check_preconditions(&timestamp)?;
        let priority = !self.is_client_side();
        let unacknowledged = self
            .pending
            .iter()
            .filter(|record| record.generated_at >= timestamp.remote());
        let mut result = indices.to_vec();
        for record in unacknowledged {
            for index in result.iter_mut() {
                *index = self
                    .transformation
                    .transform_index(*index, &record.operation, priority);
            }
        }
        Ok(result)
    }

    pub fn undo(&mut self) -> Result<Operation> {
        Err(Error::UnsupportedOperation("undo"))
    }

    pub fn redo(&mut self) -> Result<Operation> {
        Err(Error::UnsupportedOperation("redo"))
    }

    /// Snapshot of the current clock.
    pub fn timestamp(&self) -> VectorTime {
        self.vector_time
    }

    pub fn is_client_side(&self) -> bool {
        self.role == SiteRole::Client
    }

    pub fn role(&self) -> SiteRole {
        self.role
    }

    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    /// Number of queued operations not yet known to be incorporated by the peer.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Back to the initial state, used after both ends resynchronized the document.
    pub fn reset(&mut self) {
        self.vector_time = VectorTime::default();
        self.pending.clear();
    }

    fn check_preconditions(&self, timestamp: &VectorTime) -> Result<()> {
        let violation = if let Some(oldest) = self
            .pending
            .first()
            .filter(|oldest| timestamp.remote() < oldest.generated_at)
        {
            Some(PreconditionViolation::AcknowledgedUnsent {
                acknowledged: timestamp.remote(),
                oldest_pending: oldest.generated_at,
            })
        } else if timestamp.remote() > self.vector_time.local() {
            Some(PreconditionViolation::RemoteAhead {
                acknowledged: timestamp.remote(),
                generated: self.vector_time.local(),
            })
        } else if timestamp.local() != self.vector_time.remote() {
            Some(PreconditionViolation::ReceivedCountMismatch {
                sent: timestamp.local(),
                received: self.vector_time.remote(),
            })
        } else {
            None
        };

        match violation {
            Some(violation) => {
                tracing::warn!(
                    site = %self.site_id,
                    time = %self.vector_time,
                    remote_time = %timestamp,
                    error = %violation,
                    "jupiter precondition violated"
                );
                Err(violation.into())
            }
            None => Ok(()),
        }
    }

    fn discard_acknowledged(&mut self, acknowledged: u32) {
        self.pending.retain(|record| record.generated_at >= acknowledged);
    }
}
