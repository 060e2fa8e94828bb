use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::SiteId;
use crate::jupiter::{Jupiter, SiteRole};
use crate::operation::Operation;
use crate::request::Request;
use crate::vector_time::VectorTime;

/// A request addressed to one client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub target: SiteId,
    pub request: Request,
}

/// Result of relaying one client request through the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relay {
    /// Operation to apply to the host's copy of the document.
    pub operation: Operation,
    /// The same edit, re-expressed for every other client.
    pub outgoing: Vec<Outgoing>,
    /// Host clock towards the sender after incorporating its request.
    pub acknowledgment: VectorTime,
}

/// Host end of a hub topology: one Server-role engine per connected client.
///
/// Every client edit is transformed once on its own link, applied at the host, and then
/// regenerated on each other link, so clients never transform against each other directly.
pub struct ConcurrentDocumentServer {
    host: SiteId,
    clients: BTreeMap<SiteId, Jupiter>,
}

impl ConcurrentDocumentServer {
    pub fn new(host: SiteId) -> Self {
        Self {
            host,
            clients: BTreeMap::new(),
        }
    }

    pub fn host(&self) -> &SiteId {
        &self.host
    }

    /// Starts a fresh link; a client that is already connected keeps its engine.
    pub fn add_client(&mut self, client: SiteId) {
        let host = self.host.clone();
        self.clients
            .entry(client)
            .or_insert_with(|| Jupiter::new(host, SiteRole::Server));
    }

    pub fn remove_client(&mut self, client: &SiteId) -> bool {
        self.clients.remove(client).is_some()
    }

    pub fn clients(&self) -> impl Iterator<Item = &SiteId> {
        self.clients.keys()
    }

    /// Fans an edit the host made locally out to every client.
    pub fn apply_local(&mut self, op: Operation) -> Vec<Outgoing> {
        self.broadcast(op, None)
    }

    pub fn receive(&mut self, request: Request) -> Result<Relay> {
        self.receive_with(request, |_| Ok(()))
    }

    /// Like [`receive`](Self::receive), but runs `apply` on the transformed operation before
    /// any other client's engine is touched. When `apply` fails nothing is relayed and the
    /// other links keep their clocks.
    pub fn receive_with<F>(&mut self, request: Request, apply: F) -> Result<Relay>
    where
        F: FnOnce(&Operation) -> Result<()>,
    {
        let sender = request.site_id.clone();
        let jupiter = self
            .clients
            .get_mut(&sender)
            .ok_or_else(|| Error::UnknownSite(sender.clone()))?;
        let operation = jupiter.receive_request(request)?;
        let acknowledgment = jupiter.timestamp();
        if let Err(e) = apply(&operation) {
            tracing::warn!(client = %sender, error = %e, "relayed operation rejected, not forwarding");
            return Err(e);
        }
        let outgoing = self.broadcast(operation.clone(), Some(&sender));
        Ok(Relay {
            operation,
            outgoing,
            acknowledgment,
        })
    }

    pub fn timestamp(&self, client: &SiteId) -> Option<VectorTime> {
        self.clients.get(client).map(Jupiter::timestamp)
    }

    pub fn pending_len(&self, client: &SiteId) -> Option<usize> {
        self.clients.get(client).map(Jupiter::pending_len)
    }

    /// Resets every link after the document was resynchronized.
    pub fn reset(&mut self) {
        for jupiter in self.clients.values_mut() {
            jupiter.reset();
        }
    }

    fn broadcast(&mut self, op: Operation, except: Option<&SiteId>) -> Vec<Outgoing> {
        self.clients
            .iter_mut()
            .filter(|(client, _)| Some(*client) != except)
            .map(|(client, jupiter)| Outgoing {
                target: client.clone(),
                request: jupiter.generate_request(op.clone()),
            })
            .collect()
    }
}
