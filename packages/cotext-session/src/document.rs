use std::sync::Arc;

use cotext_core::{
    ConcurrentDocumentClient, ConcurrentDocumentServer, DocumentChecksum, DocumentId, Operation,
    Outgoing, Request, SiteId, TextDocument, VectorTime,
};
use parking_lot::Mutex;

use crate::activity::{Activity, ChecksumActivity};
use crate::error::{Error, Result};
use crate::gate::EditorGate;
use crate::sink::ActivitySink;

enum Engine {
    Client(ConcurrentDocumentClient),
    Host(ConcurrentDocumentServer),
}

struct DocumentState {
    text: TextDocument,
    engine: Engine,
}

/// One shared document at one site: its text plus the Jupiter engine(s) that keep it in sync.
///
/// Every operation takes the document lock for its whole duration, including dispatching the
/// activities it produces, so per-peer send order always matches generation order.
pub struct SessionDocument {
    id: DocumentId,
    local: SiteId,
    sink: Arc<dyn ActivitySink>,
    gate: Arc<dyn EditorGate>,
    state: Mutex<DocumentState>,
}

impl SessionDocument {
    pub fn client(
        id: DocumentId,
        local: SiteId,
        host: SiteId,
        content: &str,
        sink: Arc<dyn ActivitySink>,
        gate: Arc<dyn EditorGate>,
    ) -> Self {
        Self {
            id,
            local: local.clone(),
            sink,
            gate,
            state: Mutex::new(DocumentState {
                text: TextDocument::new(content),
                engine: Engine::Client(ConcurrentDocumentClient::new(local, host)),
            }),
        }
    }

    pub fn host<I>(
        id: DocumentId,
        host: SiteId,
        clients: I,
        content: &str,
        sink: Arc<dyn ActivitySink>,
        gate: Arc<dyn EditorGate>,
    ) -> Self
    where
        I: IntoIterator<Item = SiteId>,
    {
        let mut server = ConcurrentDocumentServer::new(host.clone());
        for client in clients {
            server.add_client(client);
        }
        Self {
            id,
            local: host,
            sink,
            gate,
            state: Mutex::new(DocumentState {
                text: TextDocument::new(content),
                engine: Engine::Host(server),
            }),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn local(&self) -> &SiteId {
        &self.local
    }

    pub fn is_host(&self) -> bool {
        matches!(self.state.lock().engine, Engine::Host(_))
    }

    /// Applies an edit made at this site and sends it to the peers.
    ///
    /// Fails with [`Error::Locked`] while local editing is stopped.
    pub fn apply_local_edit(&self, op: Operation) -> Result<Vec<Outgoing>> {
        if self.gate.is_locked() {
            return Err(Error::Locked);
        }
        let mut state = self.state.lock();
        state.text.apply(&op)?;
        let outgoing = match &mut state.engine {
            Engine::Client(client) => {
                let target = client.host().clone();
                vec![Outgoing {
                    target,
                    request: client.apply_local(op),
                }]
            }
            Engine::Host(server) => server.apply_local(op),
        };
        for out in &outgoing {
            self.dispatch_request(out);
        }
        tracing::trace!(document = %self.id, peers = outgoing.len(), "local edit sent");
        Ok(outgoing)
    }

    /// Integrates a request from a peer, returning the operation applied to the local text.
    ///
    /// At the host this also forwards the edit to the other clients and acknowledges it to the
    /// sender.
    pub fn incoming_request(&self, request: Request) -> Result<Operation> {
        let mut state = self.state.lock();
        let DocumentState { text, engine } = &mut *state;
        match engine {
            Engine::Client(client) => {
                let op = client.receive(request)?;
                text.apply(&op)?;
                Ok(op)
            }
            Engine::Host(server) => {
                let sender = request.site_id.clone();
                let relay = server.receive_with(request, |op| text.apply(op))?;
                for out in &relay.outgoing {
                    self.dispatch_request(out);
                }
                self.sink.dispatch(
                    &sender,
                    Activity::Acknowledge {
                        document: self.id.clone(),
                        timestamp: relay.acknowledgment,
                    },
                );
                Ok(relay.operation)
            }
        }
    }

    /// Lets the client engine discard requests the host has incorporated.
    pub fn acknowledge(&self, timestamp: VectorTime) {
        match &mut self.state.lock().engine {
            Engine::Client(client) => client.acknowledge(timestamp),
            Engine::Host(_) => {
                tracing::warn!(document = %self.id, "host received an acknowledgment, ignoring");
            }
        }
    }

    /// Positions shifted from the state at `timestamp` to the current one, e.g. a remote
    /// caret that travelled alongside a request.
    pub fn transform_indices(&self, timestamp: VectorTime, indices: &[usize]) -> Result<Vec<usize>> {
        match &self.state.lock().engine {
            Engine::Client(client) => Ok(client.transform_indices(timestamp, indices)?),
            Engine::Host(_) => Err(Error::NotClient("transform remote indices")),
        }
    }

    pub fn add_client(&self, client: SiteId) {
        if let Engine::Host(server) = &mut self.state.lock().engine {
            server.add_client(client);
        }
    }

    pub fn remove_client(&self, client: &SiteId) -> bool {
        match &mut self.state.lock().engine {
            Engine::Host(server) => server.remove_client(client),
            Engine::Client(_) => false,
        }
    }

    pub fn content(&self) -> String {
        self.state.lock().text.content()
    }

    pub fn checksum(&self) -> DocumentChecksum {
        self.state.lock().text.checksum()
    }

    /// Local requests not yet known to be incorporated by the host; always 0 at the host.
    pub fn pending_len(&self) -> usize {
        match &self.state.lock().engine {
            Engine::Client(client) => client.pending_len(),
            Engine::Host(_) => 0,
        }
    }

    /// Replaces the text and resets every engine to the zero clock.
    pub fn resync(&self, content: &str) {
        let mut state = self.state.lock();
        state.text.replace(content);
        match &mut state.engine {
            Engine::Client(client) => client.reset(),
            Engine::Host(server) => server.reset(),
        }
        tracing::info!(document = %self.id, len = state.text.len_chars(), "document resynchronized");
    }

    /// Resets every engine to the zero clock keeping the current text, which is returned.
    pub(crate) fn reset_to_current(&self) -> String {
        let mut state = self.state.lock();
        match &mut state.engine {
            Engine::Client(client) => client.reset(),
            Engine::Host(server) => server.reset(),
        }
        state.text.content()
    }

    /// Checksum of the local text, or `None` while local edits are still unknown to the host.
    pub(crate) fn settled_checksum(&self) -> Option<DocumentChecksum> {
        let state = self.state.lock();
        match &state.engine {
            Engine::Client(client) if client.pending_len() > 0 => None,
            _ => Some(state.text.checksum()),
        }
    }

    /// Sends the current checksum to `targets`, ordered after every edit already sent.
    pub(crate) fn broadcast_checksum(&self, targets: &[SiteId]) {
        let state = self.state.lock();
        let activity = ChecksumActivity {
            document: self.id.clone(),
            checksum: state.text.checksum(),
        };
        for target in targets {
            self.sink.dispatch(target, Activity::Checksum(activity.clone()));
        }
    }

    fn dispatch_request(&self, out: &Outgoing) {
        self.sink.dispatch(
            &out.target,
            Activity::Jupiter {
                document: self.id.clone(),
                request: out.request.clone(),
            },
        );
    }
}
