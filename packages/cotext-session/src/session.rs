use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use cotext_core::{DocumentId, Operation, Outgoing, SiteId};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::activity::Activity;
use crate::config::SessionConfig;
use crate::document::SessionDocument;
use crate::error::{Error, Result};
use crate::gate::EditorGate;
use crate::recovery;
use crate::sink::ActivitySink;
use crate::stop_manager::StopManager;
use crate::watchdog::ConsistencyWatchdog;

/// What an inbound activity did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A remote edit was applied to the local text.
    Applied {
        document: DocumentId,
        operation: Operation,
    },
    /// Host only: a client asked for these documents to be recovered. Run
    /// [`Session::recover`] outside the delivery path.
    RecoveryRequested {
        from: SiteId,
        documents: Vec<DocumentId>,
    },
    Handled,
}

/// One participant's view of a hub session: its documents, its stop manager, and the single
/// outbound channel everything is dispatched through.
pub struct Session {
    local: SiteId,
    host: SiteId,
    config: SessionConfig,
    sink: Arc<dyn ActivitySink>,
    gate: Arc<dyn EditorGate>,
    stop_manager: StopManager,
    watchdog: ConsistencyWatchdog,
    documents: RwLock<BTreeMap<DocumentId, Arc<SessionDocument>>>,
    participants: RwLock<BTreeSet<SiteId>>,
    // Read for every local edit, written while a stop is being acknowledged, so an edit that
    // passed the gate check is always sent before the acknowledgment.
    edits: RwLock<()>,
}

impl Session {
    pub fn new(
        local: SiteId,
        host: SiteId,
        sink: Arc<dyn ActivitySink>,
        gate: Arc<dyn EditorGate>,
        config: SessionConfig,
    ) -> Self {
        let stop_manager = StopManager::new(
            local.clone(),
            sink.clone(),
            gate.clone(),
            config.stop.clone(),
        );
        Self {
            local,
            host,
            config,
            sink,
            gate,
            stop_manager,
            watchdog: ConsistencyWatchdog::new(),
            documents: RwLock::new(BTreeMap::new()),
            participants: RwLock::new(BTreeSet::new()),
            edits: RwLock::new(()),
        }
    }

    pub fn local(&self) -> &SiteId {
        &self.local
    }

    pub fn host(&self) -> &SiteId {
        &self.host
    }

    pub fn is_host(&self) -> bool {
        self.local == self.host
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stop_manager(&self) -> &StopManager {
        &self.stop_manager
    }

    pub fn watchdog(&self) -> &ConsistencyWatchdog {
        &self.watchdog
    }

    pub(crate) fn sink(&self) -> &Arc<dyn ActivitySink> {
        &self.sink
    }

    /// Host only: admits a client to every open document.
    pub fn add_participant(&self, user: SiteId) -> Result<()> {
        if !self.is_host() {
            return Err(Error::NotHost("add participants"));
        }
        for document in self.documents.read().values() {
            document.add_client(user.clone());
        }
        tracing::info!(user = %user, "participant joined");
        self.participants.write().insert(user);
        Ok(())
    }

    pub fn remove_participant(&self, user: &SiteId) -> bool {
        for document in self.documents.read().values() {
            document.remove_client(user);
        }
        let removed = self.participants.write().remove(user);
        if removed {
            tracing::info!(user = %user, "participant left");
        }
        removed
    }

    /// Clients known to the host, excluding the host itself.
    pub fn participants(&self) -> Vec<SiteId> {
        self.participants.read().iter().cloned().collect()
    }

    /// Opens `id` with `content`; returns the existing document if already open.
    pub fn open_document(&self, id: DocumentId, content: &str) -> Arc<SessionDocument> {
        let mut documents = self.documents.write();
        if let Some(existing) = documents.get(&id) {
            return existing.clone();
        }
        let document = if self.is_host() {
            SessionDocument::host(
                id.clone(),
                self.local.clone(),
                self.participants(),
                content,
                self.sink.clone(),
                self.gate.clone(),
            )
        } else {
            SessionDocument::client(
                id.clone(),
                self.local.clone(),
                self.host.clone(),
                content,
                self.sink.clone(),
                self.gate.clone(),
            )
        };
        tracing::debug!(document = %id, "document opened");
        let document = Arc::new(document);
        documents.insert(id, document.clone());
        document
    }

    pub fn document(&self, id: &DocumentId) -> Option<Arc<SessionDocument>> {
        self.documents.read().get(id).cloned()
    }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.documents.read().keys().cloned().collect()
    }

    fn require_document(&self, id: &DocumentId) -> Result<Arc<SessionDocument>> {
        self.document(id)
            .ok_or_else(|| Error::UnknownDocument(id.clone()))
    }

    /// Applies a local edit and sends it; fails with [`Error::Locked`] while stopped.
    pub fn apply_local_edit(&self, document: &DocumentId, op: Operation) -> Result<Vec<Outgoing>> {
        let document = self.require_document(document)?;
        let _edit = self.edits.read();
        document.apply_local_edit(op)
    }

    /// Routes one activity received from `from`.
    pub fn handle_activity(&self, from: &SiteId, activity: Activity) -> Result<Inbound> {
        match activity {
            Activity::Jupiter { document, request } => {
                let operation = self.require_document(&document)?.incoming_request(request)?;
                Ok(Inbound::Applied {
                    document,
                    operation,
                })
            }
            Activity::Acknowledge {
                document,
                timestamp,
            } => {
                self.require_document(&document)?.acknowledge(timestamp);
                Ok(Inbound::Handled)
            }
            Activity::Checksum(checksum) => {
                if self.is_host() {
                    tracing::warn!(from = %from, "host received a checksum, ignoring");
                    return Ok(Inbound::Handled);
                }
                match self.document(&checksum.document) {
                    Some(document) => {
                        self.watchdog.verify(&document, &checksum);
                    }
                    None => {
                        tracing::warn!(document = %checksum.document, "checksum for a document not open here");
                        self.watchdog.mark_inconsistent(checksum.document);
                    }
                }
                Ok(Inbound::Handled)
            }
            Activity::ChecksumError { documents } => {
                if !self.is_host() {
                    tracing::warn!(from = %from, "client received a checksum error, ignoring");
                    return Ok(Inbound::Handled);
                }
                tracing::warn!(from = %from, documents = documents.len(), "recovery requested");
                Ok(Inbound::RecoveryRequested {
                    from: from.clone(),
                    documents,
                })
            }
            Activity::Stop(stop) => {
                let _edits = self.edits.write();
                self.stop_manager.handle_activity(stop);
                Ok(Inbound::Handled)
            }
            Activity::Resync { document, content } => {
                match self.document(&document) {
                    Some(existing) => existing.resync(&content),
                    None => {
                        self.open_document(document.clone(), &content);
                    }
                }
                self.watchdog.clear(&document);
                Ok(Inbound::Handled)
            }
        }
    }

    /// Host only: sends the checksum of every open document to every participant.
    pub fn broadcast_checksums(&self) -> Result<usize> {
        if !self.is_host() {
            return Err(Error::NotHost("broadcast checksums"));
        }
        let participants = self.participants();
        let documents: Vec<_> = self.documents.read().values().cloned().collect();
        for document in &documents {
            document.broadcast_checksum(&participants);
        }
        tracing::trace!(documents = documents.len(), "checksums broadcast");
        Ok(documents.len())
    }

    /// Client only: asks the host to recover every document the watchdog flagged. Returns
    /// whether a request was sent.
    pub fn request_recovery(&self) -> Result<bool> {
        if self.is_host() {
            return Err(Error::NotClient("request recovery"));
        }
        let documents = self.watchdog.inconsistencies();
        if documents.is_empty() {
            return Ok(false);
        }
        self.sink
            .dispatch(&self.host, Activity::ChecksumError { documents });
        Ok(true)
    }

    /// Host only: stops everyone, pushes the host's content for `documents`, and restarts.
    pub async fn recover(&self, documents: &[DocumentId]) -> Result<()> {
        recovery::recover(self, documents).await
    }

    /// Blocks until every local edit that already passed the gate has been sent.
    pub(crate) fn drain_local_edits(&self) {
        drop(self.edits.write());
    }

    /// Host only: broadcasts checksums every `watchdog.interval` until the session is dropped.
    pub fn spawn_watchdog(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        if !self.is_host() {
            return Err(Error::NotHost("run the checksum watchdog"));
        }
        let session: Weak<Self> = Arc::downgrade(self);
        let period = self.config.watchdog.interval;
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(e) = session.broadcast_checksums() {
                    tracing::warn!(error = %e, "checksum broadcast failed");
                }
            }
        }))
    }
}
