#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cotext_core::{DocumentId, SiteId};
use cotext_session::{
    Activity, ActivitySink, Inbound, LocalEditGate, Session, SessionConfig, StopKind,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Outbound channel of one site; counts activities until the receiving router has handled
/// them.
pub struct Wire {
    tx: mpsc::UnboundedSender<(SiteId, Activity)>,
    in_flight: Arc<AtomicUsize>,
    log: Mutex<Vec<(SiteId, Activity)>>,
}

impl ActivitySink for Wire {
    fn dispatch(&self, target: &SiteId, activity: Activity) {
        self.log.lock().push((target.clone(), activity.clone()));
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send((target.clone(), activity)).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Wire {
    pub fn sent(&self) -> Vec<(SiteId, Activity)> {
        self.log.lock().clone()
    }

    pub fn count_stops(&self, kind: StopKind) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(_, activity)| matches!(activity, Activity::Stop(stop) if stop.kind == kind))
            .count()
    }
}

pub struct Node {
    pub session: Arc<Session>,
    pub gate: Arc<LocalEditGate>,
    pub wire: Arc<Wire>,
}

/// Host plus clients wired together by one router task per site.
pub struct Network {
    nodes: BTreeMap<SiteId, Node>,
    in_flight: Arc<AtomicUsize>,
    silenced: Arc<Mutex<BTreeSet<SiteId>>>,
    errors: Arc<Mutex<Vec<String>>>,
    inbound: Arc<Mutex<Vec<(SiteId, Inbound)>>>,
}

impl Network {
    /// Must be called from inside a tokio runtime.
    pub fn start(host: &str, clients: &[&str], config: SessionConfig) -> Self {
        init_tracing();
        let host_id = SiteId::new(host);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let silenced = Arc::new(Mutex::new(BTreeSet::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let inbound = Arc::new(Mutex::new(Vec::new()));

        let mut nodes = BTreeMap::new();
        let mut receivers = Vec::new();
        for name in std::iter::once(host).chain(clients.iter().copied()) {
            let site = SiteId::new(name);
            let (tx, rx) = mpsc::unbounded_channel();
            let wire = Arc::new(Wire {
                tx,
                in_flight: in_flight.clone(),
                log: Mutex::new(Vec::new()),
            });
            let gate = Arc::new(LocalEditGate::new());
            let session = Arc::new(Session::new(
                site.clone(),
                host_id.clone(),
                wire.clone(),
                gate.clone(),
                config.clone(),
            ));
            receivers.push((site.clone(), rx));
            nodes.insert(
                site,
                Node {
                    session,
                    gate,
                    wire,
                },
            );
        }
        for client in clients {
            nodes[&host_id]
                .session
                .add_participant(SiteId::new(*client))
                .unwrap();
        }

        let sessions: Arc<BTreeMap<SiteId, Arc<Session>>> = Arc::new(
            nodes
                .iter()
                .map(|(site, node)| (site.clone(), node.session.clone()))
                .collect(),
        );
        for (from, mut rx) in receivers {
            let sessions = sessions.clone();
            let in_flight = in_flight.clone();
            let silenced = silenced.clone();
            let errors = errors.clone();
            let inbound = inbound.clone();
            tokio::spawn(async move {
                while let Some((target, activity)) = rx.recv().await {
                    let muted = silenced.lock().contains(&target);
                    if !muted {
                        if let Some(session) = sessions.get(&target) {
                            match session.handle_activity(&from, activity) {
                                Ok(Inbound::Handled) => {}
                                Ok(other) => inbound.lock().push((target.clone(), other)),
                                Err(e) => errors.lock().push(format!("{target}: {e}")),
                            }
                        }
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        Self {
            nodes,
            in_flight,
            silenced,
            errors,
            inbound,
        }
    }

    pub fn node(&self, name: &str) -> &Node {
        &self.nodes[&SiteId::new(name)]
    }

    pub fn session(&self, name: &str) -> &Arc<Session> {
        &self.node(name).session
    }

    /// Opens `document` with the same content everywhere.
    pub fn open(&self, document: &str, content: &str) -> DocumentId {
        let id = DocumentId::new(document);
        for node in self.nodes.values() {
            node.session.open_document(id.clone(), content);
        }
        id
    }

    pub fn contents(&self, document: &DocumentId) -> Vec<String> {
        self.nodes
            .values()
            .map(|node| node.session.document(document).unwrap().content())
            .collect()
    }

    /// Drops every activity addressed to `site` from now on.
    pub fn silence(&self, site: &str) {
        self.silenced.lock().insert(SiteId::new(site));
    }

    /// Waits until every dispatched activity has been handled.
    pub async fn settle(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            assert!(tokio::time::Instant::now() < deadline, "network did not settle");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn inbound(&self) -> Vec<(SiteId, Inbound)> {
        self.inbound.lock().clone()
    }
}

pub fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.stop.ack_timeout = Duration::from_millis(100);
    config.watchdog.interval = Duration::from_millis(20);
    config
}
