//! Stop/start quiescence protocol.
//!
//! `stop(user)` sends a lock request and waits for the acknowledgment; the returned
//! [`StartHandle`] releases the stop. A user stays locked while anyone holds a handle on
//! them, and exactly one unlock goes out when the last handle is started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cotext_core::SiteId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::activity::{Activity, StopActivity, StopId, StopKind, StopState};
use crate::config::StopConfig;
use crate::gate::EditorGate;
use crate::sink::ActivitySink;

/// One outstanding stop on a user, remembered by whoever must later lift it.
#[derive(Clone, Debug)]
struct HandleRecord {
    id: StopId,
    initiator: SiteId,
}

/// A lock request sent to `user` whose acknowledgment has not arrived yet.
struct Waiter {
    user: SiteId,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    handles: HashMap<SiteId, Vec<HandleRecord>>,
    awaiting_ack: HashMap<StopId, Waiter>,
}

impl State {
    /// Whether a stop on `user` is registered or still waiting for its acknowledgment.
    fn holds(&self, user: &SiteId) -> bool {
        self.handles.contains_key(user) || self.awaiting_ack.values().any(|w| w.user == *user)
    }
}

struct Inner {
    local: SiteId,
    sink: Arc<dyn ActivitySink>,
    gate: Arc<dyn EditorGate>,
    config: StopConfig,
    // Never held across an await or while calling the sink or the gate.
    state: Mutex<State>,
}

/// Cheap to clone; clones share the same handle table.
#[derive(Clone)]
pub struct StopManager {
    inner: Arc<Inner>,
}

impl StopManager {
    pub fn new(
        local: SiteId,
        sink: Arc<dyn ActivitySink>,
        gate: Arc<dyn EditorGate>,
        config: StopConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local,
                sink,
                gate,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn local_user(&self) -> &SiteId {
        &self.inner.local
    }

    /// Stops `user` and waits for the acknowledgment.
    ///
    /// Returns `None` when no acknowledgment arrives within the configured timeout; no
    /// handle is registered in that case, and an unlock is sent unless another stop on the
    /// user is live or pending. Stopping the local user locks the gate directly.
    pub async fn stop(&self, user: &SiteId) -> Option<StartHandle> {
        let inner = &self.inner;
        let id = StopId::new();

        if *user == inner.local {
            inner.register(user, id, inner.local.clone());
            tracing::debug!(stop = %id, "stopped local user");
            return Some(StartHandle::new(user.clone(), id, inner.clone()));
        }

        let (tx, rx) = oneshot::channel();
        inner.state.lock().awaiting_ack.insert(
            id,
            Waiter {
                user: user.clone(),
                tx,
            },
        );
        inner.sink.dispatch(
            user,
            Activity::Stop(StopActivity::lock_request(id, inner.local.clone(), user.clone())),
        );
        tracing::debug!(stop = %id, user = %user, "lock request sent");

        // The acknowledgment path registers the handle record before waking us.
        if let Ok(Ok(())) = tokio::time::timeout(inner.config.ack_timeout, rx).await {
            tracing::debug!(stop = %id, user = %user, "stop acknowledged");
            return Some(StartHandle::new(user.clone(), id, inner.clone()));
        }

        let (acknowledged, holds_user) = {
            let mut state = inner.state.lock();
            let acknowledged = state.awaiting_ack.remove(&id).is_none();
            (acknowledged, state.holds(user))
        };
        if acknowledged {
            tracing::debug!(stop = %id, user = %user, "stop acknowledged at the deadline");
            return Some(StartHandle::new(user.clone(), id, inner.clone()));
        }
        tracing::warn!(
            stop = %id,
            user = %user,
            timeout_ms = inner.config.ack_timeout.as_millis() as u64,
            "no acknowledgment for stop"
        );
        // A late acknowledgment would leave the user locked with no handle to release it.
        // Any other live or pending stop on the user ends with an unlock of its own.
        if !holds_user {
            inner.sink.dispatch(
                user,
                Activity::Stop(StopActivity::unlock_request(
                    id,
                    inner.local.clone(),
                    user.clone(),
                )),
            );
        }
        None
    }

    /// Stops every user or none: if one stop fails, the handles already obtained are
    /// started again and `None` is returned.
    pub async fn stop_all(&self, users: &[SiteId]) -> Option<Vec<StartHandle>> {
        let mut handles = Vec::with_capacity(users.len());
        for user in users {
            match self.stop(user).await {
                Some(handle) => handles.push(handle),
                None => {
                    tracing::warn!(user = %user, "stop_all failed, releasing obtained stops");
                    for handle in handles {
                        handle.start();
                    }
                    return None;
                }
            }
        }
        Some(handles)
    }

    /// Entry point for stop activities arriving from peers.
    pub fn handle_activity(&self, activity: StopActivity) {
        let inner = &self.inner;
        match (activity.kind, activity.state) {
            (StopKind::LockRequest, StopState::Initiated) => {
                if activity.affected != inner.local {
                    tracing::warn!(
                        stop = %activity.id,
                        affected = %activity.affected,
                        "lock request addressed to another user"
                    );
                    return;
                }
                inner.register(&inner.local, activity.id, activity.initiator.clone());
                tracing::debug!(stop = %activity.id, initiator = %activity.initiator, "locked by peer");
                inner
                    .sink
                    .dispatch(&activity.initiator, Activity::Stop(activity.acknowledged()));
            }
            (StopKind::LockRequest, StopState::Acknowledged) => {
                let waiter = {
                    let mut state = inner.state.lock();
                    let waiter = state.awaiting_ack.remove(&activity.id);
                    if let Some(waiter) = &waiter {
                        state
                            .handles
                            .entry(waiter.user.clone())
                            .or_default()
                            .push(HandleRecord {
                                id: activity.id,
                                initiator: inner.local.clone(),
                            });
                    }
                    waiter
                };
                match waiter {
                    Some(waiter) => {
                        // The waiter may be past its deadline; it then finds the record itself.
                        let _ = waiter.tx.send(());
                    }
                    None => {
                        tracing::warn!(stop = %activity.id, "acknowledgment for unknown stop");
                    }
                }
            }
            (StopKind::UnlockRequest, StopState::Initiated) => {
                if activity.affected != inner.local {
                    tracing::warn!(
                        stop = %activity.id,
                        affected = %activity.affected,
                        "unlock request addressed to another user"
                    );
                    return;
                }
                inner.release_initiator(&activity.initiator);
            }
            (StopKind::UnlockRequest, StopState::Acknowledged) => {
                tracing::debug!(stop = %activity.id, "ignoring unlock acknowledgment");
            }
        }
    }

    /// Whether anyone (local or remote) currently holds a stop on `user`.
    pub fn is_locked(&self, user: &SiteId) -> bool {
        self.inner.state.lock().handles.contains_key(user)
    }

    /// Number of outstanding stops recorded for `user`.
    pub fn handle_count(&self, user: &SiteId) -> usize {
        self.inner
            .state
            .lock()
            .handles
            .get(user)
            .map_or(0, Vec::len)
    }
}

impl Inner {
    fn register(&self, user: &SiteId, id: StopId, initiator: SiteId) {
        let first = {
            let mut state = self.state.lock();
            let records = state.handles.entry(user.clone()).or_default();
            records.push(HandleRecord { id, initiator });
            records.len() == 1
        };
        if first && *user == self.local {
            self.gate.lock();
        }
    }

    /// Removes one locally held stop on `user`; returns whether that lifted the last one.
    fn release(&self, user: &SiteId, id: StopId) -> bool {
        let lifted = {
            let mut state = self.state.lock();
            let Some(records) = state.handles.get_mut(user) else {
                tracing::warn!(stop = %id, user = %user, "start for a user with no stops");
                return false;
            };
            let before = records.len();
            records.retain(|record| record.id != id);
            if records.len() == before {
                tracing::warn!(stop = %id, user = %user, "start for an unknown stop");
                return false;
            }
            if records.is_empty() {
                state.handles.remove(user);
                true
            } else {
                false
            }
        };

        if !lifted {
            tracing::debug!(stop = %id, user = %user, "other stops still outstanding");
            return false;
        }
        if *user == self.local {
            self.gate.unlock();
        } else {
            self.sink.dispatch(
                user,
                Activity::Stop(StopActivity::unlock_request(id, self.local.clone(), user.clone())),
            );
        }
        tracing::debug!(stop = %id, user = %user, "user started");
        true
    }

    /// Drops every stop `initiator` holds on the local user.
    fn release_initiator(&self, initiator: &SiteId) {
        let lifted = {
            let mut state = self.state.lock();
            match state.handles.get_mut(&self.local) {
                Some(records) => {
                    records.retain(|record| record.initiator != *initiator);
                    if records.is_empty() {
                        state.handles.remove(&self.local);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if lifted {
            self.gate.unlock();
            tracing::debug!(initiator = %initiator, "unlocked by peer");
        } else {
            tracing::debug!(initiator = %initiator, "unlock request left other stops in place");
        }
    }
}

/// Releases one stop. Must be started exactly once; dropping it unstarted keeps the user
/// stopped.
pub struct StartHandle {
    user: SiteId,
    id: StopId,
    started: AtomicBool,
    manager: Arc<Inner>,
}

impl StartHandle {
    fn new(user: SiteId, id: StopId, manager: Arc<Inner>) -> Self {
        Self {
            user,
            id,
            started: AtomicBool::new(false),
            manager,
        }
    }

    pub fn user(&self) -> &SiteId {
        &self.user
    }

    pub fn id(&self) -> StopId {
        self.id
    }

    /// Lifts this stop. Returns `true` when it was the last one on the user, which is also
    /// the only case where an unlock is sent.
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    pub fn start(&self) -> bool {
        let already = self.started.swap(true, Ordering::AcqRel);
        assert!(!already, "start handle {} for {} started twice", self.id, self.user);
        self.manager.release(&self.user, self.id)
    }
}

impl std::fmt::Debug for StartHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartHandle")
            .field("user", &self.user)
            .field("id", &self.id)
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}
