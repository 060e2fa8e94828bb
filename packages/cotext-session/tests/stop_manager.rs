mod common;

use std::sync::Arc;
use std::time::Duration;

use cotext_core::SiteId;
use cotext_session::{
    Activity, ChannelSink, EditorGate, LocalEditGate, StopActivity, StopConfig, StopId, StopKind,
    StopManager, StopState,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn manager(local: &str, timeout_ms: u64) -> (
    StopManager,
    Arc<LocalEditGate>,
    UnboundedReceiver<(SiteId, Activity)>,
) {
    common::init_tracing();
    let (sink, rx) = ChannelSink::new();
    let gate = Arc::new(LocalEditGate::new());
    let manager = StopManager::new(
        SiteId::new(local),
        Arc::new(sink),
        gate.clone(),
        StopConfig {
            ack_timeout: Duration::from_millis(timeout_ms),
        },
    );
    (manager, gate, rx)
}

fn expect_stop(rx: &mut UnboundedReceiver<(SiteId, Activity)>) -> (SiteId, StopActivity) {
    match rx.try_recv().expect("an activity was dispatched") {
        (target, Activity::Stop(stop)) => (target, stop),
        (_, other) => panic!("expected a stop activity, got {other:?}"),
    }
}

/// Stops `user` on `manager`, answering the lock request from the test side.
async fn acknowledged_stop(
    manager: &StopManager,
    rx: &mut UnboundedReceiver<(SiteId, Activity)>,
    user: &SiteId,
) -> cotext_session::StartHandle {
    let waiting = {
        let manager = manager.clone();
        let user = user.clone();
        tokio::spawn(async move { manager.stop(&user).await })
    };
    let (target, request) = loop {
        if let Ok((target, Activity::Stop(stop))) = rx.try_recv() {
            break (target, stop);
        }
        tokio::task::yield_now().await;
    };
    assert_eq!(&target, user);
    assert_eq!(request.kind, StopKind::LockRequest);
    assert_eq!(request.state, StopState::Initiated);
    manager.handle_activity(request.acknowledged());
    waiting.await.unwrap().expect("acknowledged stop yields a handle")
}

#[tokio::test]
async fn acknowledged_stop_registers_a_handle() {
    let (host, _, mut rx) = manager("host", 1000);
    let alice = SiteId::new("alice");

    let handle = acknowledged_stop(&host, &mut rx, &alice).await;
    assert_eq!(handle.user(), &alice);
    assert!(host.is_locked(&alice));
    assert_eq!(host.handle_count(&alice), 1);

    assert!(handle.start());
    assert!(!host.is_locked(&alice));
    let (target, unlock) = expect_stop(&mut rx);
    assert_eq!(target, alice);
    assert_eq!(unlock.kind, StopKind::UnlockRequest);
    assert_eq!(unlock.initiator, SiteId::new("host"));
}

#[tokio::test]
async fn second_handle_holds_the_lock_until_started() {
    let (host, _, mut rx) = manager("host", 1000);
    let alice = SiteId::new("alice");

    let first = acknowledged_stop(&host, &mut rx, &alice).await;
    let second = acknowledged_stop(&host, &mut rx, &alice).await;
    assert_eq!(host.handle_count(&alice), 2);

    assert!(!first.start());
    assert!(host.is_locked(&alice));
    assert!(rx.try_recv().is_err(), "no unlock while a handle is outstanding");

    assert!(second.start());
    assert!(!host.is_locked(&alice));
    let (_, unlock) = expect_stop(&mut rx);
    assert_eq!(unlock.kind, StopKind::UnlockRequest);
    assert!(rx.try_recv().is_err(), "exactly one unlock");
}

#[tokio::test]
async fn unacknowledged_stop_times_out_without_a_handle() {
    let (host, _, mut rx) = manager("host", 30);
    let alice = SiteId::new("alice");

    assert!(host.stop(&alice).await.is_none());
    assert!(!host.is_locked(&alice));
    assert_eq!(host.handle_count(&alice), 0);

    let (_, lock) = expect_stop(&mut rx);
    assert_eq!(lock.kind, StopKind::LockRequest);
    // A late acknowledgment must not leave alice locked.
    let (_, unlock) = expect_stop(&mut rx);
    assert_eq!(unlock.kind, StopKind::UnlockRequest);
    assert_eq!(unlock.id, lock.id);

    // The late acknowledgment itself is dropped.
    host.handle_activity(lock.acknowledged());
    assert_eq!(host.handle_count(&alice), 0);
}

#[tokio::test]
async fn stopping_the_local_user_locks_the_gate_without_messages() {
    let (alice, gate, mut rx) = manager("alice", 1000);
    let me = SiteId::new("alice");

    let handle = alice.stop(&me).await.unwrap();
    assert!(gate.is_locked());
    assert!(alice.is_locked(&me));

    assert!(handle.start());
    assert!(!gate.is_locked());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
#[should_panic(expected = "started twice")]
async fn starting_a_handle_twice_panics() {
    let (alice, _, _rx) = manager("alice", 1000);
    let handle = alice.stop(&SiteId::new("alice")).await.unwrap();
    handle.start();
    handle.start();
}

#[tokio::test]
async fn lock_requests_are_acknowledged_and_lock_the_gate() {
    let (alice, gate, mut rx) = manager("alice", 1000);
    let host = SiteId::new("host");
    let id = StopId::new();

    alice.handle_activity(StopActivity::lock_request(id, host.clone(), SiteId::new("alice")));
    assert!(gate.is_locked());

    let (target, ack) = expect_stop(&mut rx);
    assert_eq!(target, host);
    assert_eq!(ack.id, id);
    assert_eq!(ack.kind, StopKind::LockRequest);
    assert_eq!(ack.state, StopState::Acknowledged);

    alice.handle_activity(StopActivity::unlock_request(id, host, SiteId::new("alice")));
    assert!(!gate.is_locked());
}

#[tokio::test]
async fn unlock_only_lifts_the_initiators_stops() {
    let (bob, gate, _rx) = manager("bob", 1000);
    let me = SiteId::new("bob");
    let host = SiteId::new("host");
    let alice = SiteId::new("alice");

    bob.handle_activity(StopActivity::lock_request(StopId::new(), host.clone(), me.clone()));
    bob.handle_activity(StopActivity::lock_request(StopId::new(), alice.clone(), me.clone()));
    bob.handle_activity(StopActivity::lock_request(StopId::new(), host.clone(), me.clone()));
    assert_eq!(bob.handle_count(&me), 3);

    // One unlock carries away every stop its initiator placed.
    bob.handle_activity(StopActivity::unlock_request(StopId::new(), host, me.clone()));
    assert_eq!(bob.handle_count(&me), 1);
    assert!(gate.is_locked());

    bob.handle_activity(StopActivity::unlock_request(StopId::new(), alice, me.clone()));
    assert_eq!(bob.handle_count(&me), 0);
    assert!(!gate.is_locked());
}

#[tokio::test]
async fn requests_for_other_users_are_ignored() {
    let (bob, gate, mut rx) = manager("bob", 1000);
    bob.handle_activity(StopActivity::lock_request(
        StopId::new(),
        SiteId::new("host"),
        SiteId::new("carol"),
    ));
    assert!(!gate.is_locked());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn stop_all_releases_obtained_handles_on_failure() {
    let (host, gate, mut rx) = manager("host", 30);
    let users = [SiteId::new("host"), SiteId::new("alice")];

    assert!(host.stop_all(&users).await.is_none());
    assert!(!gate.is_locked());
    assert_eq!(host.handle_count(&SiteId::new("host")), 0);
    assert_eq!(host.handle_count(&SiteId::new("alice")), 0);

    let (_, lock) = expect_stop(&mut rx);
    assert_eq!(lock.kind, StopKind::LockRequest);
}

#[tokio::test]
async fn stop_all_over_only_the_local_user() {
    let (host, gate, _rx) = manager("host", 30);
    let handles = host.stop_all(&[SiteId::new("host")]).await.unwrap();
    assert_eq!(handles.len(), 1);
    assert!(gate.is_locked());
    for handle in &handles {
        handle.start();
    }
    assert!(!gate.is_locked());
}

/// Hands every activity queued on `rx` to `peer`, returning the stop activities in order.
fn deliver_all(rx: &mut UnboundedReceiver<(SiteId, Activity)>, peer: &StopManager) -> Vec<StopActivity> {
    let mut delivered = Vec::new();
    while let Ok((_, activity)) = rx.try_recv() {
        if let Activity::Stop(stop) = activity {
            peer.handle_activity(stop.clone());
            delivered.push(stop);
        }
    }
    delivered
}

#[tokio::test]
async fn timed_out_stop_does_not_release_a_concurrent_one() {
    let (host, _, mut host_rx) = manager("host", 100);
    let (alice, alice_gate, mut alice_rx) = manager("alice", 1000);
    let alice_id = SiteId::new("alice");

    let first = {
        let host = host.clone();
        let user = alice_id.clone();
        tokio::spawn(async move { host.stop(&user).await })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = {
        let host = host.clone();
        let user = alice_id.clone();
        tokio::spawn(async move { host.stop(&user).await })
    };
    tokio::task::yield_now().await;

    // The first acknowledgment never makes it back in time.
    assert!(first.await.unwrap().is_none());

    // Alice sees both lock requests and no unlock: the second stop is still pending.
    let to_alice = deliver_all(&mut host_rx, &alice);
    assert_eq!(to_alice.len(), 2);
    assert!(to_alice.iter().all(|stop| stop.kind == StopKind::LockRequest));
    assert_eq!(alice.handle_count(&alice_id), 2);

    // Both acknowledgments arrive; the first is late and dropped.
    let acks = deliver_all(&mut alice_rx, &host);
    assert_eq!(acks.len(), 2);
    let handle = second.await.unwrap().expect("second stop acknowledged");
    assert!(host.is_locked(&alice_id));
    assert!(host_rx.try_recv().is_err(), "no unlock while a stop is live");
    assert!(alice_gate.is_locked());

    assert!(handle.start());
    let unlocks = deliver_all(&mut host_rx, &alice);
    assert_eq!(unlocks.len(), 1);
    assert_eq!(unlocks[0].kind, StopKind::UnlockRequest);
    assert!(!alice_gate.is_locked());
    assert_eq!(alice.handle_count(&alice_id), 0);
}

#[tokio::test]
async fn acknowledgment_registers_before_the_waiter_resumes() {
    let (host, _, mut host_rx) = manager("host", 1000);
    let alice = SiteId::new("alice");

    let waiting = {
        let host = host.clone();
        let user = alice.clone();
        tokio::spawn(async move { host.stop(&user).await })
    };
    let (_, lock) = loop {
        if let Ok((target, Activity::Stop(stop))) = host_rx.try_recv() {
            break (target, stop);
        }
        tokio::task::yield_now().await;
    };

    host.handle_activity(lock.acknowledged());
    // Counted before the stopping task has run again.
    assert_eq!(host.handle_count(&alice), 1);
    let handle = waiting.await.unwrap().unwrap();
    assert_eq!(handle.id(), lock.id);
    assert_eq!(host.handle_count(&alice), 1);
}
