use cotext_core::{Causality, VectorTime};

#[test]
fn increments_are_independent() {
    let mut time = VectorTime::default();
    assert_eq!(time, VectorTime::new(0, 0));

    time.increment_local();
    time.increment_local();
    time.increment_remote();
    assert_eq!(time.local(), 2);
    assert_eq!(time.remote(), 1);
    assert_eq!(time.to_string(), "[2,1]");
}

#[test]
fn compare_is_componentwise() {
    let base = VectorTime::new(2, 3);

    assert_eq!(base.compare(&VectorTime::new(2, 3)), Causality::Equal);
    assert_eq!(base.compare(&VectorTime::new(1, 3)), Causality::LocalAhead);
    assert_eq!(base.compare(&VectorTime::new(2, 4)), Causality::RemoteAhead);
    assert_eq!(base.compare(&VectorTime::new(3, 2)), Causality::Divergent);

    assert!(VectorTime::new(1, 1) < VectorTime::new(1, 2));
    assert!(VectorTime::new(3, 1) > VectorTime::new(2, 1));
    assert_eq!(VectorTime::new(3, 1).partial_cmp(&VectorTime::new(1, 3)), None);
}

#[test]
fn snapshots_do_not_follow_later_increments() {
    let mut time = VectorTime::new(1, 1);
    let snapshot = time;
    time.increment_remote();
    assert_eq!(snapshot, VectorTime::new(1, 1));
    assert_ne!(snapshot, time);
}
