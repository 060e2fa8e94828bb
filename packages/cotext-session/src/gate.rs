use std::sync::atomic::{AtomicBool, Ordering};

/// Switch the editor layer consults before producing local edits.
///
/// `lock` and `unlock` are called once per transition, never twice in a row.
pub trait EditorGate: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
    fn is_locked(&self) -> bool;
}

/// Gate that just records its state.
#[derive(Debug, Default)]
pub struct LocalEditGate {
    locked: AtomicBool,
}

impl LocalEditGate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EditorGate for LocalEditGate {
    fn lock(&self) {
        self.locked.store(true, Ordering::Release);
        tracing::debug!("local editing locked");
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        tracing::debug!("local editing unlocked");
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}
