use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Two-counter logical clock between exactly two sites.
///
/// `local` counts operations generated here towards the peer, `remote` counts operations
/// received from the peer and incorporated here. Both only ever grow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VectorTime {
    local: u32,
    remote: u32,
}

/// Causal relation between two vector times of the same site pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Causality {
    Equal,
    LocalAhead,
    RemoteAhead,
    Divergent,
}

impl VectorTime {
    pub fn new(local: u32, remote: u32) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> u32 {
        self.local
    }

    pub fn remote(&self) -> u32 {
        self.remote
    }

    pub fn increment_local(&mut self) {
        self.local += 1;
    }

    pub fn increment_remote(&mut self) {
        self.remote += 1;
    }

    /// `LocalAhead` means `self` has seen at least everything `other` has and is strictly
    /// greater in one component.
    pub fn compare(&self, other: &VectorTime) -> Causality {
        match (self.local.cmp(&other.local), self.remote.cmp(&other.remote)) {
            (Ordering::Equal, Ordering::Equal) => Causality::Equal,
            (Ordering::Less | Ordering::Equal, Ordering::Less | Ordering::Equal) => {
                Causality::RemoteAhead
            }
            (Ordering::Greater | Ordering::Equal, Ordering::Greater | Ordering::Equal) => {
                Causality::LocalAhead
            }
            _ => Causality::Divergent,
        }
    }
}

impl PartialOrd for VectorTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            Causality::Equal => Some(Ordering::Equal),
            Causality::LocalAhead => Some(Ordering::Greater),
            Causality::RemoteAhead => Some(Ordering::Less),
            Causality::Divergent => None,
        }
    }
}

impl fmt::Display for VectorTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.local, self.remote)
    }
}
