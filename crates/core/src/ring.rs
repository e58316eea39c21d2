//! The partitioning ring contract.
//!
//! The ring maps a key to the ordered list of `(partition, node)` pairs
//! responsible for it; the head of the preference list is the primary the
//! materializer routes updates to. Ring maintenance itself lives outside
//! this crate.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::tx::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(pub u64);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A preference list; the head is the primary.
pub type Preflist = SmallVec<[(PartitionId, NodeId); 3]>;

pub trait Ring: Send + Sync {
    fn preflist_from_key(&self, key: &Key) -> Preflist;
}

/// A single-node ring hashing keys onto a fixed partition count.
pub struct ModRing {
    partitions: u64,
    node: NodeId,
}

impl ModRing {
    pub fn new(partitions: u64, node: NodeId) -> Self {
        assert!(partitions > 0, "a ring needs at least one partition");
        Self { partitions, node }
    }
}

impl Ring for ModRing {
    fn preflist_from_key(&self, key: &Key) -> Preflist {
        let mut hasher = DefaultHasher::new();
        key.as_bytes().hash(&mut hasher);
        let partition = PartitionId(hasher.finish() % self.partitions);
        smallvec![(partition, self.node)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflist_is_stable_and_in_range() {
        let ring = ModRing::new(8, NodeId(0));
        for k in ["a", "b", "c", "somewhat-longer-key"] {
            let key = Key::from(k);
            let first = ring.preflist_from_key(&key);
            let second = ring.preflist_from_key(&key);
            assert_eq!(first, second);
            assert!(first[0].0 .0 < 8);
        }
    }
}
