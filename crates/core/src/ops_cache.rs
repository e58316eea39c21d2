//! The per-key operation cache.
//!
//! Each key owns a densely packed ring of committed operations: a populated
//! prefix of `len` slots out of `capacity`, ordered by ascending op id, plus
//! a monotonic `next_op_id` counter bumped on every insert. Appends are O(1);
//! capacity follows the resize policy evaluated during snapshot GC.
//!
//! The cache table permits concurrent readers; per-key multi-step writes are
//! issued only from the partition's command processor, so write-write races
//! cannot happen. Readers clone the populated prefix they observe and replay
//! from that.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{OPS_THRESHOLD, RESIZE_THRESHOLD};
use crate::error::TableError;
use crate::ring::PartitionId;
use crate::tables::TableRegistry;
use crate::tx::{Key, Operation};

/// A key's packed operation ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsCacheEntry {
    key: Key,
    len: usize,
    next_op_id: u64,
    /// `slots.len()` is the allocated capacity; live ops occupy the prefix
    /// `slots[..len]`, each `Some((op_id, op))` with strictly increasing ids.
    slots: Vec<Option<(u64, Operation)>>,
}

impl OpsCacheEntry {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            len: 0,
            next_op_id: 0,
            slots: vec![None; OPS_THRESHOLD],
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn next_op_id(&self) -> u64 {
        self.next_op_id
    }

    /// Reserves the next op id. Ids start at 1 so that a blank snapshot's
    /// `last_op_id = 0` compares below every live op.
    pub(crate) fn bump_op_id(&mut self) -> u64 {
        self.next_op_id += 1;
        self.next_op_id
    }

    /// Appends at the end of the populated prefix.
    pub(crate) fn append(&mut self, op_id: u64, op: Operation) {
        if self.len == self.slots.len() {
            // The GC-inducing read normally reshapes capacity before we get
            // here; a full ring means that read failed upstream. Grow rather
            // than drop a committed op.
            let grown = self.slots.len() * 2;
            self.slots.resize(grown, None);
        }
        debug_assert!(self.live().next_back().is_none_or(|(id, _)| *id < op_id));
        self.slots[self.len] = Some((op_id, op));
        self.len += 1;
    }

    /// Live `(op_id, op)` pairs, ascending by op id.
    pub fn live(&self) -> impl DoubleEndedIterator<Item = &(u64, Operation)> {
        self.slots[..self.len].iter().flatten()
    }

    /// Replaces the live prefix after GC, reallocating to `capacity` slots.
    /// Capacity never drops below the live count or the ring floor.
    pub(crate) fn replace_ops(&mut self, ops: Vec<(u64, Operation)>, capacity: usize) {
        let capacity = capacity.max(ops.len()).max(OPS_THRESHOLD);
        self.len = ops.len();
        let mut slots: Vec<Option<(u64, Operation)>> = ops.into_iter().map(Some).collect();
        slots.resize(capacity, None);
        self.slots = slots;
    }
}

/// The resize policy, evaluated during snapshot GC.
///
/// Doubles when the post-prune live count crowds the current allocation,
/// halves when half the allocation still leaves headroom, and never shrinks
/// below the ring floor.
pub(crate) fn resized_capacity(live: usize, capacity: usize) -> usize {
    if live + RESIZE_THRESHOLD > capacity {
        capacity * 2
    } else if capacity / 2 <= OPS_THRESHOLD {
        capacity
    } else if capacity / 2 > live + RESIZE_THRESHOLD {
        capacity / 2
    } else {
        capacity
    }
}

/// What a reader observes of a key's ring: the `(len, capacity, next_op_id)`
/// header it saw plus a clone of the populated prefix.
#[derive(Debug, Clone)]
pub struct OpsView {
    pub len: usize,
    pub capacity: usize,
    pub next_op_id: u64,
    /// Ascending by op id.
    pub ops: Vec<(u64, Operation)>,
}

/// The partition's operation-cache table.
pub struct OpsCache {
    name: String,
    registry: Arc<TableRegistry>,
    entries: RwLock<HashMap<Key, Arc<RwLock<OpsCacheEntry>>>>,
}

impl OpsCache {
    pub fn open(partition: PartitionId, registry: Arc<TableRegistry>) -> Result<Self, TableError> {
        let name = format!("ops_cache-{}", partition.0);
        registry.create(&name)?;
        Ok(Self {
            name,
            registry,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of keys with an entry.
    pub fn key_count(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn entry(&self, key: &Key) -> Option<Arc<RwLock<OpsCacheEntry>>> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn entry_or_create(&self, key: &Key) -> Arc<RwLock<OpsCacheEntry>> {
        if let Some(entry) = self.entry(key) {
            return entry;
        }
        self.entries
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(OpsCacheEntry::new(key.clone()))))
            .clone()
    }

    /// The read-path view of a key's ring, or `None` for an unseen key.
    pub fn lookup_element(&self, key: &Key) -> Option<OpsView> {
        let entry = self.entry(key)?;
        let entry = entry.read();
        Some(OpsView {
            len: entry.len(),
            capacity: entry.capacity(),
            next_op_id: entry.next_op_id(),
            ops: entry.live().cloned().collect(),
        })
    }

    /// Inserts a decoded handoff entry verbatim, replacing any local state
    /// for the key.
    pub(crate) fn insert_entry(&self, entry: OpsCacheEntry) {
        self.entries
            .write()
            .insert(entry.key().clone(), Arc::new(RwLock::new(entry)));
    }

    /// Visits every entry under a read guard, in no particular key order.
    pub(crate) fn for_each_entry(&self, mut f: impl FnMut(&Key, &OpsCacheEntry)) {
        let entries: Vec<_> = self.entries.read().values().cloned().collect();
        for entry in entries {
            let entry = entry.read();
            f(entry.key(), &entry);
        }
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drops the table and frees its registered name.
    pub(crate) fn destroy(&self) {
        self.clear();
        self.registry.release(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{CrdtOp, CrdtType};
    use crate::tx::TxnId;
    use meridian_vclock::{DcId, VectorClock};
    use pretty_assertions::assert_eq;

    fn some_op(key: &Key, commit_time: u64) -> Operation {
        Operation {
            key: key.clone(),
            crdt_type: CrdtType::GCounter,
            op_param: CrdtOp::Increment(1),
            snapshot_vc: VectorClock::new(),
            dependency_vc: VectorClock::new(),
            dc_and_commit_time: (DcId(1), commit_time),
            txid: TxnId::Client(1),
        }
    }

    #[test]
    fn append_fills_the_prefix_in_order() {
        let key = Key::from("k");
        let mut entry = OpsCacheEntry::new(key.clone());
        for i in 0..10 {
            let id = entry.bump_op_id();
            entry.append(id, some_op(&key, 10 + i));
        }
        assert_eq!(entry.len(), 10);
        assert_eq!(entry.capacity(), OPS_THRESHOLD);
        assert_eq!(entry.next_op_id(), 10);
        let ids: Vec<u64> = entry.live().map(|(id, _)| *id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn replace_ops_keeps_floor_capacity() {
        let key = Key::from("k");
        let mut entry = OpsCacheEntry::new(key.clone());
        for i in 0..5 {
            let id = entry.bump_op_id();
            entry.append(id, some_op(&key, i));
        }
        let kept: Vec<_> = entry.live().skip(3).cloned().collect();
        entry.replace_ops(kept, 10);
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.capacity(), OPS_THRESHOLD);
        // The counter survives reallocation.
        assert_eq!(entry.next_op_id(), 5);
    }

    #[test]
    fn resize_policy() {
        // Crowded: double.
        assert_eq!(resized_capacity(97, 100), 200);
        assert_eq!(resized_capacity(46, 50), 100);
        // Never below the floor.
        assert_eq!(resized_capacity(0, 100), 100);
        assert_eq!(resized_capacity(0, 50), 50);
        // Roomy and above the floor: halve.
        assert_eq!(resized_capacity(10, 200), 100);
        // In between: keep.
        assert_eq!(resized_capacity(97, 200), 200);
    }

    #[test]
    fn lookup_element_clones_the_observed_prefix() {
        let registry = Arc::new(TableRegistry::new());
        let cache = OpsCache::open(PartitionId(0), registry).unwrap();
        let key = Key::from("k");
        assert!(!cache.member(&key));
        assert!(cache.lookup_element(&key).is_none());

        {
            let entry = cache.entry_or_create(&key);
            let mut entry = entry.write();
            let id = entry.bump_op_id();
            entry.append(id, some_op(&key, 11));
        }
        let view = cache.lookup_element(&key).unwrap();
        assert_eq!(view.len, 1);
        assert_eq!(view.capacity, OPS_THRESHOLD);
        assert_eq!(view.next_op_id, 1);
        assert_eq!(view.ops[0].0, 1);
    }

    #[test]
    fn table_name_is_claimed_and_released() {
        let registry = Arc::new(TableRegistry::new());
        let cache = OpsCache::open(PartitionId(3), registry.clone()).unwrap();
        assert!(registry.contains("ops_cache-3"));
        assert!(OpsCache::open(PartitionId(3), registry.clone()).is_err());
        cache.destroy();
        assert!(!registry.contains("ops_cache-3"));
    }
}
