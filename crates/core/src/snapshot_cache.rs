//! The per-key snapshot cache.
//!
//! Each key maps to a [`VectorOrdDict`]: materialized snapshots ordered by
//! the dominance relation of their commit parameters, oldest first. The dict
//! stays small (snapshot GC bounds it at [`crate::config::SNAPSHOT_THRESHOLD`]
//! entries), so a linear list is the right container.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use meridian_vclock::VectorClock;
use parking_lot::RwLock;

use crate::error::TableError;
use crate::protocol::SnapshotCommitParams;
use crate::ring::PartitionId;
use crate::tables::TableRegistry;
use crate::tx::{Key, Snapshot};

/// Ordered map from snapshot vector to materialized snapshot.
///
/// Ordering follows the vector returned by
/// [`SnapshotCommitParams::ordering_vc`]; a blank entry (no params) sorts
/// below everything. Entries equal under the partial order are deduplicated
/// by keeping the newer insertion.
#[derive(Debug, Clone, Default)]
pub struct VectorOrdDict {
    /// Oldest first; the youngest snapshot is the last element.
    entries: Vec<(SnapshotCommitParams, Snapshot)>,
}

/// `a <= b` over ordering vectors, a missing vector being the empty clock.
fn vc_le(a: Option<&VectorClock>, b: Option<&VectorClock>) -> bool {
    match (a, b) {
        (None, _) => true,
        (Some(a), Some(b)) => a.le(b),
        (Some(a), None) => a.is_empty(),
    }
}

fn vc_cmp(a: Option<&VectorClock>, b: Option<&VectorClock>) -> Option<Ordering> {
    match (vc_le(a, b), vc_le(b, a)) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

impl VectorOrdDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts preserving dominance order, walking from the youngest end.
    /// An entry equal to `params` under the partial order is replaced.
    pub fn insert_bigger(&mut self, params: SnapshotCommitParams, snapshot: Snapshot) {
        let vc = params.ordering_vc().cloned();
        for i in (0..self.entries.len()).rev() {
            match vc_cmp(self.entries[i].0.ordering_vc(), vc.as_ref()) {
                Some(Ordering::Equal) => {
                    self.entries[i] = (params, snapshot);
                    return;
                }
                Some(Ordering::Less) => {
                    self.entries.insert(i + 1, (params, snapshot));
                    return;
                }
                // Dominating or concurrent entries stay younger; keep
                // walking toward the old end.
                Some(Ordering::Greater) | None => {}
            }
        }
        self.entries.insert(0, (params, snapshot));
    }

    /// The youngest entry whose ordering vector is `<= target`, and whether
    /// that entry is the youngest in the dict.
    pub fn get_smaller(
        &self,
        target: &VectorClock,
    ) -> Option<(&SnapshotCommitParams, &Snapshot, bool)> {
        let newest = self.entries.len().checked_sub(1)?;
        for i in (0..=newest).rev() {
            let (params, snapshot) = &self.entries[i];
            if vc_le(params.ordering_vc(), Some(target)) {
                return Some((params, snapshot, i == newest));
            }
        }
        None
    }

    /// The youngest entry.
    pub fn last(&self) -> Option<&(SnapshotCommitParams, Snapshot)> {
        self.entries.last()
    }

    /// The `n` youngest entries, youngest first.
    pub fn sublist(&self, n: usize) -> impl Iterator<Item = &(SnapshotCommitParams, Snapshot)> {
        self.entries.iter().rev().take(n)
    }

    /// All entries, oldest first.
    pub fn to_list(&self) -> &[(SnapshotCommitParams, Snapshot)] {
        &self.entries
    }

    /// Drops everything but the `n` youngest entries.
    pub(crate) fn retain_youngest(&mut self, n: usize) {
        if self.entries.len() > n {
            self.entries.drain(..self.entries.len() - n);
        }
    }
}

/// The partition's snapshot-cache table.
pub struct SnapshotCache {
    name: String,
    registry: Arc<TableRegistry>,
    entries: RwLock<HashMap<Key, Arc<RwLock<VectorOrdDict>>>>,
}

impl SnapshotCache {
    pub fn open(partition: PartitionId, registry: Arc<TableRegistry>) -> Result<Self, TableError> {
        let name = format!("snapshot_cache-{}", partition.0);
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

    pub(crate) fn dict(&self, key: &Key) -> Option<Arc<RwLock<VectorOrdDict>>> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn dict_or_create(&self, key: &Key) -> Arc<RwLock<VectorOrdDict>> {
        if let Some(dict) = self.dict(key) {
            return dict;
        }
        self.entries
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(VectorOrdDict::new())))
            .clone()
    }

    /// Clone-out read of the youngest compatible snapshot.
    pub fn get_smaller(
        &self,
        key: &Key,
        target: &VectorClock,
    ) -> Option<(Snapshot, SnapshotCommitParams, bool)> {
        let dict = self.dict(key)?;
        let dict = dict.read();
        dict.get_smaller(target)
            .map(|(params, snapshot, is_first)| (snapshot.clone(), params.clone(), is_first))
    }

    pub(crate) fn insert_bigger(
        &self,
        key: &Key,
        params: SnapshotCommitParams,
        snapshot: Snapshot,
    ) {
        let dict = self.dict_or_create(key);
        dict.write().insert_bigger(params, snapshot);
    }

    /// Snapshot count for `key`; 0 for a key with no dict yet.
    pub fn size(&self, key: &Key) -> usize {
        self.dict(key).map_or(0, |dict| dict.read().len())
    }

    pub fn last(&self, key: &Key) -> Option<(SnapshotCommitParams, Snapshot)> {
        self.dict(key).and_then(|dict| dict.read().last().cloned())
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
    use crate::crdt::CrdtValue;
    use meridian_vclock::DcId;
    use pretty_assertions::assert_eq;

    const DC1: DcId = DcId(1);
    const DC2: DcId = DcId(2);

    fn snap(n: u64) -> Snapshot {
        Snapshot {
            last_op_id: n,
            value: CrdtValue::GCounter(n),
        }
    }

    fn vc_params(ts: u64) -> SnapshotCommitParams {
        SnapshotCommitParams::Vc(VectorClock::singleton(DC1, ts))
    }

    #[test]
    fn orders_by_dominance() {
        let mut dict = VectorOrdDict::new();
        dict.insert_bigger(vc_params(10), snap(1));
        dict.insert_bigger(vc_params(30), snap(3));
        dict.insert_bigger(vc_params(20), snap(2));
        let ids: Vec<u64> = dict.to_list().iter().map(|(_, s)| s.last_op_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn blank_sorts_oldest() {
        let mut dict = VectorOrdDict::new();
        dict.insert_bigger(vc_params(10), snap(1));
        dict.insert_bigger(SnapshotCommitParams::None, snap(0));
        assert_eq!(dict.to_list()[0].1.last_op_id, 0);
        assert_eq!(dict.last().unwrap().1.last_op_id, 1);
    }

    #[test]
    fn equal_vectors_replace() {
        let mut dict = VectorOrdDict::new();
        dict.insert_bigger(vc_params(10), snap(1));
        dict.insert_bigger(vc_params(10), snap(2));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.last().unwrap().1.last_op_id, 2);
    }

    #[test]
    fn get_smaller_picks_youngest_dominated() {
        let mut dict = VectorOrdDict::new();
        dict.insert_bigger(vc_params(10), snap(1));
        dict.insert_bigger(vc_params(20), snap(2));
        dict.insert_bigger(vc_params(30), snap(3));

        let (_, s, is_first) = dict.get_smaller(&VectorClock::singleton(DC1, 25)).unwrap();
        assert_eq!(s.last_op_id, 2);
        assert!(!is_first);

        let (_, s, is_first) = dict.get_smaller(&VectorClock::singleton(DC1, 30)).unwrap();
        assert_eq!(s.last_op_id, 3);
        assert!(is_first);

        assert!(dict.get_smaller(&VectorClock::singleton(DC1, 9)).is_none());
    }

    #[test]
    fn concurrent_entries_coexist() {
        let mut dict = VectorOrdDict::new();
        dict.insert_bigger(
            SnapshotCommitParams::Vc(VectorClock::singleton(DC1, 1)),
            snap(1),
        );
        dict.insert_bigger(
            SnapshotCommitParams::Vc(VectorClock::singleton(DC2, 1)),
            snap(2),
        );
        assert_eq!(dict.len(), 2);

        // Only the matching branch is eligible for each one-sided read.
        let (_, s, _) = dict.get_smaller(&VectorClock::singleton(DC1, 5)).unwrap();
        assert_eq!(s.last_op_id, 1);
        let (_, s, _) = dict.get_smaller(&VectorClock::singleton(DC2, 5)).unwrap();
        assert_eq!(s.last_op_id, 2);
    }

    #[test]
    fn retain_youngest_bounds_the_dict() {
        let mut dict = VectorOrdDict::new();
        for ts in 1..=8 {
            dict.insert_bigger(vc_params(ts * 10), snap(ts));
        }
        let youngest: Vec<u64> = dict.sublist(2).map(|(_, s)| s.last_op_id).collect();
        assert_eq!(youngest, vec![8, 7]);

        dict.retain_youngest(3);
        let ids: Vec<u64> = dict.to_list().iter().map(|(_, s)| s.last_op_id).collect();
        assert_eq!(ids, vec![6, 7, 8]);
        dict.retain_youngest(5);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn cache_swallows_missing_keys() {
        let registry = Arc::new(TableRegistry::new());
        let cache = SnapshotCache::open(PartitionId(0), registry).unwrap();
        let key = Key::from("k");
        assert_eq!(cache.size(&key), 0);
        assert!(cache.last(&key).is_none());
        assert!(cache.get_smaller(&key, &VectorClock::new()).is_none());
    }
}
