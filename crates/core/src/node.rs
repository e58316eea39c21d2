//! Node-level routing over the ring.
//!
//! Coordinators address keys, not partitions; the node resolves a key's
//! preference list and forwards to the primary. Readiness aggregates across
//! every partition the node hosts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PartitionConfig;
use crate::crdt::{CrdtType, PublicValue};
use crate::error::{CoreError, UpdateError};
use crate::oplog::Log;
use crate::partition::Partition;
use crate::protocol::SnapshotCommitParams;
use crate::ring::{ModRing, NodeId, PartitionId, Ring};
use crate::tables::TableRegistry;
use crate::tx::{Key, Operation, Snapshot, Transaction};

pub struct Node {
    ring: Arc<dyn Ring>,
    partitions: HashMap<PartitionId, Partition>,
}

impl Node {
    /// Spawns `partition_count` partitions behind a mod-ring on this node.
    pub async fn open(
        config: PartitionConfig,
        partition_count: u64,
        log: Arc<dyn Log>,
    ) -> Self {
        let registry = Arc::new(TableRegistry::new());
        let ring: Arc<dyn Ring> = Arc::new(ModRing::new(partition_count, NodeId(0)));
        let mut partitions = HashMap::new();
        for p in 0..partition_count {
            let id = PartitionId(p);
            let partition = Partition::open(id, config, log.clone(), registry.clone()).await;
            partitions.insert(id, partition);
        }
        Self { ring, partitions }
    }

    /// The primary for `key`, per the ring's preference list.
    fn owner(&self, key: &Key) -> Result<&Partition, UpdateError> {
        let preflist = self.ring.preflist_from_key(key);
        preflist
            .first()
            .and_then(|(partition, _)| self.partitions.get(partition))
            .ok_or_else(|| UpdateError::NoOwner(key.clone()))
    }

    /// Routes an update to the owning partition's command processor.
    pub async fn update(&self, op: Operation) -> Result<(), UpdateError> {
        self.owner(&op.key)?.update(op).await
    }

    /// Reads directly against the owning partition's caches.
    pub fn read(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<(Snapshot, SnapshotCommitParams), CoreError> {
        Ok(self.owner(key)?.read(key, ty, txn)?)
    }

    pub fn read_value(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<PublicValue, CoreError> {
        Ok(self.owner(key)?.read_value(key, ty, txn)?)
    }

    /// Asynchronous snapshot hint; dropped if no partition owns the key.
    pub fn store_ss(&self, key: Key, snapshot: Snapshot, params: SnapshotCommitParams) {
        if let Ok(partition) = self.owner(&key) {
            partition.store_ss(key, snapshot, params);
        }
    }

    /// True once every partition on this node answers ready.
    pub async fn check_tables_ready(&self) -> bool {
        for partition in self.partitions.values() {
            if !partition.check_ready().await {
                return false;
            }
        }
        true
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.partitions.get(&id)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn close(&self) {
        for partition in self.partitions.values() {
            partition.close();
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}
