//! The commit-log contract.
//!
//! The log is the durable source of truth the caches are rebuilt from. The
//! materializer consumes it two ways: paged streaming of a partition's full
//! history at startup, and a point read when the snapshot cache has no entry
//! at or below a requested vector. Implementations live outside this crate;
//! [`MemoryLog`] is the in-memory one used by tests and by embedders that
//! keep their log elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use meridian_vclock::VectorClock;
use parking_lot::RwLock;

use crate::crdt::CrdtType;
use crate::error::LogError;
use crate::protocol::{PhysicsCommitParams, SnapshotCommitParams, TransactionProtocol};
use crate::ring::PartitionId;
use crate::tx::{Key, Operation, Snapshot, Transaction};

/// Opaque paging token handed back to [`Log::get_all`].
pub type Continuation = u64;

/// A slice of a partition's history, grouped by key.
pub type OpsByKey = HashMap<Key, Vec<Operation>>;

/// One step of streaming a partition's history.
#[derive(Debug)]
pub enum LogChunk {
    Page {
        continuation: Continuation,
        ops_by_key: OpsByKey,
    },
    Eof(OpsByKey),
}

/// The log's answer to a snapshot-cache miss: a snapshot materialized from
/// the full history, with the operations that produced it.
#[derive(Debug)]
pub struct LogRead {
    pub ops_len: usize,
    pub ops: Vec<Operation>,
    /// `last_op_id` is 0: log history predates the cache's id space, so
    /// replay dedup relies on the commit vector alone.
    pub snapshot: Snapshot,
    pub commit_params: SnapshotCommitParams,
    /// Always false for a log read; a snapshot reconstructed for an old
    /// vector must not displace the cache's youngest entry.
    pub is_first: bool,
}

pub trait Log: Send + Sync {
    /// Streams the partition's committed operations in pages.
    fn get_all(
        &self,
        partition: PartitionId,
        continuation: Option<Continuation>,
    ) -> Result<LogChunk, LogError>;

    /// Materializes `key` as of `txn`'s snapshot straight from the log.
    fn get(
        &self,
        partition: PartitionId,
        txn: &Transaction,
        ty: CrdtType,
        key: &Key,
    ) -> Result<LogRead, LogError>;
}

/// An in-memory commit log.
pub struct MemoryLog {
    page_size: usize,
    ready: AtomicBool,
    entries: RwLock<HashMap<PartitionId, Vec<Operation>>>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            page_size: 64,
            ready: AtomicBool::new(true),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        self.page_size = page_size;
        self
    }

    /// Flips the `not_ready` answer rehydration sees; used to exercise the
    /// retry path.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn append(&self, partition: PartitionId, op: Operation) {
        self.entries.write().entry(partition).or_default().push(op);
    }

    pub fn len(&self, partition: PartitionId) -> usize {
        self.entries.read().get(&partition).map_or(0, Vec::len)
    }
}

fn group_by_key(ops: &[Operation]) -> OpsByKey {
    ops.iter()
        .map(|op| (op.key.clone(), op.clone()))
        .into_group_map()
}

impl Log for MemoryLog {
    fn get_all(
        &self,
        partition: PartitionId,
        continuation: Option<Continuation>,
    ) -> Result<LogChunk, LogError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(LogError::NotReady(partition));
        }
        let entries = self.entries.read();
        let ops = entries.get(&partition).map_or(&[][..], Vec::as_slice);
        let start = (continuation.unwrap_or(0) as usize).min(ops.len());
        let end = (start + self.page_size).min(ops.len());
        let grouped = group_by_key(&ops[start..end]);
        if end == ops.len() {
            Ok(LogChunk::Eof(grouped))
        } else {
            Ok(LogChunk::Page {
                continuation: end as Continuation,
                ops_by_key: grouped,
            })
        }
    }

    fn get(
        &self,
        partition: PartitionId,
        txn: &Transaction,
        ty: CrdtType,
        key: &Key,
    ) -> Result<LogRead, LogError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(LogError::NotReady(partition));
        }
        let protocol = txn.protocol();
        let mut value = ty.new_value();
        let mut commit_acc = VectorClock::new();
        let mut applied = Vec::new();
        let entries = self.entries.read();
        for op in entries.get(&partition).map_or(&[][..], Vec::as_slice) {
            if op.key != *key {
                continue;
            }
            let commit_vc = op.commit_vc(protocol);
            if !commit_vc.le(&txn.snapshot_vc) {
                continue;
            }
            value = value
                .apply(&op.op_param)
                .map_err(|e| LogError::Other(anyhow::Error::new(e)))?;
            commit_acc.merge_max(&commit_vc);
            applied.push(op.clone());
        }
        let commit_params = match protocol {
            TransactionProtocol::Physics => SnapshotCommitParams::Physics(PhysicsCommitParams {
                commit_vc: commit_acc.clone(),
                dependency_vc: commit_acc,
                read_vc: txn.snapshot_vc.clone(),
            }),
            TransactionProtocol::ClockSi | TransactionProtocol::Gr => {
                SnapshotCommitParams::Vc(commit_acc)
            }
        };
        Ok(LogRead {
            ops_len: applied.len(),
            ops: applied,
            snapshot: Snapshot {
                last_op_id: 0,
                value,
            },
            commit_params,
            is_first: false,
        })
    }
}
