//! The materialize engine.
//!
//! A read selects the youngest cached snapshot not exceeding the requested
//! vector, replays the compatible trailing operations from the operation
//! cache through the CRDT registry, and hands the result back together with
//! per-protocol commit metadata. A freshly computed snapshot flows back into
//! the snapshot cache: asynchronously through the partition's command
//! processor for client transactions, synchronously in place for the
//! sentinel transactions that internal reads run under.
//!
//! The write path lives here too: inserting an operation may trigger a
//! GC-inducing read, which may prune both caches before the new operation is
//! appended. The nested read always carries a sentinel transaction id, which
//! is what breaks the insert/read/store recursion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use meridian_vclock::VectorClock;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::clock::now_micros;
use crate::config::{OPS_THRESHOLD, PartitionConfig, SNAPSHOT_THRESHOLD};
use crate::crdt::{CrdtType, PublicValue};
use crate::error::{ReadError, TableError, UpdateError};
use crate::gc;
use crate::oplog::Log;
use crate::ops_cache::{OpsCache, OpsView};
use crate::protocol::{
    self, PhysicsCommitParams, PhysicsReadMeta, ProtocolContext, SnapshotCommitParams,
    TransactionProtocol,
};
use crate::ring::PartitionId;
use crate::snapshot_cache::SnapshotCache;
use crate::tables::TableRegistry;
use crate::tx::{Key, Operation, Snapshot, Transaction, TxnId};

/// A snapshot writeback deferred to the partition's command processor.
#[derive(Debug)]
pub struct StoreRequest {
    pub key: Key,
    pub params: SnapshotCommitParams,
    pub snapshot: Snapshot,
}

/// The per-partition materializer: both caches plus the engine over them.
///
/// Reads require only `&self` and run on the caller's thread; writes and GC
/// are expected to come in through the partition's single command processor,
/// which is what makes the per-key multi-step updates race-free.
pub struct Materializer {
    partition: PartitionId,
    config: PartitionConfig,
    ops: OpsCache,
    snapshots: SnapshotCache,
    log: Arc<dyn Log>,
    store_tx: mpsc::UnboundedSender<StoreRequest>,
    /// Present only on standalone materializers, which have no command
    /// processor to drain the writeback queue.
    store_rx: Option<Mutex<mpsc::UnboundedReceiver<StoreRequest>>>,
    ready: AtomicBool,
}

impl Materializer {
    pub(crate) fn for_partition(
        partition: PartitionId,
        config: PartitionConfig,
        ops: OpsCache,
        snapshots: SnapshotCache,
        log: Arc<dyn Log>,
        store_tx: mpsc::UnboundedSender<StoreRequest>,
    ) -> Self {
        Self {
            partition,
            config,
            ops,
            snapshots,
            log,
            store_tx,
            store_rx: None,
            ready: AtomicBool::new(false),
        }
    }

    /// A materializer without a partition actor, for direct embedding.
    ///
    /// Asynchronous writebacks queue up until [`Self::flush_writebacks`]
    /// applies them; sentinel transactions store synchronously as always.
    pub fn standalone(
        partition: PartitionId,
        config: PartitionConfig,
        log: Arc<dyn Log>,
        registry: Arc<TableRegistry>,
    ) -> Result<Self, TableError> {
        let ops = OpsCache::open(partition, registry.clone())?;
        let snapshots = SnapshotCache::open(partition, registry)?;
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        Ok(Self {
            partition,
            config,
            ops,
            snapshots,
            log,
            store_tx,
            store_rx: Some(Mutex::new(store_rx)),
            ready: AtomicBool::new(true),
        })
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn ops(&self) -> &OpsCache {
        &self.ops
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    pub(crate) fn log(&self) -> &dyn Log {
        &*self.log
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Drains queued asynchronous writebacks in place (standalone only).
    pub fn flush_writebacks(&self) {
        if let Some(store_rx) = &self.store_rx {
            while let Ok(req) = store_rx.lock().try_recv() {
                self.handle_store(req);
            }
        }
    }

    /// Reads `key` as of `txn`'s snapshot.
    pub fn read(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<(Snapshot, SnapshotCommitParams), ReadError> {
        if !self.is_ready() {
            return Err(ReadError::NotReady(self.partition));
        }
        self.internal_read(key, ty, txn, false)
    }

    /// Like [`Self::read`], extracting the public value.
    pub fn read_value(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<PublicValue, ReadError> {
        self.read(key, ty, txn)
            .map(|(snapshot, _)| snapshot.value.public())
    }

    /// Asynchronous snapshot hint from a coordinator.
    pub fn store_ss(&self, key: Key, snapshot: Snapshot, params: SnapshotCommitParams) {
        // A closed channel means the partition is shutting down; the hint is
        // droppable by contract.
        let _ = self.store_tx.send(StoreRequest {
            key,
            params,
            snapshot,
        });
    }

    /// Inserts a committed operation, possibly triggering a GC-inducing read
    /// first. The operation is appended only after any pruning completes.
    pub fn op_insert_gc(&self, op: Operation) -> Result<(), UpdateError> {
        let key = op.key.clone();
        let entry = self.ops.entry_or_create(&key);
        let new_id = entry.write().bump_op_id();
        let (len, capacity) = {
            let entry = entry.read();
            (entry.len(), entry.capacity())
        };
        if len >= capacity || new_id % OPS_THRESHOLD as u64 == 0 {
            let gc_txn = self.gc_transaction(&op);
            self.internal_read(&key, op.crdt_type, &gc_txn, true)
                .map_err(|e| UpdateError::OpGc(Box::new(e)))?;
        }
        entry.write().append(new_id, op);
        Ok(())
    }

    /// The synthesized read context for write-triggered GC. Carries the
    /// log-replay sentinel so the nested read's writeback happens in place.
    fn gc_transaction(&self, op: &Operation) -> Transaction {
        match self.config.protocol {
            TransactionProtocol::Physics => {
                let snapshot_vc = if op.dependency_vc.is_empty() {
                    VectorClock::singleton(self.config.dc_id, now_micros())
                } else {
                    op.dependency_vc.clone()
                };
                let meta = PhysicsReadMeta {
                    commit_time_lowbound: VectorClock::new(),
                    dep_upbound: snapshot_vc.clone(),
                };
                Transaction::physics(TxnId::LogReplay, snapshot_vc, meta)
            }
            TransactionProtocol::ClockSi => {
                Transaction::clocksi(TxnId::LogReplay, op.snapshot_vc.clone())
            }
            TransactionProtocol::Gr => Transaction::gr(TxnId::LogReplay, op.snapshot_vc.clone()),
        }
    }

    pub(crate) fn internal_read(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
        should_gc: bool,
    ) -> Result<(Snapshot, SnapshotCommitParams), ReadError> {
        let protocol = self.config.protocol;

        // Unseen key: the empty value under initial commit params. No cache
        // entries are created; the key stays lazy until its first update.
        let Some(view) = self.ops.lookup_element(key) else {
            return Ok((Snapshot::empty(ty), self.initial_params(txn)));
        };

        let (effective_vc, temp_params) = match &txn.context {
            ProtocolContext::Physics(meta) => match self.adjust_read_vector(&view, meta) {
                Ok(anchor) => anchor,
                Err(ReadError::NoCompatibleOperation) => {
                    // Revert to the transaction's dependency upper bound.
                    let up = meta.dep_upbound.clone();
                    let params = PhysicsCommitParams {
                        commit_vc: up.clone(),
                        dependency_vc: up.clone(),
                        read_vc: up.clone(),
                    };
                    (up, SnapshotCommitParams::Physics(params))
                }
                Err(e) => return Err(e),
            },
            ProtocolContext::ClockSi | ProtocolContext::Gr => {
                (txn.snapshot_vc.clone(), SnapshotCommitParams::None)
            }
        };

        let (base, base_params, is_first) = if !self.snapshots.member(key) {
            // First read of the key: seed the dict with a blank snapshot so
            // later GC has an anchor.
            let blank = Snapshot::empty(ty);
            self.store_snapshot(key, txn, SnapshotCommitParams::None, blank.clone(), false);
            (blank, SnapshotCommitParams::None, true)
        } else {
            match self.base_snapshot(key, &effective_vc) {
                Ok(hit) => hit,
                Err(ReadError::NoSnapshot) => {
                    // Every cached snapshot is younger than the request; the
                    // log still has the full history.
                    log::trace!(
                        "{}: snapshot miss for {key:?} at {effective_vc:?}, falling back to log",
                        self.partition
                    );
                    let fallback = self.log.get(self.partition, txn, ty, key)?;
                    (fallback.snapshot, fallback.commit_params, fallback.is_first)
                }
                Err(e) => return Err(e),
            }
        };

        // Replay every cached op the snapshot has not absorbed and the
        // request can see, in op-id order.
        let mut value = base.value.clone();
        let mut last_op_id = base.last_op_id;
        let mut commit_acc = base_params.commit_vc().cloned().unwrap_or_default();
        let mut applied = 0usize;
        for (op_id, op) in &view.ops {
            if *op_id <= base.last_op_id {
                continue;
            }
            let commit_vc = op.commit_vc(protocol);
            if !commit_vc.le(&effective_vc) {
                continue;
            }
            if !protocol::op_not_already_in_snapshot(&base_params, &commit_vc) {
                continue;
            }
            value = value.apply(&op.op_param)?;
            last_op_id = *op_id;
            commit_acc.merge_max(&commit_vc);
            applied += 1;
        }

        let snapshot = Snapshot { last_op_id, value };
        let commit_params = match protocol {
            TransactionProtocol::Physics => temp_params,
            TransactionProtocol::ClockSi | TransactionProtocol::Gr => {
                SnapshotCommitParams::Vc(commit_acc)
            }
        };

        // Persist only snapshots that extend the youngest entry; an old
        // reconstruction must not churn the dict.
        if applied > 0 && is_first {
            self.store_snapshot(key, txn, commit_params.clone(), snapshot.clone(), should_gc);
        } else if should_gc {
            self.store_and_maybe_gc(key, None, true);
        }

        Ok((snapshot, commit_params))
    }

    fn initial_params(&self, txn: &Transaction) -> SnapshotCommitParams {
        match &txn.context {
            ProtocolContext::Physics(_) => SnapshotCommitParams::Physics(PhysicsCommitParams {
                commit_vc: VectorClock::new(),
                dependency_vc: VectorClock::new(),
                read_vc: VectorClock::singleton(self.config.dc_id, now_micros()),
            }),
            ProtocolContext::ClockSi | ProtocolContext::Gr => {
                SnapshotCommitParams::Vc(VectorClock::new())
            }
        }
    }

    /// The youngest cached snapshot whose vector does not exceed `target`.
    /// Fails with [`ReadError::NoSnapshot`] when the dict holds no such
    /// entry; the caller falls back to the log.
    fn base_snapshot(
        &self,
        key: &Key,
        target: &VectorClock,
    ) -> Result<(Snapshot, SnapshotCommitParams, bool), ReadError> {
        self.snapshots
            .get_smaller(key, target)
            .ok_or(ReadError::NoSnapshot)
    }

    /// Physics read-vector adjustment: anchor the read on the youngest
    /// cached operation whose dependencies are compatible with the
    /// transaction's bounds.
    ///
    /// A rejected candidate lowers the local-DC ceiling to one tick below
    /// its commit time before the scan moves on, so the search is bounded by
    /// a single pass over the observed prefix. Exhaustion fails with
    /// [`ReadError::NoCompatibleOperation`]; the caller reverts to the
    /// transaction's dependency upper bound.
    fn adjust_read_vector(
        &self,
        view: &OpsView,
        meta: &PhysicsReadMeta,
    ) -> Result<(VectorClock, SnapshotCommitParams), ReadError> {
        let local = self.config.dc_id;
        let now = now_micros();
        let mut local_cap: Option<u64> = None;
        for (_, op) in view.ops.iter().rev() {
            let commit_vc = op.commit_vc(TransactionProtocol::Physics);
            let mut local_ts = now.max(commit_vc.get(local));
            if let Some(cap) = local_cap {
                local_ts = local_ts.min(cap);
            }
            let mut read_vc = op.dependency_vc.clone();
            read_vc.set(local, local_ts);
            if protocol::is_causally_compatible(
                &read_vc,
                &meta.commit_time_lowbound,
                &op.dependency_vc,
                &meta.dep_upbound,
            ) {
                let params = PhysicsCommitParams {
                    commit_vc: commit_vc.clone(),
                    dependency_vc: op.dependency_vc.clone(),
                    read_vc,
                };
                return Ok((commit_vc, SnapshotCommitParams::Physics(params)));
            }
            local_cap = Some(commit_vc.get(local).saturating_sub(1));
        }
        Err(ReadError::NoCompatibleOperation)
    }

    /// Routes a snapshot writeback: sentinel transactions store in place
    /// (which is what terminates the insert/read/store recursion), client
    /// transactions defer to the command processor.
    fn store_snapshot(
        &self,
        key: &Key,
        txn: &Transaction,
        params: SnapshotCommitParams,
        snapshot: Snapshot,
        should_gc: bool,
    ) {
        if txn.txn_id.is_sentinel() {
            self.store_and_maybe_gc(key, Some((params, snapshot)), should_gc);
        } else {
            self.store_ss(key.clone(), snapshot, params);
        }
    }

    /// Installs a snapshot (if any) and runs snapshot GC when forced or when
    /// the dict has reached the threshold.
    pub(crate) fn store_and_maybe_gc(
        &self,
        key: &Key,
        payload: Option<(SnapshotCommitParams, Snapshot)>,
        should_gc: bool,
    ) {
        if let Some((params, snapshot)) = payload {
            self.snapshots.insert_bigger(key, params, snapshot);
        }
        if should_gc || self.snapshots.size(key) >= SNAPSHOT_THRESHOLD {
            gc::collect(self, key);
        }
    }

    /// Applies a deferred writeback on the command processor.
    pub(crate) fn handle_store(&self, req: StoreRequest) {
        self.store_and_maybe_gc(&req.key, Some((req.params, req.snapshot)), false);
    }

    /// Drops both cache tables and releases their names.
    pub(crate) fn teardown(&self) {
        self.ops.destroy();
        self.snapshots.destroy();
    }

    /// Empties both caches after a completed handoff; the tables stay
    /// registered until terminate.
    pub(crate) fn clear_caches(&self) {
        self.ops.clear();
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::CrdtOp;
    use crate::oplog::MemoryLog;
    use meridian_vclock::DcId;
    use pretty_assertions::assert_eq;

    const P: PartitionId = PartitionId(0);
    const DC1: DcId = DcId(1);
    const DC2: DcId = DcId(2);

    fn clocksi_materializer() -> Materializer {
        Materializer::standalone(
            P,
            PartitionConfig::new(TransactionProtocol::ClockSi, DC1),
            Arc::new(MemoryLog::new()),
            Arc::new(TableRegistry::new()),
        )
        .unwrap()
    }

    fn physics_materializer() -> Materializer {
        Materializer::standalone(
            P,
            PartitionConfig::new(TransactionProtocol::Physics, DC1),
            Arc::new(MemoryLog::new()),
            Arc::new(TableRegistry::new()),
        )
        .unwrap()
    }

    fn inc(key: &Key, snapshot_vc: VectorClock, dc: DcId, commit_time: u64) -> Operation {
        Operation {
            key: key.clone(),
            crdt_type: CrdtType::GCounter,
            op_param: CrdtOp::Increment(1),
            snapshot_vc: snapshot_vc.clone(),
            dependency_vc: snapshot_vc,
            dc_and_commit_time: (dc, commit_time),
            txid: TxnId::Client(1),
        }
    }

    fn read_counter(m: &Materializer, key: &Key, vc: VectorClock) -> i64 {
        m.read_value(key, CrdtType::GCounter, &Transaction::clocksi(TxnId::Test, vc))
            .unwrap()
            .as_counter()
            .unwrap()
    }

    #[test]
    fn unseen_key_reads_empty() {
        let m = clocksi_materializer();
        let key = Key::from("nothing");
        let txn = Transaction::clocksi(TxnId::Test, VectorClock::singleton(DC1, 99));
        let (snapshot, params) = m.read(&key, CrdtType::GCounter, &txn).unwrap();
        assert_eq!(snapshot, Snapshot::empty(CrdtType::GCounter));
        assert_eq!(params, SnapshotCommitParams::Vc(VectorClock::new()));
        // Step 1 creates nothing.
        assert!(!m.ops().member(&key));
        assert!(!m.snapshots().member(&key));
    }

    #[test]
    fn reads_are_bounded_by_the_requested_vector() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        assert_eq!(read_counter(&m, &key, VectorClock::singleton(DC1, 16)), 1);

        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 20)).unwrap();
        assert_eq!(read_counter(&m, &key, VectorClock::singleton(DC1, 21)), 2);
        // The older view stays stable even though a snapshot at 20 exists.
        assert_eq!(read_counter(&m, &key, VectorClock::singleton(DC1, 16)), 1);
    }

    #[test]
    fn sentinel_reads_store_snapshots_in_place() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        assert_eq!(m.snapshots().size(&key), 0);
        read_counter(&m, &key, VectorClock::singleton(DC1, 16));
        // Blank seed plus the computed snapshot.
        assert_eq!(m.snapshots().size(&key), 2);
        let (params, snapshot) = m.snapshots().last(&key).unwrap();
        assert_eq!(snapshot.last_op_id, 1);
        assert_eq!(params, SnapshotCommitParams::Vc(VectorClock::singleton(DC1, 15)));
    }

    #[test]
    fn client_reads_defer_writeback_to_the_processor() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        let txn = Transaction::clocksi(TxnId::Client(9), VectorClock::singleton(DC1, 16));
        let (snapshot, _) = m.read(&key, CrdtType::GCounter, &txn).unwrap();
        assert_eq!(snapshot.value, crate::crdt::CrdtValue::GCounter(1));
        // Nothing lands until the queue drains.
        assert_eq!(m.snapshots().size(&key), 0);
        m.flush_writebacks();
        assert_eq!(m.snapshots().size(&key), 2);
    }

    #[test]
    fn second_read_reuses_the_stored_snapshot() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        read_counter(&m, &key, VectorClock::singleton(DC1, 16));
        let before = m.snapshots().size(&key);
        // Same vector again: base is the stored snapshot, nothing applies,
        // nothing new is stored.
        assert_eq!(read_counter(&m, &key, VectorClock::singleton(DC1, 16)), 1);
        assert_eq!(m.snapshots().size(&key), before);
    }

    #[test]
    fn multi_dc_reads_merge_what_they_dominate() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        m.op_insert_gc(inc(&key, VectorClock::new(), DC2, 20)).unwrap();

        let one_sided = VectorClock::singleton(DC1, 16);
        assert_eq!(read_counter(&m, &key, one_sided), 1);
        let both = VectorClock::singleton(DC1, 16).with(DC2, 21);
        assert_eq!(read_counter(&m, &key, both), 2);
    }

    #[test]
    fn write_triggered_gc_fires_on_the_insert_period() {
        let m = clocksi_materializer();
        let key = Key::from("k");
        let snapshot_vc = VectorClock::singleton(DC1, 10);
        for i in 0..(OPS_THRESHOLD as u64) {
            m.op_insert_gc(inc(&key, snapshot_vc.clone(), DC1, 11 + i)).unwrap();
        }
        // The 50th insert ran a GC-inducing read, which seeded the dict and
        // doubled the crowded ring.
        assert!(m.snapshots().member(&key));
        let view = m.ops().lookup_element(&key).unwrap();
        assert_eq!(view.len, OPS_THRESHOLD);
        assert_eq!(view.capacity, OPS_THRESHOLD * 2);
        assert_eq!(
            read_counter(&m, &key, VectorClock::singleton(DC1, 2000)),
            OPS_THRESHOLD as i64
        );
    }

    #[test]
    fn log_fallback_serves_vectors_below_every_snapshot() {
        let log = Arc::new(MemoryLog::new());
        let key = Key::from("k");
        // History the cache no longer holds.
        log.append(P, inc(&key, VectorClock::new(), DC1, 5));
        let m = Materializer::standalone(
            P,
            PartitionConfig::new(TransactionProtocol::ClockSi, DC1),
            log,
            Arc::new(TableRegistry::new()),
        )
        .unwrap();

        m.op_insert_gc(inc(&key, VectorClock::new(), DC1, 15)).unwrap();
        read_counter(&m, &key, VectorClock::singleton(DC1, 16));
        // Force the dict to hold only entries above the request.
        {
            let dict = m.snapshots().dict(&key).unwrap();
            let mut dict = dict.write();
            dict.retain_youngest(1);
        }
        assert_eq!(read_counter(&m, &key, VectorClock::singleton(DC1, 6)), 1);
    }

    #[test]
    fn physics_read_anchors_on_the_youngest_compatible_op() {
        let m = physics_materializer();
        let key = Key::from("k");
        let deps = VectorClock::singleton(DC2, 4);
        let mut op = inc(&key, VectorClock::new(), DC1, 30);
        op.dependency_vc = deps.clone();
        m.op_insert_gc(op).unwrap();

        let meta = PhysicsReadMeta {
            commit_time_lowbound: VectorClock::new(),
            dep_upbound: VectorClock::singleton(DC2, 10),
        };
        let txn = Transaction::physics(TxnId::Test, VectorClock::new(), meta);
        let (snapshot, params) = m.read(&key, CrdtType::GCounter, &txn).unwrap();
        assert_eq!(snapshot.value, crate::crdt::CrdtValue::GCounter(1));
        match params {
            SnapshotCommitParams::Physics(p) => {
                assert_eq!(p.commit_vc, deps.with_commit(DC1, 30));
                assert_eq!(p.dependency_vc, deps);
                assert!(p.read_vc.get(DC1) >= 30);
                assert_eq!(p.read_vc.get(DC2), 4);
            }
            other => panic!("expected physics params, got {other:?}"),
        }
    }

    #[test]
    fn physics_read_reverts_to_the_dep_upbound() {
        let m = physics_materializer();
        let key = Key::from("k");
        let mut op = inc(&key, VectorClock::new(), DC1, 30);
        // Dependencies the transaction's upper bound cannot cover.
        op.dependency_vc = VectorClock::singleton(DC2, 50);
        m.op_insert_gc(op).unwrap();

        let up = VectorClock::singleton(DC2, 10);
        let meta = PhysicsReadMeta {
            commit_time_lowbound: VectorClock::new(),
            dep_upbound: up.clone(),
        };
        let txn = Transaction::physics(TxnId::Test, VectorClock::new(), meta);
        let (snapshot, params) = m.read(&key, CrdtType::GCounter, &txn).unwrap();
        // Nothing is visible at the bound.
        assert_eq!(snapshot.value, crate::crdt::CrdtValue::GCounter(0));
        match params {
            SnapshotCommitParams::Physics(p) => {
                assert_eq!(p.commit_vc, up);
                assert_eq!(p.dependency_vc, up);
                assert_eq!(p.read_vc, up);
            }
            other => panic!("expected physics params, got {other:?}"),
        }
    }

    #[test]
    fn not_ready_rejects_reads() {
        let m = clocksi_materializer();
        m.set_ready(false);
        let err = m
            .read(
                &Key::from("k"),
                CrdtType::GCounter,
                &Transaction::clocksi(TxnId::Test, VectorClock::new()),
            )
            .unwrap_err();
        assert!(matches!(err, ReadError::NotReady(p) if p == P));
    }
}
