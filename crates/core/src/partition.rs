//! The partition: a single-threaded command processor over shared caches.
//!
//! Every mutation of the caches (updates, deferred snapshot writebacks, GC,
//! rehydration inserts, handoff) flows through one actor task, which is the
//! discipline that makes per-key multi-step updates race-free. Reads bypass
//! the actor entirely and run on the caller's thread against the shared
//! tables.
//!
//! Rehydration is a small state machine: `Loading` streams the commit log in
//! pages (retrying while the log reports not-ready) and transitions to
//! `Ready`; fatal errors demote to `Ready` with partial state rather than
//! wedging the partition.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::{LOG_STARTUP_WAIT, PartitionConfig, TABLE_RETRY};
use crate::crdt::{CrdtType, PublicValue};
use crate::error::{HandoffError, LogError, ReadError, TableError, UpdateError};
use crate::handoff;
use crate::materializer::{Materializer, StoreRequest};
use crate::oplog::{Continuation, Log, LogChunk, OpsByKey};
use crate::ops_cache::OpsCache;
use crate::protocol::SnapshotCommitParams;
use crate::ring::PartitionId;
use crate::snapshot_cache::SnapshotCache;
use crate::tables::TableRegistry;
use crate::tx::{Key, Operation, Snapshot, Transaction};

enum CmdOrExit {
    Cmd(Command),
    Exit,
}

enum Command {
    Update {
        op: Operation,
        reply: oneshot::Sender<Result<(), UpdateError>>,
    },
    CheckReady {
        reply: oneshot::Sender<bool>,
    },
    LoadFromLog {
        continuation: Option<Continuation>,
    },
    HandoffFold {
        reply: oneshot::Sender<Result<Vec<(Key, Vec<u8>)>, HandoffError>>,
    },
    HandoffData {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<(), HandoffError>>,
    },
    HandoffFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Loading,
    Ready,
}

/// Handle to a running partition.
#[derive(Clone)]
pub struct Partition {
    id: PartitionId,
    tx: mpsc::UnboundedSender<CmdOrExit>,
    materializer: Arc<Materializer>,
}

impl Partition {
    /// Creates the cache tables, waiting out a previous incarnation whose
    /// tables have not been reclaimed, and starts the command processor.
    pub async fn open(
        id: PartitionId,
        config: PartitionConfig,
        log: Arc<dyn Log>,
        registry: Arc<TableRegistry>,
    ) -> Self {
        let ops = open_table(id, &registry, OpsCache::open).await;
        let snapshots = open_table(id, &registry, SnapshotCache::open).await;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        let materializer = Arc::new(Materializer::for_partition(
            id, config, ops, snapshots, log, store_tx,
        ));

        let state = if config.recover_from_log {
            schedule_load(cmd_tx.downgrade(), None);
            State::Loading
        } else {
            materializer.set_ready(true);
            State::Ready
        };

        tokio::spawn(
            PartitionActor {
                id,
                state,
                materializer: materializer.clone(),
                cmd_rx,
                store_rx,
                // Weak, so dropping every handle still tears the actor down.
                self_tx: cmd_tx.downgrade(),
            }
            .run(),
        );

        Self {
            id,
            tx: cmd_tx,
            materializer,
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn config(&self) -> &PartitionConfig {
        self.materializer.config()
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Reads bypass the command processor and run on the caller's thread.
    pub fn read(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<(Snapshot, SnapshotCommitParams), ReadError> {
        self.materializer.read(key, ty, txn)
    }

    pub fn read_value(
        &self,
        key: &Key,
        ty: CrdtType,
        txn: &Transaction,
    ) -> Result<PublicValue, ReadError> {
        self.materializer.read_value(key, ty, txn)
    }

    /// Inserts a committed operation through the command processor.
    pub async fn update(&self, op: Operation) -> Result<(), UpdateError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Update { op, reply })
            .map_err(|_| UpdateError::PartitionClosed(self.id))?;
        rx.await.map_err(|_| UpdateError::PartitionClosed(self.id))?
    }

    /// Asynchronous snapshot hint; droppable by contract.
    pub fn store_ss(&self, key: Key, snapshot: Snapshot, params: SnapshotCommitParams) {
        self.materializer.store_ss(key, snapshot, params);
    }

    /// True only once rehydration has reached `Ready`.
    pub async fn check_ready(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::CheckReady { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Serializes the operation cache for migration.
    pub async fn handoff_fold(&self) -> Result<Vec<(Key, Vec<u8>)>, HandoffError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::HandoffFold { reply })
            .map_err(|_| HandoffError::PartitionClosed(self.id))?;
        rx.await
            .map_err(|_| HandoffError::PartitionClosed(self.id))?
    }

    /// Installs one received handoff item.
    pub async fn handle_handoff_data(&self, bytes: Vec<u8>) -> Result<(), HandoffError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::HandoffData { bytes, reply })
            .map_err(|_| HandoffError::PartitionClosed(self.id))?;
        rx.await
            .map_err(|_| HandoffError::PartitionClosed(self.id))?
    }

    /// The sender's caches are dropped once migration completes.
    pub fn handoff_finished(&self) {
        let _ = self.send(Command::HandoffFinished);
    }

    /// Terminates the partition; the actor destroys both tables on exit.
    pub fn close(&self) {
        let _ = self.tx.send(CmdOrExit::Exit);
    }

    fn send(&self, cmd: Command) -> Result<(), mpsc::error::SendError<CmdOrExit>> {
        self.tx.send(CmdOrExit::Cmd(cmd))
    }
}

/// Retries table creation at [`TABLE_RETRY`] while a prior incarnation's
/// table with the same name has not been reclaimed.
async fn open_table<T>(
    id: PartitionId,
    registry: &Arc<TableRegistry>,
    open: impl Fn(PartitionId, Arc<TableRegistry>) -> Result<T, TableError>,
) -> T {
    loop {
        match open(id, registry.clone()) {
            Ok(table) => return table,
            Err(TableError::Exists(name)) => {
                log::warn!("{id}: table `{name}` not reclaimed yet, retrying");
                tokio::time::sleep(TABLE_RETRY).await;
            }
            Err(TableError::NotFound(name)) => {
                unreachable!("table creation cannot miss `{name}`")
            }
        }
    }
}

fn schedule_load(tx: mpsc::WeakUnboundedSender<CmdOrExit>, continuation: Option<Continuation>) {
    tokio::spawn(async move {
        tokio::time::sleep(LOG_STARTUP_WAIT).await;
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(CmdOrExit::Cmd(Command::LoadFromLog { continuation }));
        }
    });
}

struct PartitionActor {
    id: PartitionId,
    state: State,
    materializer: Arc<Materializer>,
    cmd_rx: mpsc::UnboundedReceiver<CmdOrExit>,
    store_rx: mpsc::UnboundedReceiver<StoreRequest>,
    self_tx: mpsc::WeakUnboundedSender<CmdOrExit>,
}

impl PartitionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(CmdOrExit::Cmd(cmd)) => self.handle_command(cmd),
                    Some(CmdOrExit::Exit) | None => break,
                },
                Some(req) = self.store_rx.recv() => self.materializer.handle_store(req),
            }
        }
        log::trace!("{}: terminating, dropping cache tables", self.id);
        self.materializer.teardown();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Update { op, reply } => {
                let _ = reply.send(self.materializer.op_insert_gc(op));
            }
            Command::CheckReady { reply } => {
                let _ = reply.send(self.state == State::Ready);
            }
            Command::LoadFromLog { continuation } => self.load_from_log(continuation),
            Command::HandoffFold { reply } => {
                let _ = reply.send(handoff::fold(self.materializer.ops()));
            }
            Command::HandoffData { bytes, reply } => {
                let _ = reply.send(handoff::receive(self.materializer.ops(), &bytes));
            }
            Command::HandoffFinished => {
                log::trace!("{}: handoff finished, clearing caches", self.id);
                self.materializer.clear_caches();
            }
        }
    }

    fn load_from_log(&mut self, continuation: Option<Continuation>) {
        match self.materializer.log().get_all(self.id, continuation) {
            Ok(LogChunk::Page {
                continuation,
                ops_by_key,
            }) => {
                self.insert_page(ops_by_key);
                if let Some(tx) = self.self_tx.upgrade() {
                    let _ = tx.send(CmdOrExit::Cmd(Command::LoadFromLog {
                        continuation: Some(continuation),
                    }));
                }
            }
            Ok(LogChunk::Eof(ops_by_key)) => {
                self.insert_page(ops_by_key);
                self.become_ready();
                log::info!("{}: log replay complete", self.id);
            }
            Err(LogError::NotReady(_)) => {
                log::debug!("{}: log not ready, retrying", self.id);
                schedule_load(self.self_tx.clone(), continuation);
            }
            Err(e) => {
                log::error!(
                    "{}: rehydration failed ({e}), continuing with partial state",
                    self.id
                );
                self.become_ready();
            }
        }
    }

    fn insert_page(&self, ops_by_key: OpsByKey) {
        for (key, ops) in ops_by_key {
            for op in ops {
                if let Err(e) = self.materializer.op_insert_gc(op) {
                    log::error!("{}: replay insert failed for {key:?}: {e}", self.id);
                }
            }
        }
    }

    fn become_ready(&mut self) {
        self.state = State::Ready;
        self.materializer.set_ready(true);
    }
}
