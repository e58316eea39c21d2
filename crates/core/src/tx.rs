//! Keys, operations, snapshots and read contexts.

use std::fmt;

use meridian_vclock::{DcId, VectorClock};
use serde::{Deserialize, Serialize};

use crate::crdt::{CrdtOp, CrdtType, CrdtValue};
use crate::protocol::{PhysicsReadMeta, ProtocolContext, TransactionProtocol};

/// An opaque key. The materializer never interprets the bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", String::from_utf8_lossy(&self.0))
    }
}

/// Transaction identifier.
///
/// The two sentinel values mark internal reads whose snapshot writeback must
/// happen synchronously in place: nested GC-inducing reads and log replays
/// would otherwise recurse through the asynchronous store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnId {
    Client(u64),
    Test,
    LogReplay,
}

impl TxnId {
    /// Sentinels take the synchronous in-place writeback path.
    pub fn is_sentinel(self) -> bool {
        matches!(self, TxnId::Test | TxnId::LogReplay)
    }
}

/// A committed CRDT operation as it appears in the commit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub key: Key,
    pub crdt_type: CrdtType,
    pub op_param: CrdtOp,
    /// The snapshot the operation was computed against.
    pub snapshot_vc: VectorClock,
    /// Causal dependencies; the physics protocol derives commit vectors from
    /// these instead of `snapshot_vc`.
    pub dependency_vc: VectorClock,
    /// Originating datacenter and its local commit timestamp.
    pub dc_and_commit_time: (DcId, u64),
    pub txid: TxnId,
}

impl Operation {
    /// The base vector the commit VC is derived from under `protocol`.
    pub fn base_vc(&self, protocol: TransactionProtocol) -> &VectorClock {
        match protocol {
            TransactionProtocol::Physics => &self.dependency_vc,
            TransactionProtocol::ClockSi | TransactionProtocol::Gr => &self.snapshot_vc,
        }
    }

    /// The commit vector: the base vector with the originating DC stamped at
    /// the operation's commit time.
    pub fn commit_vc(&self, protocol: TransactionProtocol) -> VectorClock {
        let (dc, commit_time) = self.dc_and_commit_time;
        self.base_vc(protocol).with_commit(dc, commit_time)
    }
}

/// A materialized value together with the id of the last operation folded
/// into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_op_id: u64,
    pub value: CrdtValue,
}

impl Snapshot {
    /// The blank snapshot for a type. Operation ids start at 1, so
    /// `last_op_id = 0` compares below every live operation.
    pub fn empty(ty: CrdtType) -> Self {
        Self {
            last_op_id: 0,
            value: ty.new_value(),
        }
    }
}

/// The read context a coordinator hands to the materializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub txn_id: TxnId,
    pub snapshot_vc: VectorClock,
    pub context: ProtocolContext,
}

impl Transaction {
    pub fn clocksi(txn_id: TxnId, snapshot_vc: VectorClock) -> Self {
        Self {
            txn_id,
            snapshot_vc,
            context: ProtocolContext::ClockSi,
        }
    }

    pub fn gr(txn_id: TxnId, snapshot_vc: VectorClock) -> Self {
        Self {
            txn_id,
            snapshot_vc,
            context: ProtocolContext::Gr,
        }
    }

    pub fn physics(txn_id: TxnId, snapshot_vc: VectorClock, meta: PhysicsReadMeta) -> Self {
        Self {
            txn_id,
            snapshot_vc,
            context: ProtocolContext::Physics(meta),
        }
    }

    pub fn protocol(&self) -> TransactionProtocol {
        self.context.protocol()
    }
}
