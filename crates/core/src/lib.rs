//! The per-partition materializer for the meridian store.
//!
//! A partition keeps two in-memory caches over a persistent commit log: an
//! operation cache holding committed CRDT operations per key, and a snapshot
//! cache holding materialized values keyed by vector clock. Reads reconstruct
//! the value of a key as of an arbitrary causal snapshot by replaying cached
//! operations on top of the youngest compatible cached snapshot; garbage
//! collection bounds both caches. The log remains the source of truth: the
//! caches are rebuilt from it on startup and never persisted.

pub mod clock;
pub mod config;
pub mod crdt;
pub mod error;
pub mod materializer;
pub mod node;
pub mod oplog;
pub mod ops_cache;
pub mod partition;
pub mod protocol;
pub mod ring;
pub mod snapshot_cache;
pub mod tables;
pub mod tx;

mod gc;
mod handoff;

pub use meridian_vclock::{DcId, VectorClock};

pub use crate::config::PartitionConfig;
pub use crate::crdt::{CrdtOp, CrdtType, CrdtValue, PublicValue};
pub use crate::error::{CoreError, ReadError, UpdateError};
pub use crate::materializer::Materializer;
pub use crate::node::Node;
pub use crate::partition::Partition;
pub use crate::protocol::{
    PhysicsReadMeta, ProtocolContext, SnapshotCommitParams, TransactionProtocol,
};
pub use crate::ring::{NodeId, PartitionId, Ring};
pub use crate::tx::{Key, Operation, Snapshot, Transaction, TxnId};
