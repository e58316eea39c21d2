use thiserror::Error;

use crate::crdt::TypeMismatch;
use crate::protocol::UnknownProtocol;
use crate::ring::PartitionId;
use crate::tx::Key;

/// Failures surfaced by the external commit log.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("log for partition {0} is not ready")]
    NotReady(PartitionId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures surfaced by a materializer read.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The snapshot cache holds no entry at or below the requested vector.
    /// The read path catches this and falls back to the log; a log failure
    /// then surfaces as [`ReadError::Log`].
    #[error("no snapshot at or below the requested vector")]
    NoSnapshot,
    /// The physics protocol could not anchor the read on any cached
    /// operation. The read path catches this and reverts to the
    /// transaction's dependency upper bound.
    #[error("no operation is causally compatible with the read")]
    NoCompatibleOperation,
    #[error("partition {0} is still rehydrating")]
    NotReady(PartitionId),
    #[error("CrdtError: {0}")]
    Crdt(#[from] TypeMismatch),
    #[error("LogError: {0}")]
    Log(#[from] LogError),
}

/// Failures surfaced by an update.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("gc-inducing read failed: {0}")]
    OpGc(#[source] Box<ReadError>),
    #[error("no partition owns {0:?}")]
    NoOwner(Key),
    #[error("partition {0} is shutting down")]
    PartitionClosed(PartitionId),
}

/// Failures creating or dropping the per-partition cache tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table `{0}` already exists")]
    Exists(String),
    #[error("table `{0}` not found")]
    NotFound(String),
}

/// Failures during partition handoff.
#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("handoff encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("partition {0} is shutting down")]
    PartitionClosed(PartitionId),
}

/// Umbrella error for callers that do not care which subsystem failed.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("ReadError: {0}")]
    Read(#[from] ReadError),
    #[error("UpdateError: {0}")]
    Update(#[from] UpdateError),
    #[error("TableError: {0}")]
    Table(#[from] TableError),
    #[error("LogError: {0}")]
    Log(#[from] LogError),
    #[error("HandoffError: {0}")]
    Handoff(#[from] HandoffError),
    #[error("ConfigError: {0}")]
    Config(#[from] UnknownProtocol),
}
