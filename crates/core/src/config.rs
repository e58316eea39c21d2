//! Partition configuration and cache tunables.

use std::str::FromStr;
use std::time::Duration;

use meridian_vclock::DcId;

use crate::protocol::{TransactionProtocol, UnknownProtocol};

/// Snapshot-dict size that triggers snapshot GC.
pub const SNAPSHOT_THRESHOLD: usize = 10;
/// Youngest snapshots retained by a GC pass.
pub const SNAPSHOT_MIN: usize = 5;
/// Initial (and floor) capacity of a key's operation ring; also the insert
/// period of write-triggered GC.
pub const OPS_THRESHOLD: usize = 50;
/// Free-slot margin the resize policy keeps between live ops and capacity.
pub const RESIZE_THRESHOLD: usize = 5;
/// Delay before the first (and each retried) log rehydration attempt.
pub const LOG_STARTUP_WAIT: Duration = Duration::from_millis(1000);
/// Retry period when a previous incarnation's cache table has not been
/// reclaimed yet.
pub const TABLE_RETRY: Duration = Duration::from_millis(100);

/// Immutable per-partition configuration, captured at init.
///
/// Protocol selection, recovery behavior and DC identity are fixed for the
/// lifetime of a partition; nothing in the hot path consults process-wide
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionConfig {
    pub protocol: TransactionProtocol,
    pub recover_from_log: bool,
    /// The local datacenter, used to stamp physics read vectors.
    pub dc_id: DcId,
}

impl PartitionConfig {
    pub fn new(protocol: TransactionProtocol, dc_id: DcId) -> Self {
        Self {
            protocol,
            recover_from_log: false,
            dc_id,
        }
    }

    /// Parses the protocol from its configuration name. Unknown protocols
    /// are a configuration error, not a fallback.
    pub fn from_protocol_name(name: &str, dc_id: DcId) -> Result<Self, UnknownProtocol> {
        Ok(Self::new(TransactionProtocol::from_str(name)?, dc_id))
    }

    pub fn with_recovery(mut self, recover_from_log: bool) -> Self {
        self.recover_from_log = recover_from_log;
        self
    }
}
