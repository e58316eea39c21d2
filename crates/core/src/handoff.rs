//! Partition handoff encoding.
//!
//! Migration transfers each key's packed operation entry verbatim, as an
//! opaque self-describing encoding. The snapshot cache is deliberately not
//! transferred: the receiver rebuilds snapshots on demand from the ops it
//! was handed.

use crate::error::HandoffError;
use crate::ops_cache::{OpsCache, OpsCacheEntry};
use crate::tx::Key;

/// Serializes every key's entry for transfer, in no particular key order.
pub(crate) fn fold(ops: &OpsCache) -> Result<Vec<(Key, Vec<u8>)>, HandoffError> {
    let mut items = Vec::with_capacity(ops.key_count());
    let mut failed = None;
    ops.for_each_entry(|key, entry| {
        if failed.is_some() {
            return;
        }
        match bincode::serialize(entry) {
            Ok(bytes) => items.push((key.clone(), bytes)),
            Err(e) => failed = Some(e),
        }
    });
    match failed {
        None => Ok(items),
        Some(e) => Err(e.into()),
    }
}

/// Decodes one received handoff item and installs it verbatim, replacing any
/// local state for the key.
pub(crate) fn receive(ops: &OpsCache, bytes: &[u8]) -> Result<(), HandoffError> {
    let entry: OpsCacheEntry = bincode::deserialize(bytes)?;
    ops.insert_entry(entry);
    Ok(())
}
