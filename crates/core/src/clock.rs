//! Wall-clock access for commit timestamps and physics read vectors.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
///
/// Commit timestamps are assigned by the sequencer, not here; this clock only
/// seeds physics read vectors, so a backwards step is tolerable.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
