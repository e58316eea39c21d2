//! Snapshot and operation garbage collection.
//!
//! A pass retains the youngest [`SNAPSHOT_MIN`] snapshots, computes the
//! pointwise-minimum cutoff over their commit vectors, drops every operation
//! whose commit vector the cutoff dominates (those are baked into all
//! retained snapshots), and reshapes the ring's capacity. Both caches are
//! rewritten under their per-key write locks, so readers observe either the
//! old state or the new one.

use meridian_vclock::VectorClock;

use crate::config::SNAPSHOT_MIN;
use crate::materializer::Materializer;
use crate::ops_cache::resized_capacity;
use crate::tx::{Key, Operation};

pub(crate) fn collect(materializer: &Materializer, key: &Key) {
    let Some(dict) = materializer.snapshots().dict(key) else {
        return;
    };
    let Some(entry) = materializer.ops().entry(key) else {
        return;
    };
    let mut dict = dict.write();
    let mut entry = entry.write();

    let live: Vec<(u64, Operation)> = entry.live().cloned().collect();

    if dict.is_empty() {
        // No snapshot proves anything absorbed; only reshape capacity.
        let capacity = resized_capacity(live.len(), entry.capacity());
        if capacity != entry.capacity() {
            entry.replace_ops(live, capacity);
        }
        return;
    }

    dict.retain_youngest(SNAPSHOT_MIN);

    // Cutoff: pointwise minimum of the retained snapshots' commit vectors,
    // seeded from the oldest retained. A blank entry collapses the cutoff to
    // the empty clock, which prunes nothing.
    let retained = dict.to_list();
    let mut cutoff = retained[0].0.commit_vc().cloned().unwrap_or_default();
    for (params, _) in &retained[1..] {
        match params.commit_vc() {
            Some(vc) => cutoff.merge_min(vc),
            None => cutoff = VectorClock::new(),
        }
    }

    let protocol = materializer.config().protocol;
    let mut kept: Vec<(u64, Operation)> = live
        .iter()
        .filter(|(_, op)| !op.commit_vc(protocol).le(&cutoff))
        .cloned()
        .collect();
    if kept.is_empty() && !live.is_empty() {
        // Never leave a key with an empty ring while snapshots exist.
        kept.push(live[0].clone());
    }

    let pruned = live.len() - kept.len();
    let capacity = resized_capacity(kept.len(), entry.capacity());
    entry.replace_ops(kept, capacity);
    log::trace!(
        "{}: gc {key:?}: {} snapshots retained, {pruned} ops pruned, capacity {}",
        materializer.partition(),
        dict.len(),
        entry.capacity(),
    );
}
