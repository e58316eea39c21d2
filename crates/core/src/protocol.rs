//! The protocol adapter.
//!
//! Three transactional protocols share the materializer: snapshot isolation
//! with vector clocks (`clocksi`), generalized read isolation (`gr`), and the
//! physics-time causal protocol (`physics`). The adapter concentrates their
//! differences: which vector an operation's commit VC is derived from, what
//! commit metadata a read emits, and how the physics protocol decides whether
//! an operation may anchor a read's snapshot.

use std::fmt;
use std::str::FromStr;

use meridian_vclock::VectorClock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionProtocol {
    ClockSi,
    Gr,
    Physics,
}

/// A protocol name that is not one of `clocksi`, `gr`, `physics`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transactional protocol `{0}`")]
pub struct UnknownProtocol(pub String);

impl FromStr for TransactionProtocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clocksi" => Ok(Self::ClockSi),
            "gr" => Ok(Self::Gr),
            "physics" => Ok(Self::Physics),
            other => Err(UnknownProtocol(other.into())),
        }
    }
}

impl fmt::Display for TransactionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClockSi => "clocksi",
            Self::Gr => "gr",
            Self::Physics => "physics",
        };
        f.write_str(name)
    }
}

/// Read-time bounds the physics protocol threads through a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsReadMeta {
    pub commit_time_lowbound: VectorClock,
    pub dep_upbound: VectorClock,
}

/// Per-transaction protocol context.
///
/// Physics read metadata exists exactly when the transaction runs the physics
/// protocol, so it lives inside the variant rather than as an optional field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProtocolContext {
    ClockSi,
    Gr,
    Physics(PhysicsReadMeta),
}

impl ProtocolContext {
    pub fn protocol(&self) -> TransactionProtocol {
        match self {
            Self::ClockSi => TransactionProtocol::ClockSi,
            Self::Gr => TransactionProtocol::Gr,
            Self::Physics(_) => TransactionProtocol::Physics,
        }
    }
}

/// Commit metadata of a physics-protocol snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsCommitParams {
    pub commit_vc: VectorClock,
    pub dependency_vc: VectorClock,
    pub read_vc: VectorClock,
}

/// Commit metadata stored with a snapshot and returned from a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotCommitParams {
    /// No commit information (blank snapshots). Incomparable with every
    /// vector: replay treats all operations as not yet absorbed.
    None,
    /// clocksi / gr: the combined commit vector of the replay that produced
    /// the snapshot.
    Vc(VectorClock),
    Physics(PhysicsCommitParams),
}

impl SnapshotCommitParams {
    /// The vector the snapshot dict orders and selects entries by. Physics
    /// snapshots take precedence from their dependency vector.
    pub fn ordering_vc(&self) -> Option<&VectorClock> {
        match self {
            Self::None => None,
            Self::Vc(vc) => Some(vc),
            Self::Physics(p) => Some(&p.dependency_vc),
        }
    }

    /// The commit vector replay filters against.
    pub fn commit_vc(&self) -> Option<&VectorClock> {
        match self {
            Self::None => None,
            Self::Vc(vc) => Some(vc),
            Self::Physics(p) => Some(&p.commit_vc),
        }
    }
}

/// Whether an operation with dependency vector `op_dep_vc` may anchor a read
/// at `read_vc`, under the transaction's commit-time lower bound and
/// dependency upper bound. Empty bounds are trivially satisfied.
pub fn is_causally_compatible(
    read_vc: &VectorClock,
    ct_low: &VectorClock,
    op_dep_vc: &VectorClock,
    dep_up: &VectorClock,
) -> bool {
    op_dep_vc.le(read_vc)
        && (ct_low.is_empty() || ct_low.le(read_vc))
        && (dep_up.is_empty() || op_dep_vc.le(dep_up))
}

/// Whether an operation with commit vector `op_commit_vc` still needs to be
/// replayed on top of a snapshot committed at `params`.
///
/// Blank snapshot params and empty commit vectors are universally
/// incomparable: the operation counts as not absorbed.
pub fn op_not_already_in_snapshot(
    params: &SnapshotCommitParams,
    op_commit_vc: &VectorClock,
) -> bool {
    match params.commit_vc() {
        None => true,
        Some(_) if op_commit_vc.is_empty() => true,
        Some(vc) => !op_commit_vc.le(vc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_vclock::DcId;

    const DC1: DcId = DcId(1);
    const DC2: DcId = DcId(2);

    #[test]
    fn parses_known_protocols() {
        assert_eq!(
            "clocksi".parse::<TransactionProtocol>().unwrap(),
            TransactionProtocol::ClockSi
        );
        assert_eq!(
            "gr".parse::<TransactionProtocol>().unwrap(),
            TransactionProtocol::Gr
        );
        assert_eq!(
            "physics".parse::<TransactionProtocol>().unwrap(),
            TransactionProtocol::Physics
        );
        assert_eq!(
            "2pc".parse::<TransactionProtocol>(),
            Err(UnknownProtocol("2pc".into()))
        );
    }

    #[test]
    fn compat_requires_dependencies_visible() {
        let read = VectorClock::singleton(DC1, 10);
        let deps = VectorClock::singleton(DC1, 5);
        let empty = VectorClock::new();
        assert!(is_causally_compatible(&read, &empty, &deps, &empty));

        let deps_ahead = VectorClock::singleton(DC1, 11);
        assert!(!is_causally_compatible(&read, &empty, &deps_ahead, &empty));
    }

    #[test]
    fn compat_honors_bounds() {
        let read = VectorClock::singleton(DC1, 10);
        let deps = VectorClock::singleton(DC1, 5);
        let empty = VectorClock::new();

        let low = VectorClock::singleton(DC1, 20);
        assert!(!is_causally_compatible(&read, &low, &deps, &empty));

        let up = VectorClock::singleton(DC1, 4);
        assert!(!is_causally_compatible(&read, &empty, &deps, &up));

        let up_ok = VectorClock::singleton(DC1, 5);
        assert!(is_causally_compatible(&read, &empty, &deps, &up_ok));
    }

    #[test]
    fn absorbed_iff_dominated() {
        let snap = SnapshotCommitParams::Vc(VectorClock::singleton(DC1, 10));
        let absorbed = VectorClock::singleton(DC1, 9);
        let fresh = VectorClock::singleton(DC1, 11);
        let concurrent = VectorClock::singleton(DC2, 1);
        assert!(!op_not_already_in_snapshot(&snap, &absorbed));
        assert!(op_not_already_in_snapshot(&snap, &fresh));
        assert!(op_not_already_in_snapshot(&snap, &concurrent));
    }

    #[test]
    fn sentinels_are_incomparable() {
        let op = VectorClock::singleton(DC1, 3);
        assert!(op_not_already_in_snapshot(&SnapshotCommitParams::None, &op));

        let snap = SnapshotCommitParams::Vc(VectorClock::singleton(DC1, 10));
        assert!(op_not_already_in_snapshot(&snap, &VectorClock::new()));
    }
}
