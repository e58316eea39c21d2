//! Datacenter identifiers and vector clocks.
//!
//! A [`VectorClock`] maps a [`DcId`] to a monotonically increasing timestamp.
//! Entries that are absent read as `0`, so two clocks over different key sets
//! still compare under the partial order: `a <= b` iff every component of `a`
//! is `<=` the matching component of `b`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};

/// Identifies a datacenter participating in replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DcId(pub u32);

impl fmt::Display for DcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc{}", self.0)
    }
}

impl From<u32> for DcId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// A vector clock over datacenter ids.
///
/// Stored sparsely; a missing entry is semantically `0`. Kept in a `BTreeMap`
/// so iteration order (and hence `Debug` output) is stable.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<DcId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock with a single non-zero component.
    pub fn singleton(dc: DcId, ts: u64) -> Self {
        Self::new().with(dc, ts)
    }

    /// The timestamp recorded for `dc`, or `0` if absent.
    pub fn get(&self, dc: DcId) -> u64 {
        self.entries.get(&dc).copied().unwrap_or(0)
    }

    /// Sets the component for `dc`. Setting `0` removes the entry so that
    /// clocks stay in normal form and `Eq` agrees with the partial order.
    pub fn set(&mut self, dc: DcId, ts: u64) {
        if ts == 0 {
            self.entries.remove(&dc);
        } else {
            self.entries.insert(dc, ts);
        }
    }

    /// Builder form of [`Self::set`].
    pub fn with(mut self, dc: DcId, ts: u64) -> Self {
        self.set(dc, ts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DcId, u64)> + '_ {
        self.entries.iter().map(|(&dc, &ts)| (dc, ts))
    }

    /// `self <= other` under the componentwise partial order.
    pub fn le(&self, other: &Self) -> bool {
        self.entries.iter().all(|(dc, &ts)| ts <= other.get(*dc))
    }

    /// `self >= other` componentwise.
    pub fn ge(&self, other: &Self) -> bool {
        other.le(self)
    }

    /// True iff neither clock descends from the other.
    pub fn concurrent(&self, other: &Self) -> bool {
        !self.le(other) && !other.le(self)
    }

    /// Componentwise maximum, in place.
    pub fn merge_max(&mut self, other: &Self) {
        for (&dc, &ts) in &other.entries {
            let slot = self.entries.entry(dc).or_insert(0);
            *slot = (*slot).max(ts);
        }
    }

    /// Componentwise minimum, in place. A component missing on either side
    /// reads as `0`, so only entries present in both clocks survive.
    pub fn merge_min(&mut self, other: &Self) {
        self.entries.retain(|dc, ts| {
            *ts = (*ts).min(other.get(*dc));
            *ts > 0
        });
    }

    /// The clock obtained from a dependency vector by stamping the
    /// originating datacenter with its local commit time.
    pub fn with_commit(&self, dc: DcId, commit_time: u64) -> Self {
        self.clone().with(dc, commit_time)
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut le = true;
        let mut ge = true;
        for pair in self
            .entries
            .iter()
            .merge_join_by(other.entries.iter(), |(a, _), (b, _)| a.cmp(b))
        {
            let (l, r) = match pair {
                EitherOrBoth::Both((_, &l), (_, &r)) => (l, r),
                EitherOrBoth::Left((_, &l)) => (l, 0),
                EitherOrBoth::Right((_, &r)) => (0, r),
            };
            le &= l <= r;
            ge &= l >= r;
            if !le && !ge {
                return None;
            }
        }
        match (le, ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl FromIterator<(DcId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (DcId, u64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |vc, (dc, ts)| vc.with(dc, ts))
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (dc, ts)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dc}: {ts}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DC1: DcId = DcId(1);
    const DC2: DcId = DcId(2);
    const DC3: DcId = DcId(3);

    #[test]
    fn missing_entries_read_as_zero() {
        let vc = VectorClock::singleton(DC1, 5);
        assert_eq!(vc.get(DC1), 5);
        assert_eq!(vc.get(DC2), 0);
    }

    #[test]
    fn zero_components_normalize_away() {
        let a = VectorClock::singleton(DC1, 5);
        let b = VectorClock::singleton(DC1, 5).with(DC2, 0);
        assert_eq!(a, b);
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
    }

    #[test]
    fn partial_order() {
        let lo = VectorClock::singleton(DC1, 1);
        let hi = VectorClock::singleton(DC1, 2).with(DC2, 1);
        assert!(lo.le(&hi));
        assert!(!hi.le(&lo));
        assert_eq!(lo.partial_cmp(&hi), Some(Ordering::Less));

        let left = VectorClock::singleton(DC1, 1);
        let right = VectorClock::singleton(DC2, 1);
        assert!(left.concurrent(&right));
        assert_eq!(left.partial_cmp(&right), None);
    }

    #[test]
    fn empty_clock_below_everything() {
        let empty = VectorClock::new();
        let any = VectorClock::singleton(DC2, 7);
        assert!(empty.le(&any));
        assert!(empty.le(&empty));
    }

    #[test]
    fn merge_min_keeps_shared_components() {
        let mut a = VectorClock::singleton(DC1, 4).with(DC2, 9);
        let b = VectorClock::singleton(DC1, 6).with(DC3, 2);
        a.merge_min(&b);
        assert_eq!(a, VectorClock::singleton(DC1, 4));
    }

    #[test]
    fn with_commit_stamps_origin() {
        let deps = VectorClock::singleton(DC1, 3).with(DC2, 8);
        let commit = deps.with_commit(DC1, 15);
        assert_eq!(commit.get(DC1), 15);
        assert_eq!(commit.get(DC2), 8);
        assert!(deps.le(&commit));
    }

    fn arb_clock() -> impl Strategy<Value = VectorClock> {
        proptest::collection::btree_map(0u32..4, 0u64..32, 0..4)
            .prop_map(|m| m.into_iter().map(|(dc, ts)| (DcId(dc), ts)).collect())
    }

    proptest! {
        #[test]
        fn le_is_reflexive(a in arb_clock()) {
            prop_assert!(a.le(&a));
        }

        #[test]
        fn le_antisymmetric(a in arb_clock(), b in arb_clock()) {
            if a.le(&b) && b.le(&a) {
                prop_assert_eq!(a, b);
            }
        }

        #[test]
        fn merge_max_is_upper_bound(a in arb_clock(), b in arb_clock()) {
            let mut m = a.clone();
            m.merge_max(&b);
            prop_assert!(a.le(&m));
            prop_assert!(b.le(&m));
        }

        #[test]
        fn merge_min_is_lower_bound(a in arb_clock(), b in arb_clock()) {
            let mut m = a.clone();
            m.merge_min(&b);
            prop_assert!(m.le(&a));
            prop_assert!(m.le(&b));
        }

        #[test]
        fn partial_cmp_agrees_with_le(a in arb_clock(), b in arb_clock()) {
            let le = a.le(&b);
            let ge = b.le(&a);
            let expect = match (le, ge) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Less),
                (false, true) => Some(Ordering::Greater),
                (false, false) => None,
            };
            prop_assert_eq!(a.partial_cmp(&b), expect);
        }
    }
}
