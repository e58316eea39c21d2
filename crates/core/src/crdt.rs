//! The CRDT type registry.
//!
//! Every key in the store holds a value of exactly one replicated type. The
//! registry supplies the empty value for a type, the merge of an operation
//! into a value, and the public value handed to coordinators. Merges are
//! commutative and associative; replay order between concurrent operations
//! does not change the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tags the replicated data types the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrdtType {
    GCounter,
    PnCounter,
    LwwRegister,
}

impl CrdtType {
    /// The value a never-updated key of this type materializes to.
    pub fn new_value(self) -> CrdtValue {
        match self {
            CrdtType::GCounter => CrdtValue::GCounter(0),
            CrdtType::PnCounter => CrdtValue::PnCounter(0),
            CrdtType::LwwRegister => CrdtValue::LwwRegister(None),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CrdtType::GCounter => "gcounter",
            CrdtType::PnCounter => "pncounter",
            CrdtType::LwwRegister => "lwwregister",
        }
    }
}

/// A register cell: the payload together with the writer's timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub ts: u64,
    pub data: Vec<u8>,
}

/// Materialized CRDT state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtValue {
    GCounter(u64),
    PnCounter(i64),
    LwwRegister(Option<Register>),
}

/// CRDT-specific payload carried by a committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtOp {
    Increment(u64),
    Decrement(u64),
    Assign(Register),
}

impl CrdtOp {
    pub fn name(&self) -> &'static str {
        match self {
            CrdtOp::Increment(_) => "increment",
            CrdtOp::Decrement(_) => "decrement",
            CrdtOp::Assign(_) => "assign",
        }
    }
}

/// An operation was applied to a value of the wrong type.
///
/// Keys are single-typed, so this only happens when a coordinator routes a
/// malformed update; the materializer surfaces it rather than guessing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{op}` is not an operation of {ty}")]
pub struct TypeMismatch {
    pub ty: &'static str,
    pub op: &'static str,
}

impl CrdtValue {
    pub fn ty(&self) -> CrdtType {
        match self {
            CrdtValue::GCounter(_) => CrdtType::GCounter,
            CrdtValue::PnCounter(_) => CrdtType::PnCounter,
            CrdtValue::LwwRegister(_) => CrdtType::LwwRegister,
        }
    }

    /// Merges `op` into the value, producing the next state.
    pub fn apply(&self, op: &CrdtOp) -> Result<CrdtValue, TypeMismatch> {
        match (self, op) {
            (CrdtValue::GCounter(n), CrdtOp::Increment(k)) => Ok(CrdtValue::GCounter(n + k)),
            (CrdtValue::PnCounter(n), CrdtOp::Increment(k)) => {
                Ok(CrdtValue::PnCounter(n + *k as i64))
            }
            (CrdtValue::PnCounter(n), CrdtOp::Decrement(k)) => {
                Ok(CrdtValue::PnCounter(n - *k as i64))
            }
            (CrdtValue::LwwRegister(cur), CrdtOp::Assign(next)) => {
                // Last writer wins; ties break on the payload so that the
                // merge stays deterministic across replicas.
                let winner = match cur {
                    Some(cur) if (cur.ts, &cur.data) >= (next.ts, &next.data) => cur.clone(),
                    _ => next.clone(),
                };
                Ok(CrdtValue::LwwRegister(Some(winner)))
            }
            (value, op) => Err(TypeMismatch {
                ty: value.ty().name(),
                op: op.name(),
            }),
        }
    }

    /// The public value handed to transaction coordinators.
    pub fn public(&self) -> PublicValue {
        match self {
            CrdtValue::GCounter(n) => PublicValue::Counter(*n as i64),
            CrdtValue::PnCounter(n) => PublicValue::Counter(*n),
            CrdtValue::LwwRegister(reg) => {
                PublicValue::Register(reg.as_ref().map(|r| r.data.clone()))
            }
        }
    }
}

/// What a coordinator sees when it extracts a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicValue {
    Counter(i64),
    Register(Option<Vec<u8>>),
}

impl PublicValue {
    /// Convenience for counter-typed keys.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            PublicValue::Counter(n) => Some(*n),
            PublicValue::Register(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn gcounter_folds_increments() {
        let mut v = CrdtType::GCounter.new_value();
        for _ in 0..5 {
            v = v.apply(&CrdtOp::Increment(2)).unwrap();
        }
        assert_eq!(v.public(), PublicValue::Counter(10));
    }

    #[test]
    fn gcounter_rejects_decrement() {
        let v = CrdtType::GCounter.new_value();
        let err = v.apply(&CrdtOp::Decrement(1)).unwrap_err();
        assert_eq!(err.ty, "gcounter");
        assert_eq!(err.op, "decrement");
    }

    #[test]
    fn pncounter_goes_both_ways() {
        let v = CrdtType::PnCounter
            .new_value()
            .apply(&CrdtOp::Increment(3))
            .unwrap()
            .apply(&CrdtOp::Decrement(5))
            .unwrap();
        assert_eq!(v.public(), PublicValue::Counter(-2));
    }

    #[test]
    fn lww_register_is_order_insensitive() {
        let old = CrdtOp::Assign(Register {
            ts: 1,
            data: b"old".to_vec(),
        });
        let new = CrdtOp::Assign(Register {
            ts: 2,
            data: b"new".to_vec(),
        });
        let empty = CrdtType::LwwRegister.new_value();
        let a = empty.apply(&old).unwrap().apply(&new).unwrap();
        let b = empty.apply(&new).unwrap().apply(&old).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.public(), PublicValue::Register(Some(b"new".to_vec())));
    }
}
