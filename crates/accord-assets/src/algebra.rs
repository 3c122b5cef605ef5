use std::collections::BTreeSet;

use crate::error::AssetError;
use crate::extent::Extent;

/// Pluggable arithmetic defining valid combination of extents for one asset
/// kind. Implementations must be pure: no call here may touch ledger state.
pub trait UnitAlgebra: Send + Sync {
    fn empty(&self) -> Extent;

    fn is_empty(&self, extent: &Extent) -> bool;

    /// Does `whole` contain at least `part`?
    fn includes(&self, whole: &Extent, part: &Extent) -> Result<bool, AssetError>;

    fn equals(&self, left: &Extent, right: &Extent) -> Result<bool, AssetError>;

    /// Combine two extents. Fails on overflow or id collision, never panics.
    fn with(&self, left: &Extent, right: &Extent) -> Result<Extent, AssetError>;

    /// Remove `part` from `whole`. Fails if `part` is not fully present.
    fn without(&self, whole: &Extent, part: &Extent) -> Result<Extent, AssetError>;
}

/// Fungible counts with checked arithmetic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NatAlgebra;

fn expect_nat(extent: &Extent) -> Result<u64, AssetError> {
    match extent {
        Extent::Nat(value) => Ok(*value),
        other => Err(AssetError::KindMismatch {
            expected: "nat",
            actual: other.kind_name(),
        }),
    }
}

impl UnitAlgebra for NatAlgebra {
    fn empty(&self) -> Extent {
        Extent::Nat(0)
    }

    fn is_empty(&self, extent: &Extent) -> bool {
        matches!(extent, Extent::Nat(0))
    }

    fn includes(&self, whole: &Extent, part: &Extent) -> Result<bool, AssetError> {
        Ok(expect_nat(whole)? >= expect_nat(part)?)
    }

    fn equals(&self, left: &Extent, right: &Extent) -> Result<bool, AssetError> {
        Ok(expect_nat(left)? == expect_nat(right)?)
    }

    fn with(&self, left: &Extent, right: &Extent) -> Result<Extent, AssetError> {
        expect_nat(left)?
            .checked_add(expect_nat(right)?)
            .map(Extent::Nat)
            .ok_or(AssetError::AmountOverflow)
    }

    fn without(&self, whole: &Extent, part: &Extent) -> Result<Extent, AssetError> {
        let whole = expect_nat(whole)?;
        let part = expect_nat(part)?;
        whole
            .checked_sub(part)
            .map(Extent::Nat)
            .ok_or(AssetError::InsufficientExtent {
                requested: part,
                available: whole,
            })
    }
}

/// Sets of unique ids. `with` is disjoint union; an id cannot exist twice.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetAlgebra;

fn expect_set(extent: &Extent) -> Result<&BTreeSet<String>, AssetError> {
    match extent {
        Extent::Set(ids) => Ok(ids),
        other => Err(AssetError::KindMismatch {
            expected: "set",
            actual: other.kind_name(),
        }),
    }
}

impl UnitAlgebra for SetAlgebra {
    fn empty(&self) -> Extent {
        Extent::Set(BTreeSet::new())
    }

    fn is_empty(&self, extent: &Extent) -> bool {
        matches!(extent, Extent::Set(ids) if ids.is_empty())
    }

    fn includes(&self, whole: &Extent, part: &Extent) -> Result<bool, AssetError> {
        Ok(expect_set(part)?.is_subset(expect_set(whole)?))
    }

    fn equals(&self, left: &Extent, right: &Extent) -> Result<bool, AssetError> {
        Ok(expect_set(left)? == expect_set(right)?)
    }

    fn with(&self, left: &Extent, right: &Extent) -> Result<Extent, AssetError> {
        let left = expect_set(left)?;
        let right = expect_set(right)?;
        if let Some(id) = left.intersection(right).next() {
            return Err(AssetError::IdCollision { id: id.clone() });
        }
        Ok(Extent::Set(left.union(right).cloned().collect()))
    }

    fn without(&self, whole: &Extent, part: &Extent) -> Result<Extent, AssetError> {
        let whole = expect_set(whole)?;
        let part = expect_set(part)?;
        if let Some(id) = part.difference(whole).next() {
            return Err(AssetError::MissingId { id: id.clone() });
        }
        Ok(Extent::Set(whole.difference(part).cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat_with_and_without_round() {
        let ops = NatAlgebra;
        let sum = ops.with(&Extent::nat(3), &Extent::nat(7)).unwrap();
        assert_eq!(sum, Extent::nat(10));
        let rest = ops.without(&sum, &Extent::nat(7)).unwrap();
        assert_eq!(rest, Extent::nat(3));
    }

    #[test]
    fn nat_with_detects_overflow() {
        let ops = NatAlgebra;
        assert!(matches!(
            ops.with(&Extent::nat(u64::MAX), &Extent::nat(1)),
            Err(AssetError::AmountOverflow)
        ));
    }

    #[test]
    fn nat_without_rejects_going_negative() {
        let ops = NatAlgebra;
        assert!(matches!(
            ops.without(&Extent::nat(3), &Extent::nat(7)),
            Err(AssetError::InsufficientExtent {
                requested: 7,
                available: 3
            })
        ));
    }

    #[test]
    fn nat_rejects_set_extents() {
        let ops = NatAlgebra;
        assert!(matches!(
            ops.equals(&Extent::nat(1), &Extent::set(["x"])),
            Err(AssetError::KindMismatch { .. })
        ));
    }

    #[test]
    fn set_with_requires_disjoint_ids() {
        let ops = SetAlgebra;
        let joined = ops
            .with(&Extent::set(["vase"]), &Extent::set(["urn"]))
            .unwrap();
        assert!(ops.includes(&joined, &Extent::set(["vase"])).unwrap());

        assert!(matches!(
            ops.with(&joined, &Extent::set(["urn"])),
            Err(AssetError::IdCollision { id }) if id == "urn"
        ));
    }

    #[test]
    fn set_without_requires_presence() {
        let ops = SetAlgebra;
        assert!(matches!(
            ops.without(&Extent::set(["vase"]), &Extent::set(["urn"])),
            Err(AssetError::MissingId { id }) if id == "urn"
        ));
    }
}
