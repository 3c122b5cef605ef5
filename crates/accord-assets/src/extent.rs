use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The raw quantity part of a labeled amount.
///
/// `Nat` carries fungible counts; `Set` carries collections of unique ids
/// (non-fungible assets). Which combinations are valid is decided by the
/// [`UnitAlgebra`](crate::algebra::UnitAlgebra) bound to the asset kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Extent {
    Nat(u64),
    Set(BTreeSet<String>),
}

impl Extent {
    pub fn nat(value: u64) -> Self {
        Self::Nat(value)
    }

    pub fn set<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(ids.into_iter().map(Into::into).collect())
    }

    /// Short kind tag used in mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Nat(_) => "nat",
            Self::Set(_) => "set",
        }
    }
}

impl From<u64> for Extent {
    fn from(value: u64) -> Self {
        Self::Nat(value)
    }
}
