use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extent::Extent;

/// Identity of one asset kind. Generated by the issuing mint; equality is
/// identity, never structural.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssayId(Uuid);

impl AssayId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AssayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.simple().to_string();
        write!(f, "{}", &hex[..8])
    }
}

/// Issuer identity plus a human-readable description of the asset kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub assay_id: AssayId,
    pub description: String,
}

impl Label {
    pub fn new(assay_id: AssayId, description: impl Into<String>) -> Self {
        Self {
            assay_id,
            description: description.into(),
        }
    }
}

/// A labeled quantity of one asset kind. Immutable value type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub label: Label,
    pub extent: Extent,
}

impl Units {
    pub fn new(label: Label, extent: Extent) -> Self {
        Self { label, extent }
    }

    pub fn assay_id(&self) -> AssayId {
        self.label.assay_id
    }
}
