use thiserror::Error;

use crate::units::AssayId;

/// Asset-layer errors.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("extent kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("amount overflow combining extents")]
    AmountOverflow,

    #[error("insufficient extent: cannot take {requested} from {available}")]
    InsufficientExtent { requested: u64, available: u64 },

    #[error("id '{id}' already present in set extent")]
    IdCollision { id: String },

    #[error("id '{id}' missing from set extent")]
    MissingId { id: String },

    #[error("payment not recognized by this issuer (already consumed or foreign)")]
    UnknownPayment,

    #[error("payment drawn on assay {actual}, expected {expected}")]
    WrongAssay { expected: AssayId, actual: AssayId },

    #[error("units do not match: stated {stated}, actual {actual}")]
    UnitsMismatch { stated: String, actual: String },

    #[error("label mismatch: expected assay {expected}, got {actual}")]
    LabelMismatch { expected: AssayId, actual: AssayId },
}
