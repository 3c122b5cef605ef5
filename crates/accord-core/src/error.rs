use thiserror::Error;

use accord_assets::{AssayId, AssetError, Payment};

use crate::handles::{InstallationHandle, InstanceHandle, OfferHandle};

/// Contract host errors.
///
/// Every variant is a local rejection: no error path leaves a partial
/// mutation behind, and offers outside the failing call are never touched.
#[derive(Debug, Error)]
pub enum HostError {
    /// Malformed offer rules, exit rule, or batch arguments. Raised before
    /// any escrow side effect.
    #[error("malformed offer structure: {0}")]
    Structural(String),

    /// An invite or escrow receipt that this host never issued, or that has
    /// already been burned, or an operation outside the caller's authority.
    #[error("capability rejected: {0}")]
    Capability(String),

    /// The offer is no longer present in the offer table (already completed
    /// or cancelled).
    #[error("offer {handle} is not active")]
    OfferInactive { handle: OfferHandle },

    #[error("handle {0} already present")]
    HandleInUse(String),

    #[error("unknown installation handle {0}")]
    UnknownInstallation(InstallationHandle),

    #[error("unknown instance handle {0}")]
    UnknownInstance(InstanceHandle),

    #[error("assay {0} is not known to this host")]
    UnknownAssay(AssayId),

    /// The proposed reallocation creates or destroys rights for at least one
    /// assay. A defect in the governing contract, never in correct contracts.
    #[error("proposed reallocation does not conserve rights")]
    RightsNotConserved,

    /// The proposed reallocation leaves an offer with neither a coherent
    /// refund nor a coherent win.
    #[error("proposed reallocation is not offer-safe for offer {handle}")]
    OfferUnsafe { handle: OfferHandle },

    /// A deposit failed mid-escrow. Every deposit that had already succeeded
    /// was withdrawn again and reissued in `refunds`; payments on the failing
    /// legs were never consumed and remain with the caller. The offer never
    /// existed.
    #[error("escrow aborted: {reason}")]
    EscrowAborted {
        reason: String,
        refunds: Vec<Payment>,
    },

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("host internal error: {0}")]
    Internal(String),
}

impl HostError {
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability(message.into())
    }
}
