//! Accord contract host core.
//!
//! The host escrows assets on behalf of mutually distrusting parties, hands a
//! restricted facet to untrusted contract code, and mechanically proves two
//! safety invariants (rights conservation and offer safety) before any
//! reallocation touches escrow state. Payouts resolve exactly once per
//! participant, under completion, cancellation, or deadline alike.

#![deny(unsafe_code)]

pub mod error;
pub mod escrow;
pub mod facet;
pub mod handles;
pub mod host;
pub mod install;
pub mod invariants;
pub mod rules;
pub mod seats;
pub mod tables;
pub mod timer;

pub use error::HostError;
pub use escrow::PayoutReceiver;
pub use facet::{ClaimedOffer, ContractFacet};
pub use handles::{InstallationHandle, InstanceHandle, OfferHandle};
pub use host::{
    CancelCapability, ContractHost, EscrowedOffer, HostConfig, InstanceActivation,
    InstanceSummary, RedeemedSeat,
};
pub use install::{ContractInstaller, StartOutput, Terms};
pub use invariants::{offer_safe_for_all, offer_safe_for_offer, rights_conserved};
pub use rules::{ExitRule, ExitRuleKind, OfferRules, PayoutRule, PayoutRuleKind};
pub use seats::{EscrowReceipt, Invite, SeatObject};
pub use tables::OfferStatuses;
pub use timer::{ManualTimer, TimerService, WakeupFuture, WakeupHandler};
