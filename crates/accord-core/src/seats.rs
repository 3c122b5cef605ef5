use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::HostError;
use crate::handles::{InstanceHandle, OfferHandle};

/// Contract-specific API bound to a minted invite. Holders downcast to the
/// concrete seat type the governing contract documents.
pub type SeatObject = Arc<dyn Any + Send + Sync>;

/// Unforgeable, single-use token naming a seat in an instance.
///
/// The carried offer handle is the handle the redeemer's escrowed offer will
/// occupy, which is how the minting contract correlates seats with offers.
pub struct Invite {
    id: Uuid,
    instance: InstanceHandle,
    handle: OfferHandle,
    extent: serde_json::Value,
}

impl Invite {
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn handle(&self) -> OfferHandle {
        self.handle
    }

    /// Contract-defined description of what this seat is for.
    pub fn extent(&self) -> &serde_json::Value {
        &self.extent
    }
}

impl std::fmt::Debug for Invite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invite")
            .field("instance", &self.instance)
            .field("handle", &self.handle)
            .field("extent", &self.extent)
            .finish()
    }
}

/// Unforgeable, single-use receipt for a bare-escrowed offer. Burned by a
/// governing contract to claim the offer into its instance.
#[derive(Debug)]
pub struct EscrowReceipt {
    id: Uuid,
}

enum Entitlement {
    Seat {
        instance: InstanceHandle,
        seat: SeatObject,
    },
    Receipt {
        offer: OfferHandle,
    },
}

enum CapabilityState {
    Live(Entitlement),
    Burned,
}

/// Issues invites and escrow receipts and burns each exactly once.
///
/// Redemption is an atomic swap from `Live` to `Burned`: the bound payload is
/// released only on the first burn, and every later attempt is a capability
/// error. This is the only mechanism by which authority to act in a contract
/// crosses from one party to another.
#[derive(Default)]
pub struct CapabilityMint {
    entries: HashMap<Uuid, CapabilityState>,
}

impl CapabilityMint {
    pub(crate) fn mint_invite(
        &mut self,
        instance: InstanceHandle,
        handle: OfferHandle,
        extent: serde_json::Value,
        seat: SeatObject,
    ) -> Invite {
        let id = Uuid::new_v4();
        self.entries
            .insert(id, CapabilityState::Live(Entitlement::Seat { instance, seat }));
        debug!(instance = %instance, offer = %handle, "invite minted");
        Invite {
            id,
            instance,
            handle,
            extent,
        }
    }

    pub(crate) fn mint_receipt(&mut self, offer: OfferHandle) -> EscrowReceipt {
        let id = Uuid::new_v4();
        self.entries
            .insert(id, CapabilityState::Live(Entitlement::Receipt { offer }));
        debug!(offer = %offer, "escrow receipt minted");
        EscrowReceipt { id }
    }

    pub(crate) fn burn_invite(&mut self, invite: &Invite) -> Result<SeatObject, HostError> {
        let state = self
            .entries
            .get_mut(&invite.id)
            .ok_or_else(|| HostError::capability("invite was not issued by this host"))?;
        match state {
            CapabilityState::Burned => Err(HostError::capability("invite already redeemed")),
            CapabilityState::Live(Entitlement::Receipt { .. }) => {
                Err(HostError::capability("token is not an invite"))
            }
            CapabilityState::Live(Entitlement::Seat { .. }) => {
                let CapabilityState::Live(Entitlement::Seat { seat, .. }) =
                    std::mem::replace(state, CapabilityState::Burned)
                else {
                    unreachable!("state was just matched as a live seat");
                };
                debug!(instance = %invite.instance, offer = %invite.handle, "invite burned");
                Ok(seat)
            }
        }
    }

    /// Offer handle bound to a receipt, without burning it. Used to validate
    /// a claim in full before the burn commits it.
    pub(crate) fn peek_receipt(&self, receipt: &EscrowReceipt) -> Result<OfferHandle, HostError> {
        match self.entries.get(&receipt.id) {
            Some(CapabilityState::Live(Entitlement::Receipt { offer })) => Ok(*offer),
            Some(CapabilityState::Burned) => {
                Err(HostError::capability("escrow receipt already burned"))
            }
            Some(CapabilityState::Live(Entitlement::Seat { .. })) => {
                Err(HostError::capability("token is not an escrow receipt"))
            }
            None => Err(HostError::capability(
                "escrow receipt was not issued by this host",
            )),
        }
    }

    pub(crate) fn burn_receipt(&mut self, receipt: &EscrowReceipt) -> Result<OfferHandle, HostError> {
        let offer = self.peek_receipt(receipt)?;
        if let Some(state) = self.entries.get_mut(&receipt.id) {
            *state = CapabilityState::Burned;
        }
        debug!(offer = %offer, "escrow receipt burned");
        Ok(offer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat() -> SeatObject {
        Arc::new("seat payload")
    }

    #[test]
    fn invite_burns_exactly_once() {
        let mut mint = CapabilityMint::default();
        let instance = InstanceHandle::new();
        let handle = OfferHandle::new();
        let invite = mint.mint_invite(instance, handle, serde_json::Value::Null, seat());

        let released = mint.burn_invite(&invite).unwrap();
        assert_eq!(*released.downcast::<&str>().ok().unwrap(), "seat payload");

        assert!(matches!(
            mint.burn_invite(&invite),
            Err(HostError::Capability(_))
        ));
    }

    #[test]
    fn foreign_tokens_are_rejected() {
        let mut issuing = CapabilityMint::default();
        let mut other = CapabilityMint::default();
        let invite = issuing.mint_invite(
            InstanceHandle::new(),
            OfferHandle::new(),
            serde_json::Value::Null,
            seat(),
        );
        assert!(matches!(
            other.burn_invite(&invite),
            Err(HostError::Capability(_))
        ));
    }

    #[test]
    fn receipt_peek_does_not_burn() {
        let mut mint = CapabilityMint::default();
        let offer = OfferHandle::new();
        let receipt = mint.mint_receipt(offer);

        assert_eq!(mint.peek_receipt(&receipt).unwrap(), offer);
        assert_eq!(mint.burn_receipt(&receipt).unwrap(), offer);
        assert!(matches!(
            mint.peek_receipt(&receipt),
            Err(HostError::Capability(_))
        ));
    }
}
