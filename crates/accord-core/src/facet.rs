use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::info;

use accord_assets::{Assay, Payment, UnitAlgebra, Units};

use crate::error::HostError;
use crate::escrow::{ensure_instance_offers, validate_batch, PayoutReceiver};
use crate::handles::{InstanceHandle, OfferHandle};
use crate::host::HostCore;
use crate::rules::{ExitRuleKind, OfferRules, PayoutRule};
use crate::seats::{EscrowReceipt, Invite, SeatObject};
use crate::tables::{OfferRecord, OfferStatuses};

/// A bare-escrowed offer claimed into an instance via its receipt.
#[derive(Clone, Debug)]
pub struct ClaimedOffer {
    pub handle: OfferHandle,
    pub payout_rules: Vec<PayoutRule>,
    pub exit: ExitRuleKind,
}

/// The restricted capability surface handed to governing contract code.
///
/// One facet exists per instance, closed over that instance's handle; every
/// operation is scoped to offers the instance governs. Contract code holds
/// nothing else: no registry access, no other instances, no escrow purses.
#[derive(Clone)]
pub struct ContractFacet {
    core: Arc<HostCore>,
    instance: InstanceHandle,
}

impl ContractFacet {
    pub(crate) fn new(core: Arc<HostCore>, instance: InstanceHandle) -> Self {
        Self { core, instance }
    }

    pub fn instance_handle(&self) -> InstanceHandle {
        self.instance
    }

    /// The instance's canonical assay ordering, fixed at instantiation.
    pub fn assays(&self) -> Result<Vec<Arc<dyn Assay>>, HostError> {
        let instances = self.core.instances_read()?;
        Ok(instances.get(&self.instance)?.assays.clone())
    }

    /// Unit algebras aligned with [`ContractFacet::assays`].
    pub fn algebras(&self) -> Result<Vec<Arc<dyn UnitAlgebra>>, HostError> {
        Ok(self
            .assays()?
            .iter()
            .map(|assay| assay.algebra())
            .collect())
    }

    /// Propose a reallocation across the given offers. Both invariants are
    /// re-checked against committed state; failure means zero mutation.
    ///
    /// `assays` must match the instance's canonical ordering; passing it
    /// explicitly keeps contract code honest about which columns it means.
    pub fn reallocate(
        &self,
        handles: &[OfferHandle],
        assays: &[Arc<dyn Assay>],
        proposed: Vec<Vec<Units>>,
    ) -> Result<(), HostError> {
        self.core.reallocate(self.instance, handles, assays, proposed)
    }

    /// Complete the given offers: pay out their standing units and retire
    /// them. Any handle this instance does not govern, or that is already
    /// inactive, rejects the whole call.
    pub async fn complete(&self, handles: &[OfferHandle]) -> Result<(), HostError> {
        {
            let offers = self.core.offers_read()?;
            ensure_instance_offers(&offers, self.instance, handles)?;
        }
        self.core.complete_offers(handles).await
    }

    /// Escrow a contract-initiated offer through the normal lifecycle, bound
    /// to this instance from the start.
    pub async fn escrow_offer(
        &self,
        rules: OfferRules,
        payments: &[Option<Payment>],
    ) -> Result<(OfferHandle, PayoutReceiver), HostError> {
        let canonical = {
            let instances = self.core.instances_read()?;
            instances.get(&self.instance)?.assay_ids()
        };
        if rules.assay_ids() != canonical {
            return Err(HostError::structural(
                "offer legs do not match the instance's canonical assay ordering",
            ));
        }
        let handle = OfferHandle::new();
        let payout =
            crate::escrow::escrow_offer(&self.core, handle, Some(self.instance), &rules, payments)
                .await?;
        Ok((handle, payout))
    }

    /// Bookkeeping offer holding empty units for every canonical assay. No
    /// funds move; the offer is trivially offer-safe and participates in
    /// reallocations like any other.
    pub fn escrow_empty_offer(&self) -> Result<(OfferHandle, PayoutReceiver), HostError> {
        let assays = self.assays()?;
        let handle = OfferHandle::new();
        let (sender, receiver) = oneshot::channel();
        self.core.offers_write()?.create(
            handle,
            OfferRecord {
                instance: Some(self.instance),
                payout_rules: Vec::new(),
                exit: ExitRuleKind::NoExit,
                assay_ids: assays.iter().map(|assay| assay.id()).collect(),
                units: assays.iter().map(|assay| assay.empty_units()).collect(),
                payout: Some(sender),
            },
        )?;
        info!(instance = %self.instance, offer = %handle, "empty offer escrowed");
        Ok((handle, receiver))
    }

    /// Validate and burn an escrow receipt, claiming the underlying offer
    /// into this instance. The offer's leg ordering must match the canonical
    /// assays; an offer already governed elsewhere cannot be claimed.
    pub fn burn_escrow_receipt(&self, receipt: &EscrowReceipt) -> Result<ClaimedOffer, HostError> {
        let canonical = {
            let instances = self.core.instances_read()?;
            instances.get(&self.instance)?.assay_ids()
        };

        // Lock order: mint before offers.
        let mut mint = self.core.mint_write()?;
        let mut offers = self.core.offers_write()?;

        let handle = mint.peek_receipt(receipt)?;
        let record = offers.get(&handle)?;
        if record.instance.is_some() {
            return Err(HostError::capability(
                "offer is already governed by an instance",
            ));
        }
        if record.assay_ids != canonical {
            return Err(HostError::structural(
                "offer legs do not match the instance's canonical assay ordering",
            ));
        }

        mint.burn_receipt(receipt)?;
        let record = offers.get_mut(&handle)?;
        record.instance = Some(self.instance);
        let claimed = ClaimedOffer {
            handle,
            payout_rules: record.payout_rules.clone(),
            exit: record.exit,
        };
        info!(instance = %self.instance, offer = %handle, "escrowed offer claimed");
        Ok(claimed)
    }

    /// Mint an invite scoped to this instance. The returned invite's offer
    /// handle is where the redeemer's offer will land, so the contract can
    /// track it from mint time.
    pub fn make_invite(
        &self,
        extent: serde_json::Value,
        seat: SeatObject,
    ) -> Result<Invite, HostError> {
        let handle = OfferHandle::new();
        Ok(self
            .core
            .mint_write()?
            .mint_invite(self.instance, handle, extent, seat))
    }

    /// Units per offer per canonical assay. Read-only.
    pub fn unit_matrix(&self, handles: &[OfferHandle]) -> Result<Vec<Vec<Units>>, HostError> {
        validate_batch(handles, &self.core.config)?;
        let assays = self.assays()?;
        let offers = self.core.offers_read()?;
        ensure_instance_offers(&offers, self.instance, handles)?;
        offers.unit_matrix(handles, &assays)
    }

    /// Payout rules per offer per canonical assay. Read-only.
    pub fn payout_rule_matrix(
        &self,
        handles: &[OfferHandle],
    ) -> Result<Vec<Vec<Option<PayoutRule>>>, HostError> {
        validate_batch(handles, &self.core.config)?;
        let assays = self.assays()?;
        let offers = self.core.offers_read()?;
        ensure_instance_offers(&offers, self.instance, handles)?;
        offers.payout_rule_matrix(handles, &assays)
    }

    /// `{active, inactive}` partition of the given handles. An offer this
    /// instance does not govern reads as inactive. Read-only.
    pub fn offer_statuses(&self, handles: &[OfferHandle]) -> Result<OfferStatuses, HostError> {
        validate_batch(handles, &self.core.config)?;
        let offers = self.core.offers_read()?;
        let mut statuses = OfferStatuses::default();
        for handle in handles {
            let governed = offers
                .get(handle)
                .map(|record| record.instance == Some(self.instance))
                .unwrap_or(false);
            if governed {
                statuses.active.push(*handle);
            } else {
                statuses.inactive.push(*handle);
            }
        }
        Ok(statuses)
    }
}
