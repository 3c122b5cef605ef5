use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use accord_assets::{Assay, Payment};

use crate::error::HostError;
use crate::escrow::{escrow_offer, validate_offer_structure, PayoutReceiver};
use crate::facet::ContractFacet;
use crate::handles::{InstallationHandle, InstanceHandle, OfferHandle};
use crate::install::{ContractInstaller, Terms};
use crate::rules::{ExitRule, OfferRules};
use crate::seats::{CapabilityMint, EscrowReceipt, Invite, SeatObject};
use crate::tables::{
    AssetEscrowTable, InstallationRecord, InstallationTable, InstanceRecord, InstanceTable,
    OfferTable,
};

/// Structural limits enforced before any side effect.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Maximum payout-rule legs per offer.
    pub max_payout_rules: usize,
    /// Maximum offer handles per batch call (`complete`, `reallocate`,
    /// matrix queries).
    pub max_batch_handles: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_payout_rules: 16,
            max_batch_handles: 64,
        }
    }
}

/// Shared host state. All registries live here, behind locks that are never
/// held across an await: mutating operations validate and commit inside one
/// critical section, with deposits and withdrawals strictly outside it.
pub(crate) struct HostCore {
    pub(crate) config: HostConfig,
    pub(crate) installations: RwLock<InstallationTable>,
    pub(crate) instances: RwLock<InstanceTable>,
    pub(crate) offers: RwLock<OfferTable>,
    pub(crate) escrow_accounts: RwLock<AssetEscrowTable>,
    pub(crate) mint: RwLock<CapabilityMint>,
}

impl HostCore {
    fn new(config: HostConfig) -> Self {
        Self {
            config,
            installations: RwLock::new(InstallationTable::default()),
            instances: RwLock::new(InstanceTable::default()),
            offers: RwLock::new(OfferTable::default()),
            escrow_accounts: RwLock::new(AssetEscrowTable::default()),
            mint: RwLock::new(CapabilityMint::default()),
        }
    }

    fn poisoned(table: &str) -> HostError {
        HostError::Internal(format!("{table} lock poisoned"))
    }

    pub(crate) fn installations_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, InstallationTable>, HostError> {
        self.installations
            .read()
            .map_err(|_| Self::poisoned("installation table"))
    }

    pub(crate) fn installations_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, InstallationTable>, HostError> {
        self.installations
            .write()
            .map_err(|_| Self::poisoned("installation table"))
    }

    pub(crate) fn instances_read(&self) -> Result<RwLockReadGuard<'_, InstanceTable>, HostError> {
        self.instances
            .read()
            .map_err(|_| Self::poisoned("instance table"))
    }

    pub(crate) fn instances_write(&self) -> Result<RwLockWriteGuard<'_, InstanceTable>, HostError> {
        self.instances
            .write()
            .map_err(|_| Self::poisoned("instance table"))
    }

    pub(crate) fn offers_read(&self) -> Result<RwLockReadGuard<'_, OfferTable>, HostError> {
        self.offers.read().map_err(|_| Self::poisoned("offer table"))
    }

    pub(crate) fn offers_write(&self) -> Result<RwLockWriteGuard<'_, OfferTable>, HostError> {
        self.offers
            .write()
            .map_err(|_| Self::poisoned("offer table"))
    }

    pub(crate) fn escrow_accounts_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, AssetEscrowTable>, HostError> {
        self.escrow_accounts
            .read()
            .map_err(|_| Self::poisoned("asset escrow table"))
    }

    pub(crate) fn escrow_accounts_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, AssetEscrowTable>, HostError> {
        self.escrow_accounts
            .write()
            .map_err(|_| Self::poisoned("asset escrow table"))
    }

    pub(crate) fn mint_write(&self) -> Result<RwLockWriteGuard<'_, CapabilityMint>, HostError> {
        self.mint
            .write()
            .map_err(|_| Self::poisoned("capability mint"))
    }
}

/// Result of instantiating a contract.
pub struct InstanceActivation {
    pub instance: InstanceHandle,
    pub invite: Option<Invite>,
    pub public: Option<SeatObject>,
}

impl std::fmt::Debug for InstanceActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceActivation")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of a running instance.
#[derive(Clone)]
pub struct InstanceSummary {
    pub instance: InstanceHandle,
    pub installation: InstallationHandle,
    pub assays: Vec<Arc<dyn Assay>>,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Result of a bare escrow: a burnable receipt, the pending payout, and the
/// cancel capability when the exit rule grants one.
pub struct EscrowedOffer {
    pub receipt: EscrowReceipt,
    pub payout: PayoutReceiver,
    pub cancel: Option<CancelCapability>,
}

impl std::fmt::Debug for EscrowedOffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowedOffer").finish_non_exhaustive()
    }
}

/// Result of redeeming an invite.
pub struct RedeemedSeat {
    pub seat: SeatObject,
    pub payout: PayoutReceiver,
    pub cancel: Option<CancelCapability>,
}

impl std::fmt::Debug for RedeemedSeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedeemedSeat").finish_non_exhaustive()
    }
}

/// Cancel authority over exactly one offer, issued to the original depositor
/// of an `OnDemand` offer. Cancelling is `complete` invoked early: the offer
/// pays out whatever units currently stand.
pub struct CancelCapability {
    core: Arc<HostCore>,
    handle: OfferHandle,
}

impl CancelCapability {
    pub async fn cancel(self) -> Result<(), HostError> {
        info!(offer = %self.handle, "on-demand cancellation requested");
        self.core.complete_offers(&[self.handle]).await
    }
}

/// The party-facing contract host service.
pub struct ContractHost {
    core: Arc<HostCore>,
}

impl ContractHost {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self {
            core: Arc::new(HostCore::new(config)),
        }
    }

    /// Register contract code under a fresh installation handle. The code is
    /// held as an opaque factory and never re-examined.
    pub fn install(
        &self,
        installer: Arc<dyn ContractInstaller>,
    ) -> Result<InstallationHandle, HostError> {
        let handle = InstallationHandle::new();
        self.core.installations_write()?.create(
            handle,
            InstallationRecord {
                installer,
                installed_at: Utc::now(),
            },
        )?;
        info!(installation = %handle, "contract installed");
        Ok(handle)
    }

    /// Instantiate installed code with a freshly built facet closed over a
    /// new instance handle. The terms' assay list becomes the instance's
    /// canonical assay ordering.
    pub async fn make_instance(
        &self,
        installation: InstallationHandle,
        terms: Terms,
    ) -> Result<InstanceActivation, HostError> {
        if terms.assays.is_empty() {
            return Err(HostError::structural("terms must name at least one assay"));
        }
        let mut seen = std::collections::HashSet::new();
        for assay in &terms.assays {
            if !seen.insert(assay.id()) {
                return Err(HostError::structural(format!(
                    "assay {} appears twice in terms",
                    assay.id()
                )));
            }
        }

        let installer = {
            let installations = self.core.installations_read()?;
            Arc::clone(&installations.get(&installation)?.installer)
        };

        let instance = InstanceHandle::new();
        self.core.instances_write()?.create(
            instance,
            InstanceRecord {
                installation,
                assays: terms.assays.clone(),
                params: terms.params.clone(),
                created_at: Utc::now(),
            },
        )?;
        // The canonical assays become known to the host here: every escrow
        // account an offer into this instance can touch exists from now on.
        {
            let mut accounts = self.core.escrow_accounts_write()?;
            for assay in &terms.assays {
                accounts.get_or_create(assay);
            }
        }

        let facet = ContractFacet::new(Arc::clone(&self.core), instance);
        let output = match installer.start(facet, terms).await {
            Ok(output) => output,
            Err(error) => {
                warn!(instance = %instance, %error, "contract start failed; instance handle stays unusable");
                return Err(error);
            }
        };
        info!(instance = %instance, installation = %installation, "contract instance started");

        Ok(InstanceActivation {
            instance,
            invite: output.invite,
            public: output.public,
        })
    }

    /// Credible read-only lookup of a running instance.
    pub fn get_instance(&self, instance: InstanceHandle) -> Result<InstanceSummary, HostError> {
        let instances = self.core.instances_read()?;
        let record = instances.get(&instance)?;
        Ok(InstanceSummary {
            instance,
            installation: record.installation,
            assays: record.assays.clone(),
            params: record.params.clone(),
            created_at: record.created_at,
        })
    }

    /// Escrow an offer that no instance governs yet. The returned receipt is
    /// the capability a governing contract later burns to claim the offer.
    pub async fn escrow(
        &self,
        rules: OfferRules,
        payments: &[Option<Payment>],
    ) -> Result<EscrowedOffer, HostError> {
        let handle = OfferHandle::new();
        let payout = escrow_offer(&self.core, handle, None, &rules, payments).await?;
        let receipt = self.core.mint_write()?.mint_receipt(handle);

        Ok(EscrowedOffer {
            receipt,
            payout,
            cancel: self.cancel_capability(&rules, handle),
        })
    }

    /// Burn an invite and escrow the accompanying offer under the invite's
    /// pre-allocated handle, bound to the invite's instance.
    ///
    /// The invite is consumed before funds move: if the deposits then fail,
    /// the invite stays burned and every payment comes back via
    /// `EscrowAborted`.
    pub async fn redeem(
        &self,
        invite: &Invite,
        rules: OfferRules,
        payments: &[Option<Payment>],
    ) -> Result<RedeemedSeat, HostError> {
        validate_offer_structure(&rules, payments, &self.core.config)?;

        // The offer must cover the instance's canonical assays, in order.
        let canonical = {
            let instances = self.core.instances_read()?;
            instances.get(&invite.instance())?.assay_ids()
        };
        if rules.assay_ids() != canonical {
            return Err(HostError::structural(
                "offer legs do not match the instance's canonical assay ordering",
            ));
        }

        let seat = self.core.mint_write()?.burn_invite(invite)?;
        let handle = invite.handle();
        let payout =
            escrow_offer(&self.core, handle, Some(invite.instance()), &rules, payments).await?;
        info!(instance = %invite.instance(), offer = %handle, "invite redeemed");

        Ok(RedeemedSeat {
            seat,
            payout,
            cancel: self.cancel_capability(&rules, handle),
        })
    }

    fn cancel_capability(&self, rules: &OfferRules, handle: OfferHandle) -> Option<CancelCapability> {
        match rules.exit_rule {
            ExitRule::OnDemand => Some(CancelCapability {
                core: Arc::clone(&self.core),
                handle,
            }),
            _ => None,
        }
    }
}

impl Default for ContractHost {
    fn default() -> Self {
        Self::new()
    }
}
