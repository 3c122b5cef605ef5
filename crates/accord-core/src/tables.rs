use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use accord_assets::{Assay, AssayId, Payment, Purse, Units};

use crate::error::HostError;
use crate::handles::{InstallationHandle, InstanceHandle, OfferHandle};
use crate::install::ContractInstaller;
use crate::rules::{ExitRuleKind, PayoutRule};

/// Loaded, not-yet-instantiated contract code.
pub struct InstallationRecord {
    pub installer: Arc<dyn ContractInstaller>,
    pub installed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InstallationTable {
    records: HashMap<InstallationHandle, InstallationRecord>,
}

impl InstallationTable {
    pub fn create(
        &mut self,
        handle: InstallationHandle,
        record: InstallationRecord,
    ) -> Result<(), HostError> {
        if self.records.contains_key(&handle) {
            return Err(HostError::HandleInUse(handle.to_string()));
        }
        self.records.insert(handle, record);
        Ok(())
    }

    pub fn get(&self, handle: &InstallationHandle) -> Result<&InstallationRecord, HostError> {
        self.records
            .get(handle)
            .ok_or(HostError::UnknownInstallation(*handle))
    }
}

/// One running contract instance. Never deleted; the handle stays resolvable
/// for the life of the host.
#[derive(Clone)]
pub struct InstanceRecord {
    pub installation: InstallationHandle,
    /// Canonical assay ordering, fixed at instantiation and used for all
    /// later batch operations in this instance.
    pub assays: Vec<Arc<dyn Assay>>,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn assay_ids(&self) -> Vec<AssayId> {
        self.assays.iter().map(|assay| assay.id()).collect()
    }
}

#[derive(Default)]
pub struct InstanceTable {
    records: HashMap<InstanceHandle, InstanceRecord>,
}

impl InstanceTable {
    pub fn create(
        &mut self,
        handle: InstanceHandle,
        record: InstanceRecord,
    ) -> Result<(), HostError> {
        if self.records.contains_key(&handle) {
            return Err(HostError::HandleInUse(handle.to_string()));
        }
        self.records.insert(handle, record);
        Ok(())
    }

    pub fn get(&self, handle: &InstanceHandle) -> Result<&InstanceRecord, HostError> {
        self.records
            .get(handle)
            .ok_or(HostError::UnknownInstance(*handle))
    }
}

/// One party's live position in one instance.
///
/// `units` is the only mutable part, and it only moves through a validated
/// reallocation. The record as a whole is removed exactly once, at
/// completion, which resolves the payout channel.
pub struct OfferRecord {
    /// Governing instance. `None` until the offer is claimed by a contract
    /// (bare escrow) or bound at redemption.
    pub instance: Option<InstanceHandle>,
    pub payout_rules: Vec<PayoutRule>,
    pub exit: ExitRuleKind,
    /// This offer's assay ordering; `units` is aligned with it.
    pub assay_ids: Vec<AssayId>,
    pub units: Vec<Units>,
    pub(crate) payout: Option<oneshot::Sender<Vec<Payment>>>,
}

/// `{active, inactive}` partition of a queried handle list.
#[derive(Clone, Debug, Default)]
pub struct OfferStatuses {
    pub active: Vec<OfferHandle>,
    pub inactive: Vec<OfferHandle>,
}

#[derive(Default)]
pub struct OfferTable {
    records: HashMap<OfferHandle, OfferRecord>,
}

impl OfferTable {
    pub fn create(&mut self, handle: OfferHandle, record: OfferRecord) -> Result<(), HostError> {
        if self.records.contains_key(&handle) {
            return Err(HostError::HandleInUse(handle.to_string()));
        }
        self.records.insert(handle, record);
        Ok(())
    }

    /// Absence means the offer already completed: the caller gets
    /// `OfferInactive`, which is how liveness is partly checked.
    pub fn get(&self, handle: &OfferHandle) -> Result<&OfferRecord, HostError> {
        self.records
            .get(handle)
            .ok_or(HostError::OfferInactive { handle: *handle })
    }

    pub fn get_mut(&mut self, handle: &OfferHandle) -> Result<&mut OfferRecord, HostError> {
        self.records
            .get_mut(handle)
            .ok_or(HostError::OfferInactive { handle: *handle })
    }

    pub fn remove(&mut self, handle: &OfferHandle) -> Result<OfferRecord, HostError> {
        self.records
            .remove(handle)
            .ok_or(HostError::OfferInactive { handle: *handle })
    }

    pub fn contains(&self, handle: &OfferHandle) -> bool {
        self.records.contains_key(handle)
    }

    /// Units per offer per assay, rows in handle order, columns in `assays`
    /// order. An assay the offer does not touch reads as empty units.
    pub fn unit_matrix(
        &self,
        handles: &[OfferHandle],
        assays: &[Arc<dyn Assay>],
    ) -> Result<Vec<Vec<Units>>, HostError> {
        handles
            .iter()
            .map(|handle| {
                let record = self.get(handle)?;
                Ok(assays
                    .iter()
                    .map(|assay| {
                        record
                            .assay_ids
                            .iter()
                            .position(|id| *id == assay.id())
                            .map(|index| record.units[index].clone())
                            .unwrap_or_else(|| assay.empty_units())
                    })
                    .collect())
            })
            .collect()
    }

    /// Payout rules per offer per assay; `None` where the offer has no leg
    /// for that assay.
    pub fn payout_rule_matrix(
        &self,
        handles: &[OfferHandle],
        assays: &[Arc<dyn Assay>],
    ) -> Result<Vec<Vec<Option<PayoutRule>>>, HostError> {
        handles
            .iter()
            .map(|handle| {
                let record = self.get(handle)?;
                Ok(assays
                    .iter()
                    .map(|assay| {
                        record
                            .payout_rules
                            .iter()
                            .find(|rule| rule.units.assay_id() == assay.id())
                            .cloned()
                    })
                    .collect())
            })
            .collect()
    }

    /// Read-only liveness partition; inactive handles are those no longer
    /// present (already completed or cancelled).
    pub fn offer_statuses(&self, handles: &[OfferHandle]) -> OfferStatuses {
        let mut statuses = OfferStatuses::default();
        for handle in handles {
            if self.records.contains_key(handle) {
                statuses.active.push(*handle);
            } else {
                statuses.inactive.push(*handle);
            }
        }
        statuses
    }
}

/// The host's custody account for one asset kind.
#[derive(Clone)]
pub struct EscrowAccount {
    pub assay: Arc<dyn Assay>,
    pub purse: Arc<dyn Purse>,
}

#[derive(Default)]
pub struct AssetEscrowTable {
    accounts: HashMap<AssayId, EscrowAccount>,
}

impl AssetEscrowTable {
    /// Lazily materialize the custody purse for a previously-unseen assay,
    /// memoized by assay identity.
    pub fn get_or_create(&mut self, assay: &Arc<dyn Assay>) -> EscrowAccount {
        self.accounts
            .entry(assay.id())
            .or_insert_with(|| EscrowAccount {
                assay: Arc::clone(assay),
                purse: assay.make_empty_purse(),
            })
            .clone()
    }

    pub fn lookup(&self, assay_id: AssayId) -> Option<EscrowAccount> {
        self.accounts.get(&assay_id).cloned()
    }

    pub fn get(&self, assay_id: AssayId) -> Result<EscrowAccount, HostError> {
        self.accounts
            .get(&assay_id)
            .cloned()
            .ok_or(HostError::UnknownAssay(assay_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_assets::{Extent, LocalMint, NatAlgebra};

    fn moola_assay() -> Arc<dyn Assay> {
        LocalMint::new("moola", Arc::new(NatAlgebra)).assay()
    }

    fn offer_record(assay: &Arc<dyn Assay>, amount: u64) -> OfferRecord {
        let units = assay.units(Extent::nat(amount));
        OfferRecord {
            instance: None,
            payout_rules: vec![PayoutRule::offer(units.clone())],
            exit: ExitRuleKind::NoExit,
            assay_ids: vec![assay.id()],
            units: vec![units],
            payout: None,
        }
    }

    #[test]
    fn create_rejects_duplicate_handles() {
        let assay = moola_assay();
        let mut table = OfferTable::default();
        let handle = OfferHandle::new();

        table.create(handle, offer_record(&assay, 3)).unwrap();
        assert!(matches!(
            table.create(handle, offer_record(&assay, 5)),
            Err(HostError::HandleInUse(_))
        ));
    }

    #[test]
    fn removed_offers_read_as_inactive() {
        let assay = moola_assay();
        let mut table = OfferTable::default();
        let live = OfferHandle::new();
        let gone = OfferHandle::new();

        table.create(live, offer_record(&assay, 3)).unwrap();
        table.create(gone, offer_record(&assay, 5)).unwrap();
        table.remove(&gone).unwrap();

        let statuses = table.offer_statuses(&[live, gone]);
        assert_eq!(statuses.active, vec![live]);
        assert_eq!(statuses.inactive, vec![gone]);

        assert!(matches!(
            table.get(&gone),
            Err(HostError::OfferInactive { handle }) if handle == gone
        ));
    }

    #[test]
    fn unit_matrix_projects_missing_assays_as_empty() {
        let moola = moola_assay();
        let simoleans = moola_assay();
        let mut table = OfferTable::default();
        let handle = OfferHandle::new();
        table.create(handle, offer_record(&moola, 3)).unwrap();

        let matrix = table
            .unit_matrix(&[handle], &[Arc::clone(&moola), Arc::clone(&simoleans)])
            .unwrap();
        assert_eq!(matrix[0][0].extent, Extent::nat(3));
        assert_eq!(matrix[0][1].extent, Extent::nat(0));
        assert_eq!(matrix[0][1].assay_id(), simoleans.id());
    }

    #[test]
    fn escrow_accounts_are_memoized_by_assay() {
        let assay = moola_assay();
        let mut table = AssetEscrowTable::default();

        let first = table.get_or_create(&assay);
        let second = table.get_or_create(&assay);
        assert!(Arc::ptr_eq(&first.purse, &second.purse));

        assert!(table.lookup(assay.id()).is_some());

        let unseen = moola_assay();
        assert!(matches!(
            table.get(unseen.id()),
            Err(HostError::UnknownAssay(_))
        ));
    }
}
