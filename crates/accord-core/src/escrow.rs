//! The escrow & payout lifecycle: Created -> Escrowing -> Active ->
//! Completed/Cancelled.
//!
//! Every mutating operation here follows one discipline: validate everything
//! with no side effects, then perform all side effects with no further
//! validation. Deposits and withdrawals (the awaits) happen strictly outside
//! the table locks.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use accord_assets::{Assay, AssetError, Payment, Units};

use crate::error::HostError;
use crate::handles::{InstanceHandle, OfferHandle};
use crate::host::{HostConfig, HostCore};
use crate::invariants::{offer_safe_for_offer, rights_conserved};
use crate::rules::{ExitRule, OfferRules, PayoutRuleKind};
use crate::tables::{OfferRecord, OfferTable};

/// Pending payout: resolves exactly once, with one payment per leg of the
/// offer's assay ordering.
pub type PayoutReceiver = oneshot::Receiver<Vec<Payment>>;

/// Structural validation of an offer proposal. Runs before any deposit is
/// attempted; rejection here means zero side effects.
pub(crate) fn validate_offer_structure(
    rules: &OfferRules,
    payments: &[Option<Payment>],
    config: &HostConfig,
) -> Result<(), HostError> {
    if rules.payout_rules.is_empty() {
        return Err(HostError::structural("offer needs at least one payout rule"));
    }
    if rules.payout_rules.len() > config.max_payout_rules {
        return Err(HostError::structural(format!(
            "offer has {} payout rules, limit is {}",
            rules.payout_rules.len(),
            config.max_payout_rules
        )));
    }
    if payments.len() != rules.payout_rules.len() {
        return Err(HostError::structural(
            "payments must carry one slot per payout rule",
        ));
    }

    let mut seen = HashSet::new();
    for rule in &rules.payout_rules {
        if !seen.insert(rule.units.assay_id()) {
            return Err(HostError::structural(format!(
                "assay {} appears in more than one payout rule",
                rule.units.assay_id()
            )));
        }
    }

    for (index, (rule, payment)) in rules.payout_rules.iter().zip(payments).enumerate() {
        match rule.kind {
            PayoutRuleKind::Offer => {
                let Some(payment) = payment else {
                    return Err(HostError::structural(format!(
                        "offer leg {index} requires a payment"
                    )));
                };
                if payment.assay_id() != rule.units.assay_id() {
                    return Err(HostError::structural(format!(
                        "payment for leg {index} is drawn on the wrong assay"
                    )));
                }
            }
            PayoutRuleKind::Want => {
                if payment.is_some() {
                    return Err(HostError::structural(format!(
                        "payment supplied for want leg {index}"
                    )));
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_batch(handles: &[OfferHandle], config: &HostConfig) -> Result<(), HostError> {
    if handles.is_empty() {
        return Err(HostError::structural("batch requires at least one handle"));
    }
    if handles.len() > config.max_batch_handles {
        return Err(HostError::structural(format!(
            "batch names {} handles, limit is {}",
            handles.len(),
            config.max_batch_handles
        )));
    }
    let mut seen = HashSet::new();
    for handle in handles {
        if !seen.insert(*handle) {
            return Err(HostError::structural(format!(
                "handle {handle} appears twice in the batch"
            )));
        }
    }
    Ok(())
}

/// Every handle must be live and governed by `instance`.
pub(crate) fn ensure_instance_offers(
    offers: &OfferTable,
    instance: InstanceHandle,
    handles: &[OfferHandle],
) -> Result<(), HostError> {
    for handle in handles {
        let record = offers.get(handle)?;
        if record.instance != Some(instance) {
            return Err(HostError::capability(format!(
                "offer {handle} is not governed by this instance"
            )));
        }
    }
    Ok(())
}

/// Escrowing -> Active. All offer-leg deposits are initiated together and
/// the offer commits only once every one of them has succeeded; a partial
/// failure withdraws whatever landed and returns everything to the caller.
/// The caller is responsible for structural pre-validation of anything it
/// checked before consuming capabilities.
pub(crate) async fn escrow_offer(
    core: &Arc<HostCore>,
    handle: OfferHandle,
    instance: Option<InstanceHandle>,
    rules: &OfferRules,
    payments: &[Option<Payment>],
) -> Result<PayoutReceiver, HostError> {
    validate_offer_structure(rules, payments, &core.config)?;
    if core.offers_read()?.contains(&handle) {
        return Err(HostError::HandleInUse(handle.to_string()));
    }

    // Resolve an escrow account for every leg before moving any funds. An
    // assay is known once any instance names it in its terms or any payment
    // drawn on it reaches the host; a want leg on an assay the host has
    // never seen cannot pay out and is rejected here, with nothing consumed.
    let accounts = {
        let mut table = core.escrow_accounts_write()?;
        let mut accounts = Vec::with_capacity(rules.payout_rules.len());
        for (rule, payment) in rules.payout_rules.iter().zip(payments) {
            let assay_id = rule.units.assay_id();
            let account = if let Some(account) = table.lookup(assay_id) {
                account
            } else if let Some(payment) = payment {
                table.get_or_create(&payment.assay())
            } else {
                return Err(HostError::UnknownAssay(assay_id));
            };
            accounts.push(account);
        }
        accounts
    };

    // Initiate every deposit together; completion order must not matter.
    let mut deposit_futures = Vec::new();
    for (index, (rule, payment)) in rules.payout_rules.iter().zip(payments).enumerate() {
        if rule.kind != PayoutRuleKind::Offer {
            continue;
        }
        let Some(payment) = payment.as_ref() else {
            return Err(HostError::structural(format!(
                "offer leg {index} requires a payment"
            )));
        };
        let account = accounts[index].clone();
        deposit_futures.push(async move {
            (index, account.purse.deposit_exactly(&rule.units, payment).await)
        });
    }
    let results = futures::future::join_all(deposit_futures).await;

    let mut succeeded: Vec<usize> = Vec::new();
    let mut failures: Vec<(usize, AssetError)> = Vec::new();
    for (index, result) in results {
        match result {
            Ok(_) => succeeded.push(index),
            Err(error) => failures.push((index, error)),
        }
    }

    if !failures.is_empty() {
        // Unwind: draw the successful deposits back out and return them as
        // fresh payments. Failed legs consumed nothing, so those payments
        // never left the caller.
        let mut refunds = Vec::new();
        for index in succeeded {
            let rule = &rules.payout_rules[index];
            match accounts[index].purse.withdraw(&rule.units).await {
                Ok(payment) => refunds.push(payment),
                Err(error) => {
                    warn!(offer = %handle, %error, "deposit unwind failed while aborting escrow");
                }
            }
        }
        let reason = failures
            .iter()
            .map(|(index, error)| format!("leg {index}: {error}"))
            .collect::<Vec<_>>()
            .join("; ");
        warn!(offer = %handle, %reason, "escrow aborted; deposits returned");
        return Err(HostError::EscrowAborted { reason, refunds });
    }

    // Commit point: the units vector is recorded atomically.
    let units: Vec<Units> = rules
        .payout_rules
        .iter()
        .enumerate()
        .map(|(index, rule)| match rule.kind {
            PayoutRuleKind::Offer => rule.units.clone(),
            PayoutRuleKind::Want => accounts[index].assay.empty_units(),
        })
        .collect();
    let (sender, receiver) = oneshot::channel();
    core.offers_write()?.create(
        handle,
        OfferRecord {
            instance,
            payout_rules: rules.payout_rules.clone(),
            exit: rules.exit_rule.kind(),
            assay_ids: rules.assay_ids(),
            units,
            payout: Some(sender),
        },
    )?;
    info!(offer = %handle, legs = rules.payout_rules.len(), "offer escrowed");

    // Deadline offers complete themselves through the registered wakeup.
    if let ExitRule::AfterDeadline { deadline, timer } = &rules.exit_rule {
        let core = Arc::clone(core);
        timer.set_wakeup(
            *deadline,
            Box::new(move || {
                Box::pin(async move {
                    match core.complete_offers(&[handle]).await {
                        Ok(()) => {}
                        Err(HostError::OfferInactive { .. }) => {}
                        Err(error) => {
                            warn!(offer = %handle, %error, "deadline completion failed");
                        }
                    }
                })
            }),
        );
    }

    Ok(receiver)
}

impl HostCore {
    /// Active -> Completed/Cancelled. Validates every handle under one lock
    /// (any inactive handle rejects the whole call with zero mutation), then
    /// removes the records and resolves each payout with payments drawn from
    /// escrow at the currently standing units.
    pub(crate) async fn complete_offers(&self, handles: &[OfferHandle]) -> Result<(), HostError> {
        validate_batch(handles, &self.config)?;

        let removed: Vec<(OfferHandle, OfferRecord)> = {
            let mut offers = self.offers_write()?;
            for handle in handles {
                if !offers.contains(handle) {
                    warn!(offer = %handle, "completion rejected; offer inactive");
                    return Err(HostError::OfferInactive { handle: *handle });
                }
            }
            handles
                .iter()
                .map(|handle| offers.remove(handle).map(|record| (*handle, record)))
                .collect::<Result<_, _>>()?
        };

        for (handle, mut record) in removed {
            let mut drawn = Vec::with_capacity(record.units.len());
            for units in &record.units {
                let account = self.escrow_accounts_read()?.get(units.assay_id())?;
                // Escrow always holds at least the standing units while the
                // offer is live, so a failed withdraw means corrupted books.
                match account.purse.withdraw(units).await {
                    Ok(payment) => drawn.push(payment),
                    Err(error) => {
                        warn!(offer = %handle, %error, "escrow withdraw failed during payout");
                        return Err(HostError::Internal(format!(
                            "escrow purse refused a payout withdraw: {error}"
                        )));
                    }
                }
            }
            if let Some(sender) = record.payout.take() {
                if sender.send(drawn).is_err() {
                    warn!(offer = %handle, "payout receiver dropped; drawn payments discarded");
                }
            }
            info!(offer = %handle, "offer completed and paid out");
        }
        Ok(())
    }

    /// Validate a proposed reallocation against both invariants and commit
    /// it. Runs entirely inside one write lock: a failing check leaves the
    /// registries untouched, and a passing one mutates exactly the handles
    /// named.
    pub(crate) fn reallocate(
        &self,
        instance: InstanceHandle,
        handles: &[OfferHandle],
        assays: &[Arc<dyn Assay>],
        proposed: Vec<Vec<Units>>,
    ) -> Result<(), HostError> {
        validate_batch(handles, &self.config)?;

        let canonical_ids = {
            let instances = self.instances_read()?;
            instances.get(&instance)?.assay_ids()
        };
        let given_ids: Vec<_> = assays.iter().map(|assay| assay.id()).collect();
        if given_ids != canonical_ids {
            return Err(HostError::structural(
                "assay list does not match the instance's canonical ordering",
            ));
        }
        if proposed.len() != handles.len() {
            return Err(HostError::structural(
                "proposed unit matrix must have one row per handle",
            ));
        }
        for row in &proposed {
            if row.len() != assays.len() {
                return Err(HostError::structural(
                    "proposed unit matrix row does not cover the canonical assays",
                ));
            }
            for (units, assay) in row.iter().zip(assays) {
                if units.assay_id() != assay.id() {
                    return Err(HostError::structural(
                        "proposed units are labeled with the wrong assay",
                    ));
                }
            }
        }

        let algebras: Vec<_> = assays.iter().map(|assay| assay.algebra()).collect();

        let mut offers = self.offers_write()?;
        ensure_instance_offers(&offers, instance, handles)?;

        let previous = offers.unit_matrix(handles, assays)?;
        if !rights_conserved(&algebras, &previous, &proposed)? {
            warn!(instance = %instance, "reallocation rejected; rights not conserved");
            return Err(HostError::RightsNotConserved);
        }

        let rule_matrix = offers.payout_rule_matrix(handles, assays)?;
        for ((handle, rules), row) in handles.iter().zip(&rule_matrix).zip(&proposed) {
            if !offer_safe_for_offer(&algebras, rules, row)? {
                warn!(instance = %instance, offer = %handle, "reallocation rejected; not offer-safe");
                return Err(HostError::OfferUnsafe { handle: *handle });
            }
        }

        for (handle, row) in handles.iter().zip(proposed) {
            let record = offers.get_mut(handle)?;
            record.assay_ids = canonical_ids.clone();
            record.units = row;
        }
        info!(instance = %instance, offers = handles.len(), "reallocation committed");
        Ok(())
    }
}
