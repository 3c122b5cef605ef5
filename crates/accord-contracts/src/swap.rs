use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use accord_assets::UnitAlgebra;
use accord_core::{
    ContractFacet, ContractInstaller, HostError, Invite, OfferHandle, StartOutput, Terms,
};

/// Two-party atomic swap.
///
/// The instance starts with one invite for the first position. Once that
/// offer is escrowed, its seat mints the matching invite; the second seat
/// validates that the two positions mirror each other, swaps the unit
/// columns, and completes both offers.
pub struct AtomicSwap;

#[derive(Default)]
struct SwapPositions {
    first: Option<OfferHandle>,
    second: Option<OfferHandle>,
}

struct SwapState {
    facet: ContractFacet,
    positions: Mutex<SwapPositions>,
}

fn lock_positions(state: &SwapState) -> MutexGuard<'_, SwapPositions> {
    match state.positions.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl ContractInstaller for AtomicSwap {
    async fn start(&self, facet: ContractFacet, terms: Terms) -> Result<StartOutput, HostError> {
        if terms.assays.len() != 2 {
            return Err(HostError::structural(
                "atomic swap requires exactly two assays",
            ));
        }
        let state = Arc::new(SwapState {
            facet: facet.clone(),
            positions: Mutex::new(SwapPositions::default()),
        });
        let invite = facet.make_invite(
            json!({ "role": "first" }),
            Arc::new(FirstPosition {
                state: Arc::clone(&state),
            }),
        )?;
        lock_positions(&state).first = Some(invite.handle());
        Ok(StartOutput::with_invite(invite))
    }
}

/// Seat of the party that opened the swap.
pub struct FirstPosition {
    state: Arc<SwapState>,
}

impl FirstPosition {
    /// Mint the counterparty invite. Requires the first offer to be escrowed.
    pub fn make_matching_invite(&self) -> Result<Invite, HostError> {
        let first = lock_positions(&self.state)
            .first
            .ok_or_else(|| HostError::capability("first position is not set"))?;
        let facet = &self.state.facet;

        let statuses = facet.offer_statuses(&[first])?;
        if statuses.active != [first] {
            return Err(HostError::capability("first offer is not escrowed"));
        }

        let invite = facet.make_invite(
            json!({ "role": "second" }),
            Arc::new(SecondPosition {
                state: Arc::clone(&self.state),
            }),
        )?;
        lock_positions(&self.state).second = Some(invite.handle());
        Ok(invite)
    }
}

/// Seat of the counterparty. Calling [`SecondPosition::swap`] settles the
/// whole contract.
pub struct SecondPosition {
    state: Arc<SwapState>,
}

impl SecondPosition {
    pub async fn swap(&self) -> Result<(), HostError> {
        let (first, second) = {
            let positions = lock_positions(&self.state);
            let first = positions
                .first
                .ok_or_else(|| HostError::capability("first position is not set"))?;
            let second = positions
                .second
                .ok_or_else(|| HostError::capability("second position is not set"))?;
            (first, second)
        };
        let facet = &self.state.facet;
        let handles = [first, second];

        let statuses = facet.offer_statuses(&handles)?;
        if !statuses.inactive.is_empty() {
            return Err(HostError::capability(
                "both positions must be escrowed to swap",
            ));
        }

        // Each column must pair an offer leg with a want leg of equal units.
        let algebras = facet.algebras()?;
        let rule_matrix = facet.payout_rule_matrix(&handles)?;
        for (column, algebra) in algebras.iter().enumerate() {
            match (&rule_matrix[0][column], &rule_matrix[1][column]) {
                (Some(a), Some(b)) => {
                    let mirrored =
                        a.kind != b.kind && algebra.equals(&a.units.extent, &b.units.extent)?;
                    if !mirrored {
                        return Err(HostError::structural(
                            "positions do not mirror each other",
                        ));
                    }
                }
                _ => {
                    return Err(HostError::structural(
                        "positions do not cover the swap assays",
                    ))
                }
            }
        }

        let assays = facet.assays()?;
        let previous = facet.unit_matrix(&handles)?;
        let proposed = vec![previous[1].clone(), previous[0].clone()];
        facet.reallocate(&handles, &assays, proposed)?;
        facet.complete(&handles).await?;
        info!(instance = %facet.instance_handle(), "swap settled");
        Ok(())
    }
}
