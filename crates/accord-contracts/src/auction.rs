use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use accord_assets::{Assay, Extent};
use accord_core::{
    ContractFacet, ContractInstaller, HostError, Invite, OfferHandle, PayoutRuleKind, SeatObject,
    StartOutput, Terms,
};

/// Sealed-bid second-price auction of one item.
///
/// Terms: two assays, the item first and the bid asset second, with
/// `params.minBids` setting how many bids close the auction. The seller's
/// want leg acts as a reserve: if the second price falls below it, closing
/// fails offer safety and the auction stays open.
pub struct SecondPriceAuction;

#[derive(Default)]
struct AuctionInner {
    seller: Option<OfferHandle>,
    bids: Vec<OfferHandle>,
    closed: bool,
}

struct AuctionState {
    facet: ContractFacet,
    min_bids: usize,
    inner: AsyncMutex<AuctionInner>,
}

#[async_trait]
impl ContractInstaller for SecondPriceAuction {
    async fn start(&self, facet: ContractFacet, terms: Terms) -> Result<StartOutput, HostError> {
        if terms.assays.len() != 2 {
            return Err(HostError::structural(
                "second-price auction requires an item assay and a bid assay",
            ));
        }
        let min_bids = terms
            .params
            .get("minBids")
            .and_then(|value| value.as_u64())
            .filter(|count| *count >= 1)
            .ok_or_else(|| HostError::structural("terms params must set minBids >= 1"))?
            as usize;

        let state = Arc::new(AuctionState {
            facet: facet.clone(),
            min_bids,
            inner: AsyncMutex::new(AuctionInner::default()),
        });
        let invite = facet.make_invite(
            json!({ "role": "seller" }),
            Arc::new(SellerPosition {
                state: Arc::clone(&state),
            }),
        )?;
        state.inner.lock().await.seller = Some(invite.handle());
        Ok(StartOutput::with_invite(invite))
    }
}

/// Seat of the party selling the item.
pub struct SellerPosition {
    state: Arc<AuctionState>,
}

impl SellerPosition {
    /// Mint one bidder invite. The seller's own offer must already be
    /// escrowed, offering the item and wanting the bid asset.
    pub async fn make_bidder_invite(&self) -> Result<Invite, HostError> {
        let seller = {
            let inner = self.state.inner.lock().await;
            if inner.closed {
                return Err(HostError::capability("auction already closed"));
            }
            inner
                .seller
                .ok_or_else(|| HostError::capability("seller position is not set"))?
        };
        let facet = &self.state.facet;

        let statuses = facet.offer_statuses(&[seller])?;
        if statuses.active != [seller] {
            return Err(HostError::capability("seller offer is not escrowed"));
        }
        let rules = facet.payout_rule_matrix(&[seller])?;
        match (&rules[0][0], &rules[0][1]) {
            (Some(item), Some(ask))
                if item.kind == PayoutRuleKind::Offer && ask.kind == PayoutRuleKind::Want => {}
            _ => {
                return Err(HostError::structural(
                    "seller position must offer the item and want the bid asset",
                ))
            }
        }

        let seat = Arc::new(BidderPosition {
            state: Arc::clone(&self.state),
            handle: OnceLock::new(),
        });
        let invite = facet.make_invite(
            json!({ "role": "bidder" }),
            Arc::clone(&seat) as SeatObject,
        )?;
        seat.handle
            .set(invite.handle())
            .map_err(|_| HostError::Internal("bidder handle already bound".into()))?;
        Ok(invite)
    }
}

/// Seat of one bidder. Calling [`BidderPosition::bid`] registers the
/// escrowed offer as a bid; the bid that reaches `minBids` closes the
/// auction.
pub struct BidderPosition {
    state: Arc<AuctionState>,
    handle: OnceLock<OfferHandle>,
}

impl BidderPosition {
    pub async fn bid(&self) -> Result<(), HostError> {
        let handle = *self
            .handle
            .get()
            .ok_or_else(|| HostError::Internal("bidder handle not bound".into()))?;
        let state = &self.state;
        let facet = &state.facet;

        let mut inner = state.inner.lock().await;
        if inner.closed {
            return Err(HostError::capability("auction already closed"));
        }
        if inner.bids.contains(&handle) {
            return Err(HostError::capability("bid already registered"));
        }

        let statuses = facet.offer_statuses(&[handle])?;
        if statuses.active != [handle] {
            return Err(HostError::capability("bid offer is not escrowed"));
        }
        let rules = facet.payout_rule_matrix(&[handle])?;
        match (&rules[0][0], &rules[0][1]) {
            (Some(item), Some(bid))
                if item.kind == PayoutRuleKind::Want && bid.kind == PayoutRuleKind::Offer => {}
            _ => {
                return Err(HostError::structural(
                    "bid position must want the item and offer the bid asset",
                ))
            }
        }

        inner.bids.push(handle);
        debug!(offer = %handle, bids = inner.bids.len(), "bid registered");

        // Bids withdrawn through their exit rules no longer count.
        let statuses = facet.offer_statuses(&inner.bids)?;
        inner.bids.retain(|bid| statuses.active.contains(bid));

        if inner.bids.len() >= state.min_bids {
            close_auction(state, &inner).await?;
            inner.closed = true;
        }
        Ok(())
    }
}

/// Settle: winner pays the second price, everyone else is refunded in full,
/// the seller receives the price.
async fn close_auction(state: &AuctionState, inner: &AuctionInner) -> Result<(), HostError> {
    let seller = inner
        .seller
        .ok_or_else(|| HostError::Internal("seller position is not set".into()))?;
    let facet = &state.facet;
    let assays = facet.assays()?;

    let mut handles = vec![seller];
    handles.extend(inner.bids.iter().copied());
    let matrix = facet.unit_matrix(&handles)?;

    let mut amounts = Vec::with_capacity(inner.bids.len());
    for row in &matrix[1..] {
        match &row[1].extent {
            Extent::Nat(amount) => amounts.push(*amount),
            _ => {
                return Err(HostError::structural(
                    "bids must be in a fungible assay",
                ))
            }
        }
    }

    let mut winner = 0usize;
    for (index, amount) in amounts.iter().enumerate() {
        if *amount > amounts[winner] {
            winner = index;
        }
    }
    let price = amounts
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != winner)
        .map(|(_, amount)| *amount)
        .max()
        .unwrap_or(amounts[winner]);

    let item = matrix[0][0].clone();
    let empty_item = assays[0].empty_units();
    let money = |amount: u64| assays[1].units(Extent::nat(amount));

    let mut proposed = Vec::with_capacity(handles.len());
    proposed.push(vec![empty_item.clone(), money(price)]);
    for (index, amount) in amounts.iter().enumerate() {
        if index == winner {
            proposed.push(vec![item.clone(), money(amount - price)]);
        } else {
            proposed.push(vec![empty_item.clone(), money(*amount)]);
        }
    }

    facet.reallocate(&handles, &assays, proposed)?;
    facet.complete(&handles).await?;
    info!(
        instance = %facet.instance_handle(),
        winner = %handles[winner + 1],
        price,
        "auction closed"
    );
    Ok(())
}
