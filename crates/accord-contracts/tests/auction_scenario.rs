//! Scenario: second-price auction of one item, three bids of 11/7/5
//! simoleans, minBids = 3. The winner pays 7 (second price) and receives the
//! item plus a 4-simolean refund; the other bidders are refunded in full;
//! the seller receives 7.

use std::sync::Arc;

use serde_json::json;

use accord_assets::{Assay, Extent, LocalMint, NatAlgebra, Payment, SetAlgebra};
use accord_contracts::{BidderPosition, SecondPriceAuction, SellerPosition};
use accord_core::{
    ContractHost, ExitRule, HostError, OfferRules, PayoutReceiver, PayoutRule, RedeemedSeat, Terms,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct AuctionSetup {
    host: ContractHost,
    gallery: LocalMint,
    simoleans: LocalMint,
    seller_invite: accord_core::Invite,
}

async fn start_auction(min_bids: u64) -> AuctionSetup {
    init_tracing();
    let host = ContractHost::new();
    let gallery = LocalMint::new("gallery pieces", Arc::new(SetAlgebra));
    let simoleans = LocalMint::new("simoleans", Arc::new(NatAlgebra));

    let installation = host.install(Arc::new(SecondPriceAuction)).unwrap();
    let activation = host
        .make_instance(
            installation,
            Terms::new(vec![gallery.assay(), simoleans.assay()])
                .with_params(json!({ "minBids": min_bids })),
        )
        .await
        .unwrap();

    AuctionSetup {
        host,
        gallery,
        simoleans,
        seller_invite: activation.invite.expect("auction starts with the seller invite"),
    }
}

async fn escrow_seller(
    setup: &AuctionSetup,
    reserve: u64,
    exit: ExitRule,
) -> (Arc<SellerPosition>, PayoutReceiver) {
    let item = setup
        .gallery
        .mint_payment(Extent::set(["painting"]))
        .await
        .unwrap();
    let seller = setup
        .host
        .redeem(
            &setup.seller_invite,
            OfferRules::new(
                vec![
                    PayoutRule::offer(setup.gallery.assay().units(Extent::set(["painting"]))),
                    PayoutRule::want(setup.simoleans.assay().units(Extent::nat(reserve))),
                ],
                exit,
            ),
            &[Some(item), None],
        )
        .await
        .unwrap();
    let seat = seller.seat.downcast::<SellerPosition>().ok().unwrap();
    (seat, seller.payout)
}

async fn escrow_bid(
    setup: &AuctionSetup,
    seller_seat: &SellerPosition,
    amount: u64,
    exit: ExitRule,
) -> RedeemedSeat {
    let invite = seller_seat.make_bidder_invite().await.unwrap();
    let payment = setup
        .simoleans
        .mint_payment(Extent::nat(amount))
        .await
        .unwrap();
    setup
        .host
        .redeem(
            &invite,
            OfferRules::new(
                vec![
                    PayoutRule::want(setup.gallery.assay().units(Extent::set(["painting"]))),
                    PayoutRule::offer(setup.simoleans.assay().units(Extent::nat(amount))),
                ],
                exit,
            ),
            &[None, Some(payment)],
        )
        .await
        .unwrap()
}

fn bidder(redeemed: &RedeemedSeat) -> Arc<BidderPosition> {
    redeemed
        .seat
        .clone()
        .downcast::<BidderPosition>()
        .ok()
        .expect("bidder invite carries a bidder position")
}

fn assert_payout(payout: &[Payment], item_ids: &[&str], amount: u64) {
    assert_eq!(payout.len(), 2);
    assert_eq!(payout[0].units().extent, Extent::set(item_ids.to_vec()));
    assert_eq!(payout[1].units().extent, Extent::nat(amount));
}

#[tokio::test]
async fn winner_pays_the_second_price() {
    let setup = start_auction(3).await;
    let (seller_seat, seller_payout) = escrow_seller(&setup, 3, ExitRule::NoExit).await;

    let high = escrow_bid(&setup, &seller_seat, 11, ExitRule::NoExit).await;
    let mid = escrow_bid(&setup, &seller_seat, 7, ExitRule::NoExit).await;
    let low = escrow_bid(&setup, &seller_seat, 5, ExitRule::NoExit).await;

    // The third registered bid closes the auction.
    bidder(&high).bid().await.unwrap();
    bidder(&mid).bid().await.unwrap();
    bidder(&low).bid().await.unwrap();

    // Winner: the item plus an 11 - 7 = 4 simolean refund.
    assert_payout(&high.payout.await.unwrap(), &["painting"], 4);
    // Losers: full refunds.
    assert_payout(&mid.payout.await.unwrap(), &[], 7);
    assert_payout(&low.payout.await.unwrap(), &[], 5);
    // Seller: the second price.
    assert_payout(&seller_payout.await.unwrap(), &[], 7);
}

#[tokio::test]
async fn late_bids_bounce_off_a_closed_auction() {
    let setup = start_auction(2).await;
    let (seller_seat, _seller_payout) = escrow_seller(&setup, 1, ExitRule::NoExit).await;

    let first = escrow_bid(&setup, &seller_seat, 4, ExitRule::NoExit).await;
    let second = escrow_bid(&setup, &seller_seat, 6, ExitRule::NoExit).await;
    // A third invite minted while the auction is still open.
    let late_invite = seller_seat.make_bidder_invite().await.unwrap();

    first.seat.clone().downcast::<BidderPosition>().ok().unwrap().bid().await.unwrap();
    second.seat.clone().downcast::<BidderPosition>().ok().unwrap().bid().await.unwrap();

    // The auction settled at two bids; the late party can still redeem (the
    // invite is real) but the bid itself is refused.
    let payment = setup.simoleans.mint_payment(Extent::nat(9)).await.unwrap();
    let late = setup
        .host
        .redeem(
            &late_invite,
            OfferRules::new(
                vec![
                    PayoutRule::want(setup.gallery.assay().units(Extent::set(["painting"]))),
                    PayoutRule::offer(setup.simoleans.assay().units(Extent::nat(9))),
                ],
                ExitRule::OnDemand,
            ),
            &[None, Some(payment)],
        )
        .await
        .unwrap();
    let error = late
        .seat
        .clone()
        .downcast::<BidderPosition>()
        .ok()
        .unwrap()
        .bid()
        .await
        .unwrap_err();
    assert!(matches!(error, HostError::Capability(_)));

    // Their escrow exits on demand with a full refund.
    late.cancel.expect("on-demand exit").cancel().await.unwrap();
    assert_payout(&late.payout.await.unwrap(), &[], 9);
}

#[tokio::test]
async fn unmet_reserve_keeps_the_auction_open() {
    let setup = start_auction(2).await;
    // Reserve of 20 simoleans, which no second price will reach.
    let (seller_seat, _seller_payout) = escrow_seller(&setup, 20, ExitRule::NoExit).await;

    let first = escrow_bid(&setup, &seller_seat, 4, ExitRule::OnDemand).await;
    let second = escrow_bid(&setup, &seller_seat, 6, ExitRule::OnDemand).await;

    first.seat.clone().downcast::<BidderPosition>().ok().unwrap().bid().await.unwrap();
    let error = second
        .seat
        .clone()
        .downcast::<BidderPosition>()
        .ok()
        .unwrap()
        .bid()
        .await
        .unwrap_err();
    // Closing would strip the seller below the reserve: offer safety blocks
    // it and nothing moved.
    assert!(matches!(error, HostError::OfferUnsafe { .. }));

    // Every bidder can still walk away whole.
    second.cancel.expect("on-demand exit").cancel().await.unwrap();
    assert_payout(&second.payout.await.unwrap(), &[], 6);
    first.cancel.expect("on-demand exit").cancel().await.unwrap();
    assert_payout(&first.payout.await.unwrap(), &[], 4);
}
