//! Host-level escrow lifecycle: deadlines, cancellation, structural
//! rejection, and aborted escrows.

use std::sync::Arc;

use accord_assets::{Assay, Extent, LocalMint, NatAlgebra, Purse};
use accord_core::{
    ContractHost, ExitRule, HostConfig, HostError, ManualTimer, OfferRules, PayoutRule,
    TimerService,
};

fn moola_mint() -> LocalMint {
    LocalMint::new("moola", Arc::new(NatAlgebra))
}

fn simolean_mint() -> LocalMint {
    LocalMint::new("simoleans", Arc::new(NatAlgebra))
}

#[tokio::test]
async fn deadline_offer_completes_with_a_full_refund() {
    let host = ContractHost::new();
    let timer = Arc::new(ManualTimer::new());
    let moola = moola_mint();
    let assay = moola.assay();

    let payment = moola.mint_payment(Extent::nat(5)).await.unwrap();
    let rules = OfferRules::new(
        vec![PayoutRule::offer(assay.units(Extent::nat(5)))],
        ExitRule::AfterDeadline {
            deadline: 1,
            timer: Arc::clone(&timer) as Arc<dyn TimerService>,
        },
    );

    let escrowed = host.escrow(rules, &[Some(payment)]).await.unwrap();
    assert!(escrowed.cancel.is_none());

    // No counter-offer ever arrives; the wakeup fires at tick 1.
    timer.advance_to(1).await;

    let payout = escrowed.payout.await.unwrap();
    assert_eq!(payout.len(), 1);
    assert_eq!(payout[0].units().extent, Extent::nat(5));

    // The refund is a real payment, spendable with the issuer.
    let refunded = moola.burn(&payout[0]).await.unwrap();
    assert_eq!(refunded.extent, Extent::nat(5));
}

#[tokio::test]
async fn on_demand_offer_cancels_to_a_full_refund() {
    let host = ContractHost::new();
    let moola = moola_mint();

    let payment = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let rules = OfferRules::new(
        vec![PayoutRule::offer(moola.assay().units(Extent::nat(3)))],
        ExitRule::OnDemand,
    );

    let escrowed = host.escrow(rules, &[Some(payment)]).await.unwrap();
    let cancel = escrowed.cancel.expect("on-demand offers carry a cancel capability");

    cancel.cancel().await.unwrap();

    let payout = escrowed.payout.await.unwrap();
    assert_eq!(payout.len(), 1);
    assert_eq!(payout[0].units().extent, Extent::nat(3));
    moola.burn(&payout[0]).await.unwrap();
}

#[tokio::test]
async fn bare_want_legs_require_an_assay_the_host_has_seen() {
    let host = ContractHost::new();
    let moola = moola_mint();
    let simoleans = simolean_mint();

    // Nothing simolean-denominated has ever reached this host, so a want
    // leg in that assay has no payout purse to draw from.
    let payment = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let rules = OfferRules::new(
        vec![
            PayoutRule::offer(moola.assay().units(Extent::nat(3))),
            PayoutRule::want(simoleans.assay().units(Extent::nat(7))),
        ],
        ExitRule::OnDemand,
    );
    let payments = [Some(payment), None];
    let error = host.escrow(rules.clone(), &payments).await.unwrap_err();
    assert!(matches!(error, HostError::UnknownAssay(_)));

    // Rejection happened before any deposit: the payment still spends.
    let purse = moola.assay().make_empty_purse();
    purse
        .deposit_all(payments[0].as_ref().unwrap())
        .await
        .unwrap();

    // Any simolean deposit introduces the assay; the same offer then works.
    let seed = simoleans.mint_payment(Extent::nat(1)).await.unwrap();
    let seed_rules = OfferRules::new(
        vec![PayoutRule::offer(simoleans.assay().units(Extent::nat(1)))],
        ExitRule::OnDemand,
    );
    let seeded = host.escrow(seed_rules, &[Some(seed)]).await.unwrap();

    let payment = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let escrowed = host.escrow(rules, &[Some(payment), None]).await.unwrap();
    escrowed.cancel.expect("on-demand exit").cancel().await.unwrap();

    let payout = escrowed.payout.await.unwrap();
    assert_eq!(payout.len(), 2);
    assert_eq!(payout[0].units().extent, Extent::nat(3));
    assert_eq!(payout[1].units().extent, Extent::nat(0));

    seeded.cancel.expect("on-demand exit").cancel().await.unwrap();
}

#[tokio::test]
async fn no_exit_offer_gets_no_cancel_capability() {
    let host = ContractHost::new();
    let moola = moola_mint();
    let payment = moola.mint_payment(Extent::nat(1)).await.unwrap();
    let rules = OfferRules::new(
        vec![PayoutRule::offer(moola.assay().units(Extent::nat(1)))],
        ExitRule::NoExit,
    );
    let escrowed = host.escrow(rules, &[Some(payment)]).await.unwrap();
    assert!(escrowed.cancel.is_none());
}

#[tokio::test]
async fn payment_on_a_want_leg_rejects_before_any_deposit() {
    let host = ContractHost::new();
    let moola = moola_mint();
    let simoleans = simolean_mint();

    let offered = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let stray = simoleans.mint_payment(Extent::nat(7)).await.unwrap();
    let rules = OfferRules::new(
        vec![
            PayoutRule::offer(moola.assay().units(Extent::nat(3))),
            PayoutRule::want(simoleans.assay().units(Extent::nat(7))),
        ],
        ExitRule::NoExit,
    );

    let payments = [Some(offered), Some(stray)];
    let error = host.escrow(rules, &payments).await.unwrap_err();
    assert!(matches!(error, HostError::Structural(_)));

    // Neither payment was touched: both still spend cleanly.
    let purse = moola.assay().make_empty_purse();
    purse
        .deposit_all(payments[0].as_ref().unwrap())
        .await
        .unwrap();
    simoleans.burn(payments[1].as_ref().unwrap()).await.unwrap();
}

#[tokio::test]
async fn failed_deposit_aborts_the_whole_offer_and_returns_everything() {
    let host = ContractHost::new();
    let moola = moola_mint();
    let simoleans = simolean_mint();

    // The simolean payment carries 5, but the leg states 7: that deposit
    // fails, so the successful moola deposit must come back too.
    let good = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let short = simoleans.mint_payment(Extent::nat(5)).await.unwrap();
    let rules = OfferRules::new(
        vec![
            PayoutRule::offer(moola.assay().units(Extent::nat(3))),
            PayoutRule::offer(simoleans.assay().units(Extent::nat(7))),
        ],
        ExitRule::NoExit,
    );

    let payments = [Some(good), Some(short)];
    let error = host.escrow(rules, &payments).await.unwrap_err();
    let HostError::EscrowAborted { refunds, .. } = error else {
        panic!("expected EscrowAborted, got {error}");
    };

    // The moola deposit landed and was drawn back out as a fresh payment.
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].units().assay_id(), moola.assay().id());
    assert_eq!(refunds[0].units().extent, Extent::nat(3));
    moola.burn(&refunds[0]).await.unwrap();

    // The failing leg's payment never left the caller.
    let short = payments[1].as_ref().unwrap();
    assert_eq!(short.units().extent, Extent::nat(5));
    simoleans.burn(short).await.unwrap();
}

#[tokio::test]
async fn empty_payout_rules_are_structurally_rejected() {
    let host = ContractHost::new();
    let rules = OfferRules::new(Vec::new(), ExitRule::NoExit);
    let error = host.escrow(rules, &[]).await.unwrap_err();
    assert!(matches!(error, HostError::Structural(_)));
}

#[tokio::test]
async fn configured_leg_limit_rejects_oversized_offers() {
    let host = ContractHost::with_config(HostConfig {
        max_payout_rules: 1,
        ..HostConfig::default()
    });
    let moola = moola_mint();
    let simoleans = simolean_mint();

    let payment = moola.mint_payment(Extent::nat(3)).await.unwrap();
    let rules = OfferRules::new(
        vec![
            PayoutRule::offer(moola.assay().units(Extent::nat(3))),
            PayoutRule::want(simoleans.assay().units(Extent::nat(7))),
        ],
        ExitRule::NoExit,
    );
    let payments = [Some(payment), None];
    let error = host.escrow(rules, &payments).await.unwrap_err();
    assert!(matches!(error, HostError::Structural(_)));

    // The payment was never touched.
    moola.burn(payments[0].as_ref().unwrap()).await.unwrap();
}
