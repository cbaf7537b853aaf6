//! Scheduler sweeps: auto-release, dispute escalation and credit retries

mod common;

use chrono::{Duration, Utc};
use common::{captured, env};
use marche_ledger::LedgerStore;
use marche_settlement::SweepReport;
use marche_types::{AccountId, Actor, CreditStatus, EscrowEventKind, EscrowStatus, MinorUnits, UserId};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_auto_release_after_grace_period() {
    let env = env();
    let delivered = env
        .service
        .create(captured(20_000, dec!(0.1)), Actor::system())
        .await
        .unwrap();
    let waiting = env
        .service
        .create(captured(30_000, dec!(0.1)), Actor::system())
        .await
        .unwrap();
    env.service
        .confirm_delivery(&delivered.id, Actor::customer(delivered.customer_id))
        .await
        .unwrap();

    // Grace not yet over
    let report = env.service.auto_release_due(Utc::now()).await.unwrap();
    assert_eq!(report, SweepReport::default());

    let later = Utc::now() + Duration::days(4);
    let report = env.service.auto_release_due(later).await.unwrap();
    assert_eq!(report.processed, 1);

    let released = env.service.get(&delivered.id, Actor::system()).await.unwrap();
    assert_eq!(released.status, EscrowStatus::Released);
    let untouched = env.service.get(&waiting.id, Actor::system()).await.unwrap();
    assert_eq!(untouched.status, EscrowStatus::Pending);

    assert_eq!(
        env.wallet
            .balance(&AccountId::for_user(&delivered.seller_id), &delivered.currency)
            .await,
        MinorUnits(18_000)
    );

    // Nothing left to do on the next run
    let report = env.service.auto_release_due(later).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn test_stale_disputes_are_announced_not_resolved() {
    let mut env = env();
    let escrow = env
        .service
        .create(captured(20_000, dec!(0.1)), Actor::system())
        .await
        .unwrap();
    env.service
        .open_dispute(&escrow.id, Actor::customer(escrow.customer_id), "wrong size")
        .await
        .unwrap();
    // Drain created and disputed
    env.events.recv().await.unwrap();
    env.events.recv().await.unwrap();

    let report = env.service.escalate_stale_disputes(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 0);

    let report = env
        .service
        .escalate_stale_disputes(Utc::now() + Duration::days(8))
        .await
        .unwrap();
    assert_eq!(report.processed, 1);

    let event = env.events.recv().await.unwrap();
    assert_eq!(event.kind, EscrowEventKind::DisputeEscalated);
    assert_eq!(event.escrow.id, escrow.id);

    let stored = env.service.get(&escrow.id, Actor::system()).await.unwrap();
    assert_eq!(stored.status, EscrowStatus::Disputed);
    assert!(env.wallet.credits().await.is_empty());
}

#[tokio::test]
async fn test_credits_survive_wallet_outage() {
    let env = env();
    let escrow = env
        .service
        .create(captured(100_000, dec!(0.15)), Actor::system())
        .await
        .unwrap();
    let customer = Actor::customer(escrow.customer_id);
    env.service.confirm_delivery(&escrow.id, customer).await.unwrap();

    env.wallet.set_offline(true).await;
    let released = env.service.release(&escrow.id, customer).await.unwrap();
    assert_eq!(released.status, EscrowStatus::Released);
    assert!(env.wallet.credits().await.is_empty());

    let queued = env.store.credits_for(&escrow.id).await.unwrap();
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|c| c.status == CreditStatus::Pending));
    assert!(queued.iter().all(|c| c.last_error.is_some()));

    // Still down: retries fail and leave the credits queued
    let report = env.service.retry_pending_credits().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 2);

    env.wallet.set_offline(false).await;
    let report = env.service.retry_pending_credits().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert!(env.store.pending_credits(10).await.unwrap().is_empty());

    let report = env.service.retry_pending_credits().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(env.wallet.credits().await.len(), 2);
}

#[tokio::test]
async fn test_sweep_skips_escrow_disputed_meanwhile() {
    let env = env();
    let escrow = env
        .service
        .create(captured(20_000, dec!(0.1)), Actor::system())
        .await
        .unwrap();
    let customer = Actor::customer(escrow.customer_id);
    env.service.confirm_delivery(&escrow.id, customer).await.unwrap();
    env.service
        .open_dispute(&escrow.id, customer, "arrived broken")
        .await
        .unwrap();

    let report = env
        .service
        .auto_release_due(Utc::now() + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(report.processed, 0);

    let stored = env
        .service
        .get(&escrow.id, Actor::adjudicator(UserId::new()))
        .await
        .unwrap();
    assert_eq!(stored.status, EscrowStatus::Disputed);
}
