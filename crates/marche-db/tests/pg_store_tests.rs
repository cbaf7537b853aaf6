//! PostgreSQL ledger store tests
//!
//! Run with `DATABASE_URL` pointing at a scratch database:
//! `cargo test -p marche-db -- --ignored`

use chrono::Utc;
use marche_db::{Database, DatabaseConfig, PgLedgerStore};
use marche_ledger::{LedgerError, LedgerStore, Mutation};
use marche_types::{
    AccountId, Actor, AuditAction, AuditEntry, AuditEntryId, CommissionRate, CreditInstruction,
    CreditStatus, CurrencyCode, EscrowFilter, EscrowOperation, EscrowStatus, EscrowTransaction, MinorUnits, OrderId,
    PaymentCaptured, UserId,
};
use rust_decimal_macros::dec;

async fn store() -> PgLedgerStore {
    let config = DatabaseConfig::from_env().expect("DATABASE_URL must be set");
    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();
    db.ledger_store()
}

fn escrow() -> EscrowTransaction {
    let event = PaymentCaptured {
        order_id: OrderId::new(),
        customer_id: UserId::new(),
        seller_id: UserId::new(),
        total_amount: MinorUnits(100_000),
        currency: CurrencyCode::new("XOF").unwrap(),
        commission_rate: CommissionRate::new(dec!(0.15)).unwrap(),
    };
    EscrowTransaction::open(&event, MinorUnits(85_000), MinorUnits(15_000), Utc::now()).unwrap()
}

fn created(tx: &EscrowTransaction) -> AuditEntry {
    AuditEntry::applied(tx.id, Actor::system(), AuditAction::Create, None, EscrowStatus::Pending, None)
}

fn release(tx: &EscrowTransaction, version: u64) -> Mutation {
    let audit = AuditEntry::applied(
        tx.id,
        Actor::customer(tx.customer_id),
        AuditAction::Transition(EscrowOperation::Release),
        Some(EscrowStatus::Delivered),
        EscrowStatus::Released,
        None,
    );
    let credits = CreditInstruction::for_release(tx, &AccountId::platform());
    Mutation::new(version, audit, |tx| {
        tx.status = EscrowStatus::Released;
        tx.released_at = Some(Utc::now());
    })
    .with_credits(credits)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_create_is_unique_per_order() {
    let store = store().await;
    let tx = escrow();
    store.create(tx.clone(), created(&tx)).await.unwrap();

    let mut again = escrow();
    again.order_id = tx.order_id;
    let err = store.create(again.clone(), created(&again)).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateOrder { .. }));

    let stored = store.get_by_order(&tx.order_id).await.unwrap();
    assert_eq!(stored.id, tx.id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_cas_commits_audit_and_credits_together() {
    let store = store().await;
    let tx = escrow();
    store.create(tx.clone(), created(&tx)).await.unwrap();

    let updated = store.compare_and_swap(&tx.id, release(&tx, 0)).await.unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.status, EscrowStatus::Released);

    let err = store.compare_and_swap(&tx.id, release(&tx, 0)).await.unwrap_err();
    assert!(matches!(err, LedgerError::VersionConflict { actual: 1, .. }));

    assert_eq!(store.audit_trail(&tx.id).await.unwrap().len(), 2);
    let credits = store.credits_for(&tx.id).await.unwrap();
    assert_eq!(credits.len(), 2);

    store
        .mark_credit_delivered(&credits[0].instruction.key)
        .await
        .unwrap();
    let remaining = store.credits_for(&tx.id).await.unwrap();
    assert_eq!(
        remaining
            .iter()
            .filter(|c| c.delivered_at.is_some())
            .count(),
        1
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_list_by_customer() {
    let store = store().await;
    let tx = escrow();
    store.create(tx.clone(), created(&tx)).await.unwrap();

    let listed = store
        .list(&EscrowFilter::by_customer(tx.customer_id))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, tx.id);
    assert_eq!(listed[0].total_amount, tx.total_amount);

    let unbounded = EscrowFilter {
        limit: Some(usize::MAX),
        ..EscrowFilter::by_customer(tx.customer_id)
    };
    assert_eq!(store.list(&unbounded).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_committed_mutation_reads_back_outcome() {
    let store = store().await;
    let tx = escrow();
    store.create(tx.clone(), created(&tx)).await.unwrap();

    let mutation = release(&tx, 0);
    let audit_id = mutation.audit.id;
    assert_eq!(store.committed_mutation(&tx.id, &audit_id).await.unwrap(), None);

    store.compare_and_swap(&tx.id, mutation).await.unwrap();
    let committed = store
        .committed_mutation(&tx.id, &audit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(committed.version, 1);
    assert_eq!(committed.status, EscrowStatus::Released);

    assert_eq!(
        store
            .committed_mutation(&tx.id, &AuditEntryId::new())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_rejected_credit_is_not_pending() {
    let store = store().await;
    let tx = escrow();
    store.create(tx.clone(), created(&tx)).await.unwrap();
    store.compare_and_swap(&tx.id, release(&tx, 0)).await.unwrap();

    let credits = store.credits_for(&tx.id).await.unwrap();
    let key = credits[0].instruction.key.clone();
    store.reject_credit(&key, "account closed").await.unwrap();

    let pending = store.pending_credits(usize::MAX).await.unwrap();
    assert!(pending.iter().all(|c| c.instruction.key != key));

    let parked = store
        .credits_for(&tx.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.instruction.key == key)
        .unwrap();
    assert_eq!(parked.status, CreditStatus::Rejected);
    assert_eq!(parked.last_error.as_deref(), Some("account closed"));
}
