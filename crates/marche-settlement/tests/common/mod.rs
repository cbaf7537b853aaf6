//! Shared fixtures for settlement tests

#![allow(dead_code)]

use std::sync::Arc;

use marche_ledger::InMemoryLedgerStore;
use marche_settlement::{BroadcastNotifier, EscrowConfig, SettlementService};
use marche_types::{
    CommissionRate, CurrencyCode, EscrowEvent, EscrowView, MinorUnits, OrderId, PaymentCaptured,
    UserId,
};
use marche_wallet::InMemoryWallet;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

pub struct Env {
    pub service: SettlementService,
    pub store: InMemoryLedgerStore,
    pub wallet: InMemoryWallet,
    pub events: broadcast::Receiver<EscrowEvent>,
}

pub fn env() -> Env {
    env_with(InMemoryLedgerStore::new(), EscrowConfig::default())
}

pub fn env_with(store: InMemoryLedgerStore, config: EscrowConfig) -> Env {
    let wallet = InMemoryWallet::new();
    let notifier = BroadcastNotifier::new(64);
    let events = notifier.subscribe();
    let service = SettlementService::new(Arc::new(store.clone()), Arc::new(wallet.clone()), config)
        .with_notifier(Arc::new(notifier));
    Env {
        service,
        store,
        wallet,
        events,
    }
}

pub fn captured(total: i64, rate: Decimal) -> PaymentCaptured {
    PaymentCaptured {
        order_id: OrderId::new(),
        customer_id: UserId::new(),
        seller_id: UserId::new(),
        total_amount: MinorUnits(total),
        currency: CurrencyCode::new("XOF").unwrap(),
        commission_rate: CommissionRate::new(rate).unwrap(),
    }
}

pub fn assert_conserved(view: &EscrowView) {
    assert_eq!(
        view.seller_amount.0 + view.commission_amount.0,
        view.total_amount.0,
        "split of {} does not add up",
        view.id
    );
}
