//! Domain event fan-out
//!
//! Notification is fire-and-forget. A failing notifier is logged and
//! counted but never changes the outcome of the operation that emitted the
//! event.

use async_trait::async_trait;
use marche_types::EscrowEvent;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Consumer of `escrow.*` events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &EscrowEvent) -> Result<(), NotifyError>;
}

/// Writes each event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &EscrowEvent) -> Result<(), NotifyError> {
        info!(
            event = event.kind.name(),
            escrow_id = %event.escrow.id,
            order_id = %event.escrow.order_id,
            status = %event.escrow.status,
            "Escrow event"
        );
        Ok(())
    }
}

/// In-process broadcast channel of events
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<EscrowEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EscrowEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &EscrowEvent) -> Result<(), NotifyError> {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.kind.name(), "No event subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marche_types::{
        CommissionRate, CurrencyCode, EscrowEventKind, EscrowTransaction, MinorUnits, OrderId,
        PaymentCaptured, UserId,
    };

    fn event() -> EscrowEvent {
        let captured = PaymentCaptured {
            order_id: OrderId::new(),
            customer_id: UserId::new(),
            seller_id: UserId::new(),
            total_amount: MinorUnits(10),
            currency: CurrencyCode::new("XOF").unwrap(),
            commission_rate: CommissionRate::ZERO,
        };
        let tx = EscrowTransaction::open(&captured, MinorUnits(10), MinorUnits(0), Utc::now()).unwrap();
        EscrowEvent::for_transition(&tx)
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.notify(&event()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EscrowEventKind::Created);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_fine() {
        let notifier = BroadcastNotifier::default();
        assert!(notifier.notify(&event()).await.is_ok());
        assert!(LogNotifier.notify(&event()).await.is_ok());
    }
}
