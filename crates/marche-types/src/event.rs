//! Domain events emitted after successful transitions
//!
//! Consumed fire-and-forget by the notification collaborator.

use crate::{EscrowStatus, EscrowTransaction, EscrowView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of escrow event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowEventKind {
    #[serde(rename = "escrow.created")]
    Created,
    #[serde(rename = "escrow.delivered")]
    Delivered,
    #[serde(rename = "escrow.released")]
    Released,
    #[serde(rename = "escrow.disputed")]
    Disputed,
    #[serde(rename = "escrow.refunded")]
    Refunded,
    #[serde(rename = "escrow.dispute_escalated")]
    DisputeEscalated,
}

impl EscrowEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "escrow.created",
            Self::Delivered => "escrow.delivered",
            Self::Released => "escrow.released",
            Self::Disputed => "escrow.disputed",
            Self::Refunded => "escrow.refunded",
            Self::DisputeEscalated => "escrow.dispute_escalated",
        }
    }

    /// Event announcing arrival in `status`
    pub fn for_status(status: EscrowStatus) -> Self {
        match status {
            EscrowStatus::Pending => Self::Created,
            EscrowStatus::Delivered => Self::Delivered,
            EscrowStatus::Released => Self::Released,
            EscrowStatus::Disputed => Self::Disputed,
            EscrowStatus::Refunded => Self::Refunded,
        }
    }
}

impl fmt::Display for EscrowEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event payload: the kind plus a snapshot of the escrow after the change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub kind: EscrowEventKind,
    pub escrow: EscrowView,
    pub occurred_at: DateTime<Utc>,
}

impl EscrowEvent {
    pub fn new(kind: EscrowEventKind, tx: &EscrowTransaction) -> Self {
        Self {
            kind,
            escrow: EscrowView::from(tx.clone()),
            occurred_at: Utc::now(),
        }
    }

    /// Event for the status the escrow currently sits in
    pub fn for_transition(tx: &EscrowTransaction) -> Self {
        Self::new(EscrowEventKind::for_status(tx.status), tx)
    }
}
