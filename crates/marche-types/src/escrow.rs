//! Escrow types
//!
//! An escrow transaction holds a buyer's payment until delivery is confirmed
//! or a dispute is adjudicated. Its status is a closed set of variants and
//! the only legal moves between them are listed in [`EscrowStatus::apply`].

use crate::{
    CommissionRate, CurrencyCode, EscrowId, MinorUnits, OrderId, UserId, ValidationError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an escrow transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds held, awaiting delivery
    Pending,
    /// Buyer acknowledged receipt; funds not yet moved
    Delivered,
    /// Funds paid out to seller and platform
    Released,
    /// A party contested the transaction
    Disputed,
    /// Total amount returned to the customer
    Refunded,
}

impl EscrowStatus {
    pub const ALL: [EscrowStatus; 5] = [
        Self::Pending,
        Self::Delivered,
        Self::Released,
        Self::Disputed,
        Self::Refunded,
    ];

    /// Statuses in which funds are still held
    pub const ACTIVE: [EscrowStatus; 3] = [Self::Pending, Self::Delivered, Self::Disputed];

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    /// Check if funds are still held
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Legal-transition table.
    ///
    /// Returns the target status, or `None` when `op` is not allowed from
    /// `self`.
    pub fn apply(&self, op: EscrowOperation) -> Option<EscrowStatus> {
        use EscrowOperation as Op;
        use EscrowStatus as S;
        match (self, op) {
            (S::Pending, Op::ConfirmDelivery) => Some(S::Delivered),
            (S::Delivered, Op::Release) => Some(S::Released),
            (S::Disputed, Op::Release) => Some(S::Released),
            (S::Pending | S::Delivered, Op::OpenDispute) => Some(S::Disputed),
            (S::Disputed, Op::ResolveDispute(DisputeAction::Release)) => Some(S::Released),
            (S::Disputed, Op::ResolveDispute(DisputeAction::Refund)) => Some(S::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Released => "released",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "escrow status",
                value: s.to_string(),
            })
    }
}

/// Outcome chosen when adjudicating a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeAction {
    /// Customer wins: total amount goes back to the customer
    Refund,
    /// Seller wins: funds are split as on a normal release
    Release,
}

impl DisputeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Release => "release",
        }
    }
}

/// State-changing operations on an escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "operation", content = "action", rename_all = "snake_case")]
pub enum EscrowOperation {
    ConfirmDelivery,
    Release,
    OpenDispute,
    ResolveDispute(DisputeAction),
}

impl EscrowOperation {
    /// Every operation the state machine knows about
    pub const ALL: [EscrowOperation; 5] = [
        Self::ConfirmDelivery,
        Self::Release,
        Self::OpenDispute,
        Self::ResolveDispute(DisputeAction::Refund),
        Self::ResolveDispute(DisputeAction::Release),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmDelivery => "confirm_delivery",
            Self::Release => "release",
            Self::OpenDispute => "open_dispute",
            Self::ResolveDispute(DisputeAction::Refund) => "resolve_dispute:refund",
            Self::ResolveDispute(DisputeAction::Release) => "resolve_dispute:release",
        }
    }
}

impl fmt::Display for EscrowOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream payment-capture event that opens an escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCaptured {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub seller_id: UserId,
    pub total_amount: MinorUnits,
    pub currency: CurrencyCode,
    pub commission_rate: CommissionRate,
}

/// One escrow per order requiring held funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: EscrowId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub seller_id: UserId,
    pub total_amount: MinorUnits,
    pub seller_amount: MinorUnits,
    pub commission_amount: MinorUnits,
    pub commission_rate: CommissionRate,
    pub currency: CurrencyCode,
    pub status: EscrowStatus,
    pub dispute_reason: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by every committed mutation
    pub version: u64,
}

impl EscrowTransaction {
    /// Build a new pending escrow from a capture event and a computed split.
    pub fn open(
        event: &PaymentCaptured,
        seller_amount: MinorUnits,
        commission_amount: MinorUnits,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let tx = Self {
            id: EscrowId::new(),
            order_id: event.order_id,
            customer_id: event.customer_id,
            seller_id: event.seller_id,
            total_amount: event.total_amount,
            seller_amount,
            commission_amount,
            commission_rate: event.commission_rate,
            currency: event.currency.clone(),
            status: EscrowStatus::Pending,
            dispute_reason: None,
            resolution: None,
            created_at: now,
            delivery_confirmed_at: None,
            disputed_at: None,
            released_at: None,
            refunded_at: None,
            updated_at: now,
            version: 0,
        };
        tx.check_balanced()?;
        Ok(tx)
    }

    /// Conservation check: `seller_amount + commission_amount == total_amount`
    /// with no negative leg.
    pub fn check_balanced(&self) -> Result<(), ValidationError> {
        let unbalanced = || ValidationError::Unbalanced {
            total: self.total_amount.0,
            seller: self.seller_amount.0,
            commission: self.commission_amount.0,
        };
        if self.seller_amount.is_negative() || self.commission_amount.is_negative() {
            return Err(unbalanced());
        }
        match self.seller_amount.checked_add(self.commission_amount) {
            Some(sum) if sum == self.total_amount => Ok(()),
            _ => Err(unbalanced()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `user` is one of the two parties
    pub fn is_party(&self, user: &UserId) -> bool {
        self.customer_id == *user || self.seller_id == *user
    }

    /// Timestamp for the next lifecycle event, never earlier than any
    /// timestamp already on the record.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        [
            Some(self.created_at),
            Some(self.updated_at),
            self.delivery_confirmed_at,
            self.disputed_at,
            self.released_at,
            self.refunded_at,
        ]
        .into_iter()
        .flatten()
        .fold(now, |acc, t| acc.max(t))
    }
}

/// Read-only projection of an escrow for the UI/reporting surface.
///
/// Identical to [`EscrowTransaction`] minus the concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowView {
    pub id: EscrowId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub seller_id: UserId,
    pub total_amount: MinorUnits,
    pub seller_amount: MinorUnits,
    pub commission_amount: MinorUnits,
    pub commission_rate: CommissionRate,
    pub currency: CurrencyCode,
    pub status: EscrowStatus,
    pub dispute_reason: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<EscrowTransaction> for EscrowView {
    fn from(tx: EscrowTransaction) -> Self {
        Self {
            id: tx.id,
            order_id: tx.order_id,
            customer_id: tx.customer_id,
            seller_id: tx.seller_id,
            total_amount: tx.total_amount,
            seller_amount: tx.seller_amount,
            commission_amount: tx.commission_amount,
            commission_rate: tx.commission_rate,
            currency: tx.currency,
            status: tx.status,
            dispute_reason: tx.dispute_reason,
            resolution: tx.resolution,
            created_at: tx.created_at,
            delivery_confirmed_at: tx.delivery_confirmed_at,
            disputed_at: tx.disputed_at,
            released_at: tx.released_at,
            refunded_at: tx.refunded_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Filter for escrow listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscrowFilter {
    pub customer_id: Option<UserId>,
    pub seller_id: Option<UserId>,
    /// Empty means any status
    pub statuses: Vec<EscrowStatus>,
    pub delivered_before: Option<DateTime<Utc>>,
    pub disputed_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EscrowFilter {
    pub fn by_customer(customer_id: UserId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn by_seller(seller_id: UserId) -> Self {
        Self {
            seller_id: Some(seller_id),
            ..Default::default()
        }
    }

    pub fn by_statuses(statuses: &[EscrowStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation, used by stores without a query engine
    pub fn matches(&self, tx: &EscrowTransaction) -> bool {
        if let Some(customer) = &self.customer_id {
            if tx.customer_id != *customer {
                return false;
            }
        }
        if let Some(seller) = &self.seller_id {
            if tx.seller_id != *seller {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&tx.status) {
            return false;
        }
        if let Some(cutoff) = self.delivered_before {
            match tx.delivery_confirmed_at {
                Some(at) if at < cutoff => {}
                _ => return false,
            }
        }
        if let Some(cutoff) = self.disputed_before {
            match tx.disputed_at {
                Some(at) if at < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}
