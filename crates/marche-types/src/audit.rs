//! Audit trail types
//!
//! One entry per transition attempt, applied or rejected. Entries are
//! append-only and never mutated.

use crate::{Actor, AuditEntryId, EscrowId, EscrowOperation, EscrowStatus, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Transition(EscrowOperation),
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Transition(op) => op.as_str(),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "create" {
            return Ok(Self::Create);
        }
        EscrowOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .map(Self::Transition)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "audit action",
                value: s.to_string(),
            })
    }
}

/// Result of the attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    Applied,
    Rejected { reason: String },
}

impl AuditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Immutable record of a transition attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub escrow_id: EscrowId,
    pub actor: Actor,
    pub action: AuditAction,
    /// Status observed when the attempt was evaluated
    pub from_status: Option<EscrowStatus>,
    /// Status written, for applied attempts
    pub to_status: Option<EscrowStatus>,
    pub outcome: AuditOutcome,
    /// Dispute reason or resolution note supplied with the attempt
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry for an attempt that was applied
    pub fn applied(
        escrow_id: EscrowId,
        actor: Actor,
        action: AuditAction,
        from_status: Option<EscrowStatus>,
        to_status: EscrowStatus,
        note: Option<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            escrow_id,
            actor,
            action,
            from_status,
            to_status: Some(to_status),
            outcome: AuditOutcome::Applied,
            note,
            recorded_at: Utc::now(),
        }
    }

    /// Entry for an attempt that was refused
    pub fn rejected(
        escrow_id: EscrowId,
        actor: Actor,
        action: AuditAction,
        from_status: Option<EscrowStatus>,
        reason: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            escrow_id,
            actor,
            action,
            from_status,
            to_status: None,
            outcome: AuditOutcome::Rejected {
                reason: reason.into(),
            },
            note,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DisputeAction;

    #[test]
    fn test_action_strings_round_trip() {
        let actions = [
            AuditAction::Create,
            AuditAction::Transition(EscrowOperation::ConfirmDelivery),
            AuditAction::Transition(EscrowOperation::ResolveDispute(DisputeAction::Refund)),
        ];
        for action in actions {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_rejected_entry_has_no_target() {
        let entry = AuditEntry::rejected(
            EscrowId::new(),
            Actor::system(),
            AuditAction::Transition(EscrowOperation::Release),
            Some(EscrowStatus::Pending),
            "illegal transition",
            None,
        );
        assert!(entry.to_status.is_none());
        assert!(!entry.outcome.is_applied());
    }
}
