//! Dispute resolver
//!
//! Policy layer over the disputed branch of the state machine. It adds one
//! rule: only actors with adjudication authority may rule. That a dispute
//! is ruled on at most once follows from the terminal states.

use marche_types::{Actor, DisputeAction, EscrowId, EscrowOperation, EscrowTransaction};
use tracing::info;

use crate::{EscrowError, EscrowStateMachine, Result};

#[derive(Clone)]
pub struct DisputeResolver {
    machine: EscrowStateMachine,
}

impl DisputeResolver {
    pub fn new(machine: EscrowStateMachine) -> Self {
        Self { machine }
    }

    /// Raise a dispute on behalf of the customer or the seller
    pub async fn open(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
        reason: &str,
    ) -> Result<EscrowTransaction> {
        self.machine
            .open_dispute(id, actor, expected_version, reason)
            .await
    }

    /// Rule on a dispute: refund the customer or release to the seller
    pub async fn resolve(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
        action: DisputeAction,
        resolution_note: &str,
    ) -> Result<EscrowTransaction> {
        if !actor.role.can_adjudicate() {
            let current = self.machine.store().get(id).await?;
            let err = EscrowError::Unauthorized {
                actor: actor.to_string(),
                operation: EscrowOperation::ResolveDispute(action).to_string(),
            };
            let note = Some(resolution_note.trim().to_string()).filter(|n| !n.is_empty());
            return Err(self
                .machine
                .reject(&current, actor, EscrowOperation::ResolveDispute(action), note, err)
                .await);
        }

        let resolved = self
            .machine
            .resolve_dispute(id, actor, expected_version, action, resolution_note)
            .await?;
        info!(escrow_id = %id, action = action.as_str(), %actor, "Dispute resolved");
        Ok(resolved)
    }
}
