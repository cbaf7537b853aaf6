//! Who may drive which transition

use marche_types::{Actor, EscrowOperation, EscrowStatus, EscrowTransaction, Role};

/// Whether `actor` may open an escrow
pub fn may_create(actor: &Actor) -> bool {
    matches!(actor.role, Role::System | Role::Admin)
}

/// Whether `actor` may apply `op` to `tx` in its current status.
///
/// Adjudication authority for `ResolveDispute` is checked by the dispute
/// resolver; here it only requires a staff role.
pub fn may_apply(actor: &Actor, tx: &EscrowTransaction, op: EscrowOperation) -> bool {
    let is_customer = actor.role == Role::Customer && actor.user_id == tx.customer_id;
    let is_seller = actor.role == Role::Seller && actor.user_id == tx.seller_id;

    match op {
        EscrowOperation::ConfirmDelivery => {
            is_customer || matches!(actor.role, Role::Admin | Role::System)
        }
        // A release out of a dispute is a ruling
        EscrowOperation::Release if tx.status == EscrowStatus::Disputed => {
            actor.role.can_adjudicate()
        }
        EscrowOperation::Release => is_customer || matches!(actor.role, Role::Admin | Role::System),
        EscrowOperation::OpenDispute => is_customer || is_seller,
        EscrowOperation::ResolveDispute(_) => actor.role.is_staff(),
    }
}
