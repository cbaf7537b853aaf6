//! Repository implementations

mod audit;
mod credit;
mod escrow;

pub use audit::AuditRepo;
pub use credit::CreditRepo;
pub use escrow::EscrowRepo;
