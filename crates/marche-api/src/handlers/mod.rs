//! Request handlers

pub mod escrow;
pub mod health;
