//! Escrow engine settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Upper bound on every ledger store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Wallet account that receives commission
    #[serde(default = "default_platform_account")]
    pub platform_account: String,

    /// Days a delivered escrow waits before the sweep releases it
    #[serde(default = "default_auto_release_grace_days")]
    pub auto_release_grace_days: i64,

    /// Days a dispute may stay open before it is escalated
    #[serde(default = "default_dispute_escalation_days")]
    pub dispute_escalation_days: i64,

    /// Escrows or credits handled per sweep
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_platform_account() -> String {
    marche_types::AccountId::DEFAULT_PLATFORM.to_string()
}

fn default_auto_release_grace_days() -> i64 {
    3
}

fn default_dispute_escalation_days() -> i64 {
    7
}

fn default_sweep_batch_size() -> usize {
    100
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            platform_account: default_platform_account(),
            auto_release_grace_days: default_auto_release_grace_days(),
            dispute_escalation_days: default_dispute_escalation_days(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

impl EscrowConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn auto_release_grace(&self) -> chrono::Duration {
        chrono::Duration::days(self.auto_release_grace_days)
    }

    pub fn dispute_escalation(&self) -> chrono::Duration {
        chrono::Duration::days(self.dispute_escalation_days)
    }
}
