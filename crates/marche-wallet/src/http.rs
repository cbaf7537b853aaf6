//! HTTP wallet client
//!
//! `POST {base_url}/v1/credits` with the idempotency key both in the body
//! and in the `Idempotency-Key` header.
//!
//! | Response              | Outcome                    |
//! |-----------------------|----------------------------|
//! | 201 Created           | `Applied`                  |
//! | 200 OK                | `AlreadyApplied`           |
//! | 408, 429, 5xx, network| `Unavailable` (retryable)  |
//! | other 4xx             | `Rejected`                 |

use std::time::Duration;

use async_trait::async_trait;
use marche_types::{AccountId, CurrencyCode, IdempotencyKey, MinorUnits};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CreditOutcome, Result, WalletError, WalletService};

/// HTTP wallet client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpWalletConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_timeout_ms() -> u64 {
    3_000
}

impl HttpWalletConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreditRequest<'a> {
    account: &'a str,
    amount: i64,
    currency: &'a str,
    idempotency_key: &'a str,
}

pub struct HttpWalletService {
    client: Client,
    config: HttpWalletConfig,
}

impl HttpWalletService {
    pub fn new(config: HttpWalletConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WalletError::Unavailable {
                message: format!("HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn credits_url(&self) -> String {
        format!("{}/v1/credits", self.config.base_url.trim_end_matches('/'))
    }
}

fn classify(status: StatusCode, body: String) -> Result<CreditOutcome> {
    match status {
        StatusCode::CREATED => Ok(CreditOutcome::Applied),
        StatusCode::OK => Ok(CreditOutcome::AlreadyApplied),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(WalletError::Unavailable {
                message: format!("HTTP {}: {}", status, body),
            })
        }
        s if s.is_server_error() => Err(WalletError::Unavailable {
            message: format!("HTTP {}: {}", status, body),
        }),
        _ => Err(WalletError::Rejected {
            message: format!("HTTP {}: {}", status, body),
        }),
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn credit(
        &self,
        account: &AccountId,
        amount: MinorUnits,
        currency: &CurrencyCode,
        key: &IdempotencyKey,
    ) -> Result<CreditOutcome> {
        let request = CreditRequest {
            account: account.as_str(),
            amount: amount.0,
            currency: currency.as_str(),
            idempotency_key: key.as_str(),
        };

        let mut builder = self
            .client
            .post(self.credits_url())
            .header("Idempotency-Key", key.as_str())
            .json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(%key, error = %e, "Wallet request failed");
            WalletError::Unavailable {
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        debug!(%key, %status, "Wallet responded");
        classify(status, body)
    }
}
