//! Holdings fetch collaborator
//!
//! Fetches a wallet's current SPL token accounts from a DAS-capable JSON-RPC
//! endpoint (`getTokenAccounts`). A failed fetch surfaces as `FetchError` and
//! the caller skips that wallet for the round; it never reaches the
//! reconciliation path, so stored state survives outages untouched.

use super::types::Holding;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Rpc(String),
    MalformedResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "HTTP error: {}", e),
            FetchError::Rpc(msg) => write!(f, "RPC error: {}", msg),
            FetchError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Fetches the full holdings snapshot for one wallet.
///
/// The error arm carries no holdings by construction: a failure can only be
/// skipped, never reconciled or used to clear state.
#[async_trait]
pub trait HoldingsFetcher: Send + Sync {
    async fn fetch_holdings(&self, wallet: &str) -> Result<Vec<Holding>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct TokenAccountsEnvelope {
    result: Option<TokenAccountsResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct TokenAccountsResult {
    #[serde(default)]
    token_accounts: Vec<Holding>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct HealthEnvelope {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

/// JSON-RPC implementation of [`HoldingsFetcher`].
pub struct RpcHoldingsFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl RpcHoldingsFetcher {
    pub fn new(endpoint: String) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// One-shot startup probe (`getHealth`). Callers treat a failure here as
    /// fatal; the tracking loop itself never calls this.
    pub async fn check_health(&self) -> Result<(), FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getHealth",
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Rpc(format!(
                "getHealth returned status {}",
                response.status()
            )));
        }

        let envelope: HealthEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(FetchError::Rpc(format!(
                "getHealth failed ({}): {}",
                error.code, error.message
            )));
        }

        match envelope.result.as_deref() {
            Some("ok") => Ok(()),
            other => Err(FetchError::Rpc(format!(
                "node not healthy: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl HoldingsFetcher for RpcHoldingsFetcher {
    async fn fetch_holdings(&self, wallet: &str) -> Result<Vec<Holding>, FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTokenAccounts",
            "params": {
                "owner": wallet,
            },
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Rpc(format!(
                "getTokenAccounts returned status {}",
                response.status()
            )));
        }

        let envelope: TokenAccountsEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(FetchError::Rpc(format!(
                "getTokenAccounts failed ({}): {}",
                error.code, error.message
            )));
        }

        let result = envelope.result.ok_or_else(|| {
            FetchError::MalformedResponse("response carried neither result nor error".to_string())
        })?;

        // The endpoint echoes accounts for the requested owner; drop anything
        // else so a stored holding's owner always equals its wallet.
        let holdings: Vec<Holding> = result
            .token_accounts
            .into_iter()
            .filter(|h| h.owner == wallet)
            .collect();

        Ok(holdings)
    }
}
