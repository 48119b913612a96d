//! Runtime configuration from environment variables and the wallets file

use serde::Deserialize;
use std::env;
use std::path::Path;

/// One tracked wallet. Only `address` feeds the core logic; name, emoji and
/// tags exist for presentation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WalletEntry {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub rpc_https_url: String,
    pub rpc_wss_url: String,
    pub db_path: String,
    pub wallets_path: String,
    /// Periodic full-sweep interval in milliseconds.
    pub tracker_interval_ms: u64,
    /// Display cap for duplicate groups.
    pub show_max_duplicates: usize,
    /// Minimum wallets that must hold a mint before it is shown as duplicate.
    pub duplicate_min_holders: usize,
    pub inspect_url: String,
    pub inspect_name: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
    WalletFile(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigError::WalletFile(msg) => write!(f, "Wallet file error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// - `RPC_HTTPS_URL` (required) - DAS-capable JSON-RPC endpoint
    /// - `RPC_WSS_URL` (required) - account-subscribe WebSocket endpoint
    /// - `WALLETFLOW_DB_PATH` (default: walletflow.db)
    /// - `WALLETS_PATH` (default: wallets.json)
    /// - `TRACKER_INTERVAL_MS` (default: 15000)
    /// - `SHOW_MAX_DUPLICATES` (default: 5)
    /// - `DUPLICATE_MIN_HOLDERS` (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_https_url = env::var("RPC_HTTPS_URL")
            .map_err(|_| ConfigError::MissingVariable("RPC_HTTPS_URL".to_string()))?;

        if !rpc_https_url.starts_with("http://") && !rpc_https_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_HTTPS_URL must start with http:// or https://".to_string(),
            ));
        }

        let rpc_wss_url = env::var("RPC_WSS_URL")
            .map_err(|_| ConfigError::MissingVariable("RPC_WSS_URL".to_string()))?;

        if !rpc_wss_url.starts_with("ws://") && !rpc_wss_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "RPC_WSS_URL must start with ws:// or wss://".to_string(),
            ));
        }

        Ok(Self {
            rpc_https_url,
            rpc_wss_url,

            db_path: env::var("WALLETFLOW_DB_PATH")
                .unwrap_or_else(|_| "walletflow.db".to_string()),

            wallets_path: env::var("WALLETS_PATH").unwrap_or_else(|_| "wallets.json".to_string()),

            tracker_interval_ms: env::var("TRACKER_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15_000),

            show_max_duplicates: env::var("SHOW_MAX_DUPLICATES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            duplicate_min_holders: env::var("DUPLICATE_MIN_HOLDERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),

            inspect_url: env::var("INSPECT_URL")
                .unwrap_or_else(|_| "https://gmgn.ai/sol/token/".to_string()),

            inspect_name: env::var("INSPECT_NAME").unwrap_or_else(|_| "Open GMGN".to_string()),
        })
    }
}

/// Base58-length sanity check for a wallet address (32-44 chars, base58
/// alphabet). Anything failing this is skipped, never fatal.
pub fn is_plausible_address(address: &str) -> bool {
    if address.len() < 32 || address.len() > 44 {
        return false;
    }
    address
        .chars()
        .all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
}

/// Load the tracked wallet list from a JSON file.
///
/// Entries with an implausible address are dropped with a warning; an empty
/// surviving list is an error (nothing to track).
pub fn load_wallets(path: impl AsRef<Path>) -> Result<Vec<WalletEntry>, ConfigError> {
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::WalletFile(format!(
            "could not read {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let entries: Vec<WalletEntry> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::WalletFile(format!("could not parse wallet list: {}", e)))?;

    let mut wallets = Vec::with_capacity(entries.len());
    for entry in entries {
        if is_plausible_address(&entry.address) {
            wallets.push(entry);
        } else {
            log::warn!(
                "⚠️  Skipping wallet '{}': address '{}' is not a plausible base58 pubkey",
                entry.name,
                entry.address
            );
        }
    }

    if wallets.is_empty() {
        return Err(ConfigError::WalletFile(
            "no valid wallet entries to track".to_string(),
        ));
    }

    Ok(wallets)
}
