//! Core data structures shared across the tracking pipeline

use serde::{Deserialize, Serialize};

/// One SPL token-account balance observed for a tracked wallet.
///
/// `address` is the token-account address and is globally unique across all
/// wallets; it is the primary key in the holdings table. `owner` must equal
/// the wallet the holding was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub address: String,
    pub mint: String,
    pub owner: String,
    pub amount: u64,
    pub delegated_amount: u64,
    pub frozen: bool,
}

/// Result of reconciling one wallet's fresh snapshot against the store.
///
/// `added` carries full records in snapshot order; `removed` carries only the
/// token-account addresses that disappeared, in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingsDelta {
    pub added: Vec<Holding>,
    pub removed: Vec<String>,
}

impl HoldingsDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Raw (mint, owner) pair returned by the duplicate-mint store query.
#[derive(Debug, Clone, PartialEq)]
pub struct MintOwnerPair {
    pub mint: String,
    pub owner: String,
}

/// A mint held by two or more distinct tracked wallets.
///
/// `owners` is insertion-ordered (first seen in the store query) and free of
/// duplicates. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub mint: String,
    pub owners: Vec<String>,
}

/// A unit of work for the refresh queue: one wallet or a full sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshRequest {
    Wallet(String),
    All,
}
