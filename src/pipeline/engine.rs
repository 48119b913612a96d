//! Holdings reconciliation
//!
//! Diffs one wallet's freshly fetched snapshot against what the store has on
//! file and commits the new state with full-replace semantics: the snapshot
//! entirely supersedes the previous one for that wallet.
//!
//! ```text
//! Vec<Holding> (fresh snapshot)
//!     ↓
//! ReconciliationEngine::reconcile()
//!     ↓ list_addresses (before) / dedupe / set diff
//! commit_snapshot (delete removed + upsert fresh, one transaction)
//!     ↓
//! HoldingsDelta { added, removed }
//! ```

use super::db::{HoldingsStore, StoreError};
use super::types::{Holding, HoldingsDelta};
use std::collections::HashSet;
use std::sync::Arc;

/// Stateless reconciliation over a shared holdings store.
pub struct ReconciliationEngine {
    store: Arc<dyn HoldingsStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn HoldingsStore>) -> Self {
        Self { store }
    }

    /// Reconcile one wallet's fresh snapshot against the stored state.
    ///
    /// Rows present in both sides are refreshed (amount, delegated amount,
    /// frozen) but not reported as added. An empty snapshot empties the
    /// wallet: every previously stored address is reported removed. Callers
    /// must only invoke this after a successful fetch so that a liquidated
    /// wallet is distinguishable from a failed one.
    ///
    /// Any store failure aborts the whole reconciliation; the delete and
    /// upsert run inside a single transaction, so the store keeps its prior
    /// state on error.
    pub async fn reconcile(
        &self,
        owner: &str,
        fresh: Vec<Holding>,
    ) -> Result<HoldingsDelta, StoreError> {
        let fresh = dedupe_by_address(fresh);

        let before = self.store.list_addresses(owner).await?;
        let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
        let incoming: HashSet<&str> = fresh.iter().map(|h| h.address.as_str()).collect();

        let added: Vec<Holding> = fresh
            .iter()
            .filter(|h| !before_set.contains(h.address.as_str()))
            .cloned()
            .collect();

        let removed: Vec<String> = before
            .iter()
            .filter(|address| !incoming.contains(address.as_str()))
            .cloned()
            .collect();

        self.store.commit_snapshot(owner, &removed, &fresh).await?;

        Ok(HoldingsDelta { added, removed })
    }
}

/// Collapse duplicate token-account addresses in a snapshot, last write wins.
///
/// `address` is the uniqueness key; a duplicated row keeps its first position
/// in the snapshot but carries the fields of its last occurrence.
fn dedupe_by_address(fresh: Vec<Holding>) -> Vec<Holding> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut deduped: Vec<Holding> = Vec::with_capacity(fresh.len());

    for holding in fresh {
        match seen.get(&holding.address) {
            Some(&index) => deduped[index] = holding,
            None => {
                seen.insert(holding.address.clone(), deduped.len());
                deduped.push(holding);
            }
        }
    }

    deduped
}
