//! Cross-wallet duplicate detection
//!
//! Scans the full store for mints held by two or more distinct tracked
//! wallets. Detection returns the complete, unfiltered group set; the display
//! policy (sort, minimum-holder filter, cap) is a pure function over that
//! output so presentation can be tested without re-querying the store.

use super::db::{HoldingsStore, StoreError};
use super::types::DuplicateGroup;
use std::sync::Arc;

/// Stateless duplicate scan over a shared holdings store.
pub struct DuplicateDetector {
    store: Arc<dyn HoldingsStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn HoldingsStore>) -> Self {
        Self { store }
    }

    /// All mints currently held by at least two distinct wallets.
    ///
    /// Groups are ordered by first appearance in the store query; owners
    /// within a group are ordered first-seen and deduped again here even
    /// though the query already groups by distinct owner.
    pub async fn find_duplicates(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        let pairs = self.store.find_duplicate_mint_owner_pairs().await?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for pair in pairs {
            match groups.iter_mut().find(|g| g.mint == pair.mint) {
                Some(group) => {
                    if !group.owners.contains(&pair.owner) {
                        group.owners.push(pair.owner);
                    }
                }
                None => groups.push(DuplicateGroup {
                    mint: pair.mint,
                    owners: vec![pair.owner],
                }),
            }
        }

        Ok(groups)
    }
}

/// Duplicate groups chosen for display, plus counts of what the policy hid.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySelection {
    pub groups: Vec<DuplicateGroup>,
    /// Groups dropped for having fewer holders than the configured minimum.
    pub suppressed_below_min: usize,
    /// Groups dropped by the display cap after filtering.
    pub truncated: usize,
}

/// Apply the display policy to a detector result.
///
/// Sort by descending holder count (stable, so first-seen order breaks ties),
/// drop groups below `min_holders`, cap the remainder at `max_shown`.
pub fn select_for_display(
    groups: &[DuplicateGroup],
    max_shown: usize,
    min_holders: usize,
) -> DisplaySelection {
    let mut sorted: Vec<DuplicateGroup> = groups.to_vec();
    sorted.sort_by(|a, b| b.owners.len().cmp(&a.owners.len()));

    let eligible: Vec<DuplicateGroup> = sorted
        .into_iter()
        .filter(|g| g.owners.len() >= min_holders)
        .collect();
    let suppressed_below_min = groups.len() - eligible.len();

    let truncated = eligible.len().saturating_sub(max_shown);
    let mut shown = eligible;
    shown.truncate(max_shown);

    DisplaySelection {
        groups: shown,
        suppressed_below_min,
        truncated,
    }
}
