//! Presentation collaborator seam
//!
//! The refresh worker hands per-wallet deltas and the global duplicates
//! overview to an [`UpdateSink`]; sinks only consume, they never touch the
//! store. The default sink renders log lines.

use super::detector::DisplaySelection;
use super::types::HoldingsDelta;
use crate::config::WalletEntry;
use async_trait::async_trait;

#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// One wallet finished reconciling with a non-empty delta.
    async fn wallet_refreshed(&self, wallet: &WalletEntry, delta: &HoldingsDelta);

    /// The duplicates overview was recomputed after a processed queue entry.
    async fn duplicates_changed(&self, selection: &DisplaySelection);
}

/// Shorten a base58 address for log output: `GchN...MK4s`.
pub fn shorten_address(address: &str) -> String {
    if address.len() <= 8 {
        return address.to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}

/// Log-line renderer for refresh and duplicate events.
pub struct LogSink {
    inspect_url: String,
    inspect_name: String,
}

impl LogSink {
    pub fn new(inspect_url: String, inspect_name: String) -> Self {
        Self {
            inspect_url,
            inspect_name,
        }
    }

    /// OSC 8 terminal hyperlink to the token inspector.
    fn inspect_link(&self, mint: &str) -> String {
        format!(
            "\x1b]8;;{}{}\x1b\\{}\x1b]8;;\x1b\\",
            self.inspect_url, mint, self.inspect_name
        )
    }
}

#[async_trait]
impl UpdateSink for LogSink {
    async fn wallet_refreshed(&self, wallet: &WalletEntry, delta: &HoldingsDelta) {
        for holding in &delta.added {
            log::info!(
                "🟢 {} {} | +{} of mint {} ({})",
                wallet.emoji,
                wallet.name,
                holding.amount,
                shorten_address(&holding.mint),
                shorten_address(&holding.address),
            );
        }
        for address in &delta.removed {
            log::info!(
                "🔴 {} {} | token account {} closed",
                wallet.emoji,
                wallet.name,
                shorten_address(address),
            );
        }
    }

    async fn duplicates_changed(&self, selection: &DisplaySelection) {
        if selection.groups.is_empty() {
            log::debug!("No duplicate holdings across tracked wallets");
        } else {
            let now = chrono::Utc::now().format("%H:%M:%S");
            log::info!("⚠️  Duplicate holdings across tracked wallets ({} UTC):", now);
            for group in &selection.groups {
                let owners: Vec<String> =
                    group.owners.iter().map(|o| shorten_address(o)).collect();
                log::info!(
                    "   {} held by {} wallets [{}] | {}",
                    shorten_address(&group.mint),
                    group.owners.len(),
                    owners.join(", "),
                    self.inspect_link(&group.mint),
                );
            }
        }

        if selection.suppressed_below_min > 0 {
            log::debug!(
                "{} duplicate group(s) below the holder minimum",
                selection.suppressed_below_min
            );
        }
        if selection.truncated > 0 {
            log::debug!(
                "{} duplicate group(s) beyond the display cap",
                selection.truncated
            );
        }
    }
}
