//! Refresh coordination - serialized queue processing for wallet refreshes
//!
//! Producers (the periodic sweep timer and the live account stream) only
//! enqueue; a single worker drains the queue one entry at a time to
//! completion. That bounds reconciliation concurrency to one system-wide and
//! makes the store race-free by construction.
//!
//! Main loop per queue entry:
//! 1. Resolve the implicated wallets (one, or the whole tracked list)
//! 2. Fetch each wallet's snapshot; a failed fetch skips that wallet for the
//!    round and never touches stored state
//! 3. Reconcile and (outside the first sweep) emit the per-wallet delta
//! 4. Recompute duplicates once for the entry and emit the overview

use super::db::HoldingsStore;
use super::detector::{select_for_display, DuplicateDetector};
use super::engine::ReconciliationEngine;
use super::events::{shorten_address, UpdateSink};
use super::fetcher::HoldingsFetcher;
use super::types::RefreshRequest;
use crate::config::WalletEntry;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cloneable producer handle onto the refresh queue.
///
/// One coordinator is constructed per process lifetime and its handle is
/// passed to the timer and the live-update listener at wiring time.
#[derive(Clone)]
pub struct RefreshCoordinator {
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl RefreshCoordinator {
    /// Create the queue, returning the producer handle and the receiver the
    /// worker drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RefreshRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire-and-forget enqueue; never blocks the producer.
    pub fn request_refresh(&self, request: RefreshRequest) {
        if self.tx.send(request).is_err() {
            log::warn!("⚠️  Refresh queue closed, dropping request");
        }
    }
}

/// Display policy knobs handed to the worker at construction.
#[derive(Debug, Clone, Copy)]
pub struct DisplayPolicy {
    pub max_shown: usize,
    pub min_holders: usize,
}

/// The single consumer of the refresh queue.
pub struct RefreshWorker {
    rx: mpsc::UnboundedReceiver<RefreshRequest>,
    wallets: Vec<WalletEntry>,
    fetcher: Arc<dyn HoldingsFetcher>,
    store: Arc<dyn HoldingsStore>,
    engine: ReconciliationEngine,
    detector: DuplicateDetector,
    sink: Arc<dyn UpdateSink>,
    display: DisplayPolicy,
    first_sweep: bool,
}

impl RefreshWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<RefreshRequest>,
        wallets: Vec<WalletEntry>,
        fetcher: Arc<dyn HoldingsFetcher>,
        store: Arc<dyn HoldingsStore>,
        sink: Arc<dyn UpdateSink>,
        display: DisplayPolicy,
    ) -> Self {
        let engine = ReconciliationEngine::new(store.clone());
        let detector = DuplicateDetector::new(store.clone());

        Self {
            rx,
            wallets,
            fetcher,
            store,
            engine,
            detector,
            sink,
            display,
            first_sweep: true,
        }
    }

    /// Drain the queue until every producer handle is dropped.
    pub async fn run(mut self) {
        log::info!(
            "🚀 Refresh worker started ({} wallets tracked)",
            self.wallets.len()
        );

        while let Some(request) = self.rx.recv().await {
            self.process(request).await;
        }

        log::info!("✅ Refresh queue closed, worker stopped");
    }

    async fn process(&mut self, request: RefreshRequest) {
        let targets: Vec<WalletEntry> = match &request {
            RefreshRequest::All => self.wallets.clone(),
            RefreshRequest::Wallet(address) => {
                match self.wallets.iter().find(|w| w.address == *address) {
                    Some(wallet) => vec![wallet.clone()],
                    None => {
                        log::warn!(
                            "⚠️  Refresh requested for untracked wallet {}",
                            shorten_address(address)
                        );
                        return;
                    }
                }
            }
        };

        let cold_start = self.first_sweep && request == RefreshRequest::All;
        if cold_start {
            // On-disk rows may be stale from a previous process lifetime.
            // Incremental triggers must never reach this branch.
            if let Err(e) = self.store.clear_all().await {
                log::error!("❌ Could not clear holdings before initial sweep: {}", e);
                return;
            }
            log::info!("🔄 Initial sweep: holdings cleared, refetching all wallets");
        }

        for wallet in &targets {
            let holdings = match self.fetcher.fetch_holdings(&wallet.address).await {
                Ok(holdings) => holdings,
                Err(e) => {
                    log::warn!(
                        "🚫 Fetch failed for {} ({}), skipping this round: {}",
                        wallet.name,
                        shorten_address(&wallet.address),
                        e
                    );
                    continue;
                }
            };

            match self.engine.reconcile(&wallet.address, holdings).await {
                Ok(delta) => {
                    if self.first_sweep {
                        log::info!(
                            "✅ {} holding(s) on file for {}",
                            delta.added.len(),
                            wallet.name
                        );
                    } else if !delta.is_empty() {
                        self.sink.wallet_refreshed(wallet, &delta).await;
                    }
                }
                Err(e) => {
                    log::error!("❌ Reconciliation failed for {}: {}", wallet.name, e);
                    continue;
                }
            }
        }

        // One duplicate scan per processed entry, after all implicated
        // wallets have committed.
        match self.detector.find_duplicates().await {
            Ok(groups) => {
                let selection =
                    select_for_display(&groups, self.display.max_shown, self.display.min_holders);
                self.sink.duplicates_changed(&selection).await;
            }
            Err(e) => {
                log::error!("❌ Duplicate scan failed: {}", e);
            }
        }

        if cold_start {
            self.first_sweep = false;
            log::info!("✅ Initial sweep complete");
        }
    }
}
