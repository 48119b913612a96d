use std::sync::Arc;

use walletflow::config::{load_wallets, RuntimeConfig};
use walletflow::pipeline::scheduler;
use walletflow::pipeline::{
    DisplayPolicy, LogSink, RefreshCoordinator, RefreshRequest, RefreshWorker, RpcHoldingsFetcher,
    SqliteHoldingsStore,
};
use walletflow::streamer_core::AccountStreamer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // NOTE: Workaround for rustls issue
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Can't set crypto provider to aws_lc_rs");

    let config = RuntimeConfig::from_env()?;
    let wallets = load_wallets(&config.wallets_path)?;

    log::info!("🚀 Starting Walletflow...");
    log::info!("📊 Configuration:");
    log::info!("   RPC endpoint: {}", config.rpc_https_url);
    log::info!("   Database: {}", config.db_path);
    log::info!("   Wallets: {}", wallets.len());
    log::info!("   Sweep interval: {}ms", config.tracker_interval_ms);

    let fetcher = Arc::new(RpcHoldingsFetcher::new(config.rpc_https_url.clone())?);

    // Unreachable data source at startup is the one fatal condition.
    if let Err(e) = fetcher.check_health().await {
        log::error!("❌ Data source unreachable: {}", e);
        std::process::exit(1);
    }
    log::info!("✅ Connected to RPC endpoint");

    let store = Arc::new(SqliteHoldingsStore::open(&config.db_path)?);
    let sink = Arc::new(LogSink::new(
        config.inspect_url.clone(),
        config.inspect_name.clone(),
    ));

    let (coordinator, rx) = RefreshCoordinator::new();
    let worker = RefreshWorker::new(
        rx,
        wallets.clone(),
        fetcher,
        store,
        sink,
        DisplayPolicy {
            max_shown: config.show_max_duplicates,
            min_holders: config.duplicate_min_holders,
        },
    );

    // Cold-start sweep goes in first so it is the first entry the worker sees.
    coordinator.request_refresh(RefreshRequest::All);

    let timer_coordinator = coordinator.clone();
    let interval_ms = config.tracker_interval_ms;
    tokio::spawn(async move {
        scheduler::interval_sweep_task(timer_coordinator, interval_ms).await;
    });

    let wallet_addresses: Vec<String> = wallets.iter().map(|w| w.address.clone()).collect();
    let streamer = AccountStreamer::new(config.rpc_wss_url.clone(), wallet_addresses, coordinator);
    tokio::spawn(async move {
        if let Err(e) = streamer.run().await {
            log::warn!(
                "🚫 Live account stream stopped ({}); periodic sweeps continue",
                e
            );
        }
    });

    let worker_handle = tokio::spawn(worker.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("🔄 Shutdown requested, stopping...");
        }
        result = worker_handle => {
            if let Err(e) = result {
                log::error!("❌ Refresh worker terminated unexpectedly: {}", e);
            }
        }
    }

    log::info!("✅ Walletflow stopped");
    Ok(())
}
