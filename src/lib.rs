//! Walletflow - wallet holdings tracker with duplicate detection
//!
//! Tracks a configured set of Solana wallets, reconciles their SPL token
//! holdings into a local SQLite store, and reports mints held by more than
//! one tracked wallet. Refreshes are driven by a periodic sweep timer and a
//! live account-subscribe stream, serialized through a single worker queue.

pub mod config;
pub mod pipeline;
pub mod streamer_core;

pub use config::{RuntimeConfig, WalletEntry};
