//! Wallet Watcher Library
//!
//! Balance-watching agent for a custodial multi-chain wallet API: signed,
//! rate-limit aware requests, offline key derivation for solana/evm/tron, and
//! a poll-diff-match loop that reports which derived key controls a change.

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod provision;
pub mod store;
pub mod util;
pub mod wallet;
pub mod watch;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
