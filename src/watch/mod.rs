//! Balance watching
//!
//! ```text
//! Idle → Fetching → Diffing → (NoChange | Notifying) → Idle
//! ```

pub mod diff;
pub mod watcher;

pub use diff::{compare_balances, BalanceChange};
pub use watcher::{BalanceWatcher, CycleReport, WatchSettings};
