//! Time source used for request timestamps and loop pacing
//!
//! The watch loop and the API client never call the system clock directly so
//! tests can run cycles without real wall-clock waits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `chrono` and `tokio::time`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
