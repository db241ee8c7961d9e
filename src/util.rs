//! Small async helpers: randomized pacing and bounded concurrency

use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Shuffle in place (Fisher-Yates via `rand`)
pub fn shuffle<T>(items: &mut [T]) {
    items.shuffle(&mut rand::thread_rng());
}

/// Uniformly random delay in `[min_ms, max_ms]`
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    if min_ms >= max_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Results come back in input order. Callers that write to a store from `f`
/// must serialize those writes themselves.
pub async fn run_bounded<T, R, F, Fut>(limit: usize, items: Vec<T>, f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}
