//! Poll scheduler driving the read cache
//!
//! One timer per poll class, plus the cache's mount and refresh signals.
//! A newly registered key is read once on mount; after that it is only read
//! on its class's tick or on invalidation, so a failed read is never retried
//! faster than its poll interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::chain::ChainClient;
use crate::queries::{PollClass, QueryKey};
use crate::read_cache::ReadCache;

pub struct Scheduler<C: ChainClient> {
    chain: Arc<C>,
    cache: Arc<ReadCache>,
    poll_interval: Duration,
    ticker_interval: Duration,
}

impl<C: ChainClient> Scheduler<C> {
    pub fn new(
        chain: Arc<C>,
        cache: Arc<ReadCache>,
        poll_interval: Duration,
        ticker_interval: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            poll_interval,
            ticker_interval,
        }
    }

    /// Fetch every due key of `class` concurrently and store the outcomes.
    /// Returns the number of reads issued.
    pub async fn poll(&self, class: PollClass) -> usize {
        let due = self.cache.due(class);
        let issued = self.fetch(&due).await;
        if issued > 0 {
            log::debug!("Polled {} {:?} queries", issued, class);
        }
        issued
    }

    /// Read keys registered since the last pass, once each
    pub async fn poll_mounted(&self) -> usize {
        let due = self.cache.awaiting_first();
        self.fetch(&due).await
    }

    async fn fetch(&self, due: &[QueryKey]) -> usize {
        if due.is_empty() {
            return 0;
        }

        let chain = self.chain.as_ref();
        let outcomes = join_all(due.iter().map(|key| key.fetch(chain))).await;
        let now = Instant::now();

        for (key, outcome) in due.iter().zip(outcomes) {
            if let Err(e) = &outcome {
                log::warn!("Read {:?} failed: {}", key, e);
            }
            self.cache.store(key, outcome, now);
        }
        due.len()
    }

    /// Re-read everything that is enabled, regardless of class
    pub async fn refresh_all(&self) -> usize {
        let mut issued = 0;
        for class in [PollClass::Standard, PollClass::Ticker, PollClass::Once] {
            issued += self.poll(class).await;
        }
        issued
    }

    /// Run until the task is dropped
    pub async fn run(self) {
        let mut standard = periodic(self.poll_interval);
        let mut ticker = periodic(self.ticker_interval);

        log::info!(
            "Read scheduler started (poll {:?}, ticker {:?})",
            self.poll_interval,
            self.ticker_interval
        );

        loop {
            tokio::select! {
                _ = standard.tick() => {
                    self.poll(PollClass::Standard).await;
                    self.poll(PollClass::Once).await;
                }
                _ = ticker.tick() => {
                    self.poll(PollClass::Ticker).await;
                }
                _ = self.cache.mount_requested() => {
                    self.poll_mounted().await;
                }
                _ = self.cache.refresh_requested() => {
                    log::debug!("Refresh requested");
                    self.refresh_all().await;
                }
            }
        }
    }
}

/// Ticks every `period`, the first one a full period from now; mounted
/// keys are read by `poll_mounted` instead of an immediate tick.
fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
