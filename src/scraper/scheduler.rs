use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::pool::scrape_batch;
use super::{CycleReport, ScraperSettings};
use crate::feed::{FeedFetcher, FetchError};
use crate::storage::{Database, DatabaseError};

/// Pause between back-to-back cycles once a cycle selected nothing.
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// The periodic driver of the scraping engine.
///
/// Owns its settings, database handle and HTTP client. Construct one at
/// startup and either [`spawn`](Scraper::spawn) it or call
/// [`run_cycle`](Scraper::run_cycle) directly.
pub struct Scraper {
    db: Database,
    fetcher: FeedFetcher,
    settings: ScraperSettings,
    /// Last cycle stamp handed out, in Unix milliseconds
    last_stamp: AtomicI64,
}

/// Handle to a spawned [`Scraper`].
///
/// Dropping the handle also stops the scraper, after any in-flight cycle.
pub struct ScraperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scraper {
    /// Create a scraper with an HTTP client built from `settings`.
    pub fn new(db: Database, settings: ScraperSettings) -> Result<Self, FetchError> {
        let fetcher = FeedFetcher::new(settings.request_timeout, settings.max_feed_size)?;
        Ok(Self::with_fetcher(db, fetcher, settings))
    }

    pub fn with_fetcher(db: Database, fetcher: FeedFetcher, settings: ScraperSettings) -> Self {
        Self {
            db,
            fetcher,
            settings,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Cycle stamps strictly increase even when the clock has not moved or
    /// has stepped back, so every cycle advances the watermarks it writes.
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(prev.saturating_add(1))
    }

    /// Run exactly one cycle: select the most overdue feeds, scrape them
    /// concurrently and wait for all of them.
    ///
    /// # Errors
    ///
    /// Only a failure to select the batch is returned. Per-feed failures are
    /// recorded in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, DatabaseError> {
        let fetched_at = self.next_stamp();
        let limit = i64::try_from(self.settings.concurrency.get()).unwrap_or(i64::MAX);

        let feeds = self.db.select_feeds_to_fetch(limit).await?;
        if feeds.is_empty() {
            tracing::debug!("No feeds to fetch");
            return Ok(CycleReport {
                fetched_at,
                outcomes: Vec::new(),
            });
        }

        tracing::info!(count = feeds.len(), "Fetching feeds");

        let outcomes = scrape_batch(
            &self.db,
            &self.fetcher,
            feeds,
            self.settings.concurrency,
            fetched_at,
            self.settings.max_items_per_feed,
        )
        .await;

        let report = CycleReport {
            fetched_at,
            outcomes,
        };
        tracing::info!(
            selected = report.selected(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            new_posts = report.new_posts(),
            "Scrape cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// pushes the next one back rather than triggering a burst. The stop
    /// signal is only observed between cycles, so an in-flight cycle always
    /// finishes. With a zero interval, a cycle that found nothing to fetch is
    /// followed by a short pause instead of an immediate retry.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            concurrency = self.settings.concurrency.get(),
            interval_secs = self.settings.interval.as_secs_f64(),
            "Scraper started"
        );

        let mut timer = self.timer();
        let mut idle = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let stop = match timer.as_mut() {
                Some(timer) => tokio::select! {
                    biased;
                    _ = shutdown.changed() => true,
                    _ = timer.tick() => false,
                },
                None if idle => tokio::select! {
                    biased;
                    _ = shutdown.changed() => true,
                    _ = tokio::time::sleep(IDLE_BACKOFF) => false,
                },
                None => tokio::select! {
                    biased;
                    _ = shutdown.changed() => true,
                    _ = tokio::task::yield_now() => false,
                },
            };
            if stop {
                break;
            }

            idle = match self.run_cycle().await {
                Ok(report) => report.selected() == 0,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to select feeds, skipping cycle");
                    true
                }
            };
        }

        tracing::info!("Scraper stopped");
    }

    /// Start the scraper as a background task on the current runtime.
    pub fn spawn(self) -> ScraperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ScraperHandle { shutdown_tx, task }
    }

    /// `None` for a zero interval: cycles then run back to back.
    fn timer(&self) -> Option<Interval> {
        if self.settings.interval.is_zero() {
            return None;
        }
        let mut timer = interval(self.settings.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }
}

impl ScraperHandle {
    /// Signal the scraper to stop and wait for it. An in-flight cycle drains
    /// first.
    pub async fn shutdown(self) {
        // Err only means the task already exited
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Scraper task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
