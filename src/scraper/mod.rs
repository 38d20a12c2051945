//! The feed-scraping engine.
//!
//! A [`Scraper`] wakes on a fixed interval, asks the store for the feeds with
//! the oldest watermark, fetches them concurrently through the worker pool in
//! [`pool`], persists new posts and advances each feed's watermark. A failure
//! in one feed never affects its siblings, and nothing here is fatal to the
//! host process.
//!
//! # Example
//!
//! ```ignore
//! use rssagg::scraper::{Scraper, ScraperSettings};
//!
//! let scraper = Scraper::new(db, ScraperSettings::default())?;
//! let handle = scraper.spawn();
//! // ... on shutdown:
//! handle.shutdown().await;
//! ```

mod pool;
mod scheduler;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchError, DEFAULT_MAX_FEED_SIZE, DEFAULT_REQUEST_TIMEOUT};
use crate::storage::DatabaseError;

pub use pool::scrape_batch;
pub use scheduler::{Scraper, ScraperHandle};

/// Coarse failure categories, stable enough for callers and tests to assert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, timeout, HTTP status or body transfer problems
    Network,
    /// The document is not RSS/Atom
    Parse,
    /// A single item was unusable and dropped
    ItemValidation,
    /// The database rejected a read or write
    Store,
}

/// Why a single feed's task failed.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

impl ScrapeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::Fetch(e) => e.kind(),
            ScrapeError::Store(_) => FailureKind::Store,
        }
    }
}

/// Engine tuning. Built from [`Config`](crate::config::Config) by the CLI.
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    /// Feeds selected, and fetched in parallel, per cycle
    pub concurrency: NonZeroUsize,
    /// Time between cycle starts. Zero runs cycles back to back.
    pub interval: Duration,
    pub request_timeout: Duration,
    pub max_feed_size: usize,
    /// Items persisted from one document; the rest are ignored
    pub max_items_per_feed: usize,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            interval: Duration::from_secs(60),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            max_items_per_feed: 100,
        }
    }
}

/// Counts for one successfully fetched feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Items in the document that passed validation
    pub found: usize,
    pub inserted: usize,
    pub already_present: usize,
    /// Items dropped by validation
    pub skipped: usize,
}

/// Result of one worker task
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub feed_name: Arc<str>,
    pub result: Result<FeedSummary, ScrapeError>,
}

/// Everything one cycle did, in task completion order.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Watermark written to every feed in the batch (Unix milliseconds)
    pub fetched_at: i64,
    pub outcomes: Vec<FeedOutcome>,
}

impl CycleReport {
    pub fn selected(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.selected() - self.succeeded()
    }

    pub fn new_posts(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.inserted)
            .sum()
    }

    pub fn outcome(&self, feed_id: i64) -> Option<&FeedOutcome> {
        self.outcomes.iter().find(|o| o.feed_id == feed_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(feed_id: i64, result: Result<FeedSummary, ScrapeError>) -> FeedOutcome {
        FeedOutcome {
            feed_id,
            feed_name: Arc::from("feed"),
            result,
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = ScraperSettings::default();
        assert_eq!(settings.concurrency.get(), 10);
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_report_counts() {
        let report = CycleReport {
            fetched_at: 0,
            outcomes: vec![
                outcome(
                    1,
                    Ok(FeedSummary {
                        found: 3,
                        inserted: 2,
                        already_present: 1,
                        skipped: 0,
                    }),
                ),
                outcome(2, Err(ScrapeError::Fetch(FetchError::Timeout))),
                outcome(
                    3,
                    Ok(FeedSummary {
                        found: 1,
                        inserted: 1,
                        already_present: 0,
                        skipped: 2,
                    }),
                ),
            ],
        };

        assert_eq!(report.selected(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.new_posts(), 3);
        assert!(report.outcome(2).unwrap().result.is_err());
        assert!(report.outcome(4).is_none());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ScrapeError::Fetch(FetchError::Parse("bad".into())).kind(),
            FailureKind::Parse
        );
        assert_eq!(
            ScrapeError::Fetch(FetchError::HttpStatus(503)).kind(),
            FailureKind::Network
        );
        assert_eq!(
            ScrapeError::Store(DatabaseError::Migration("x".into())).kind(),
            FailureKind::Store
        );
    }
}
