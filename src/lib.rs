//! rssagg: an RSS aggregator.
//!
//! Users register feeds and follow them; a background [`scraper`] fetches
//! every known feed on a fixed cadence, deduplicates posts by URL and stores
//! them; the [`storage`] layer answers "newest posts from the feeds I follow".

pub mod config;
pub mod feed;
pub mod scraper;
pub mod storage;
pub mod util;
