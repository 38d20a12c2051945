use futures::stream::{self, StreamExt};
use std::num::NonZeroUsize;

use super::{FeedOutcome, FeedSummary, ScrapeError};
use crate::feed::{FeedFetcher, ParsedFeed};
use crate::storage::{Database, Feed, InsertOutcome, NewPost};

/// Fetch and persist a batch of feeds concurrently.
///
/// Runs one task per feed, at most `concurrency` at a time, and returns only
/// when every task has finished. Tasks share nothing but the database pool
/// and the HTTP client. Results come back in completion order.
///
/// Every feed in the batch has its watermark set to `fetched_at` once its
/// fetch attempt is over, whether or not the fetch succeeded, so a broken feed
/// goes to the back of the queue like any other.
pub async fn scrape_batch(
    db: &Database,
    fetcher: &FeedFetcher,
    feeds: Vec<Feed>,
    concurrency: NonZeroUsize,
    fetched_at: i64,
    max_items_per_feed: usize,
) -> Vec<FeedOutcome> {
    if feeds.is_empty() {
        return Vec::new();
    }

    stream::iter(feeds)
        .map(|feed| async move {
            let result = scrape_feed(db, fetcher, &feed, fetched_at, max_items_per_feed).await;
            FeedOutcome {
                feed_id: feed.id,
                feed_name: feed.name,
                result,
            }
        })
        .buffer_unordered(concurrency.get())
        .collect()
        .await
}

async fn scrape_feed(
    db: &Database,
    fetcher: &FeedFetcher,
    feed: &Feed,
    fetched_at: i64,
    max_items_per_feed: usize,
) -> Result<FeedSummary, ScrapeError> {
    let result = match fetcher.fetch(&feed.url).await {
        Ok(parsed) => store_posts(db, feed, parsed, max_items_per_feed).await,
        Err(e) => {
            tracing::warn!(
                feed_id = feed.id,
                name = %feed.name,
                url = %feed.url,
                kind = ?e.kind(),
                error = %e,
                "Failed to fetch feed"
            );
            Err(ScrapeError::Fetch(e))
        }
    };

    let marked = db.mark_feed_fetched(feed.id, fetched_at).await;

    match (result, marked) {
        (Ok(summary), Ok(_)) => Ok(summary),
        (Ok(_), Err(e)) => {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to update feed watermark");
            Err(ScrapeError::Store(e))
        }
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(mark_err)) => {
            tracing::warn!(feed_id = feed.id, error = %mark_err, "Failed to update feed watermark");
            Err(e)
        }
    }
}

async fn store_posts(
    db: &Database,
    feed: &Feed,
    parsed: ParsedFeed,
    max_items_per_feed: usize,
) -> Result<FeedSummary, ScrapeError> {
    let mut summary = FeedSummary {
        found: parsed.items.len(),
        skipped: parsed.skipped.len(),
        ..FeedSummary::default()
    };

    for skipped in &parsed.skipped {
        tracing::debug!(feed_id = feed.id, reason = %skipped, "Item dropped");
    }
    if summary.skipped > 0 {
        tracing::warn!(
            feed_id = feed.id,
            url = %feed.url,
            skipped = summary.skipped,
            "Items without a usable link skipped"
        );
    }

    for item in parsed.items.into_iter().take(max_items_per_feed) {
        let post = NewPost {
            feed_id: feed.id,
            title: item.title,
            url: item.url,
            description: item.description,
            published_at: item.published_at,
        };

        match db.insert_post_if_absent(&post).await {
            Ok(InsertOutcome::Inserted) => summary.inserted += 1,
            Ok(InsertOutcome::AlreadyPresent) => summary.already_present += 1,
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    post_url = %post.url,
                    error = %e,
                    "Failed to store post, abandoning feed for this cycle"
                );
                return Err(ScrapeError::Store(e));
            }
        }
    }

    tracing::debug!(
        feed_id = feed.id,
        name = %feed.name,
        found = summary.found,
        inserted = summary.inserted,
        "Feed collected"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::DEFAULT_MAX_FEED_SIZE;
    use crate::scraper::FailureKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss(links: &[&str]) -> String {
        let items: String = links
            .iter()
            .map(|l| format!("<item><title>{}</title><link>{}</link></item>", l, l))
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>{}</channel></rss>"#,
            items
        )
    }

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(Duration::from_secs(5), DEFAULT_MAX_FEED_SIZE).unwrap()
    }

    fn one() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }

    async fn setup(urls: &[String]) -> (Database, Vec<Feed>) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let mut feeds = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            let (feed, _) = db
                .create_feed(user.id, &format!("Feed {}", i), url)
                .await
                .unwrap();
            feeds.push(feed);
        }
        (db, feeds)
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let db = Database::open(":memory:").await.unwrap();
        let outcomes = scrape_batch(&db, &fetcher(), Vec::new(), one(), 0, 100).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_success_inserts_and_marks() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss(&["https://example.com/1", "https://example.com/2"])),
            )
            .mount(&mock_server)
            .await;

        let (db, feeds) = setup(&[format!("{}/feed", mock_server.uri())]).await;
        let feed_id = feeds[0].id;

        let outcomes = scrape_batch(&db, &fetcher(), feeds, one(), 1_000, 100).await;
        assert_eq!(
            outcomes[0].result.as_ref().unwrap(),
            &FeedSummary {
                found: 2,
                inserted: 2,
                already_present: 0,
                skipped: 0
            }
        );

        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched_at, Some(1_000));
        assert_eq!(db.get_posts_for_feed(feed_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_reports_already_present() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(&["https://example.com/1"])))
            .mount(&mock_server)
            .await;

        let (db, feeds) = setup(&[format!("{}/feed", mock_server.uri())]).await;

        scrape_batch(&db, &fetcher(), feeds.clone(), one(), 1_000, 100).await;
        let outcomes = scrape_batch(&db, &fetcher(), feeds, one(), 2_000, 100).await;

        let summary = outcomes[0].result.as_ref().unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.already_present, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_still_marks_watermark() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let (db, feeds) = setup(&[format!("{}/feed", mock_server.uri())]).await;
        let feed_id = feeds[0].id;

        let outcomes = scrape_batch(&db, &fetcher(), feeds, one(), 1_000, 100).await;
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Network);

        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched_at, Some(1_000));
    }

    #[tokio::test]
    async fn test_item_cap() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[
                "https://example.com/1",
                "https://example.com/2",
                "https://example.com/3",
            ])))
            .mount(&mock_server)
            .await;

        let (db, feeds) = setup(&[format!("{}/feed", mock_server.uri())]).await;
        let feed_id = feeds[0].id;

        scrape_batch(&db, &fetcher(), feeds, one(), 1_000, 2).await;
        assert_eq!(db.get_posts_for_feed(feed_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_store_kind() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(&["https://example.com/1"])))
            .mount(&mock_server)
            .await;

        let (db, feeds) = setup(&[format!("{}/feed", mock_server.uri())]).await;
        db.close().await;

        let outcomes = scrape_batch(&db, &fetcher(), feeds, one(), 1_000, 100).await;
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Store);
    }
}
