//! Handlers for the store-backed subcommands.
//!
//! Each handler prints its result as JSON on stdout, shaped like the records
//! the aggregator's API returns.

use anyhow::{Context, Result};
use chrono::DateTime;
use secrecy::ExposeSecret;
use serde::Serialize;

use rssagg::scraper::CycleReport;
use rssagg::storage::{Database, Feed, FeedFollow, Post, User};
use rssagg::util::validate_feed_url;

// ============================================================================
// Views
// ============================================================================

fn rfc3339(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn rfc3339_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    id: i64,
    name: &'a str,
    api_key: &'a str,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a User> for UserView<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            name: &user.name,
            api_key: user.api_key.expose_secret(),
            created_at: rfc3339(user.created_at),
            updated_at: rfc3339(user.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedView<'a> {
    id: i64,
    user_id: i64,
    name: &'a str,
    url: &'a str,
    created_at: String,
    updated_at: String,
    last_fetched_at: Option<String>,
}

impl<'a> From<&'a Feed> for FeedView<'a> {
    fn from(feed: &'a Feed) -> Self {
        Self {
            id: feed.id,
            user_id: feed.user_id,
            name: &feed.name,
            url: &feed.url,
            created_at: rfc3339(feed.created_at),
            updated_at: rfc3339(feed.updated_at),
            last_fetched_at: feed.last_fetched_at.map(rfc3339_millis),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedFollowView {
    id: i64,
    user_id: i64,
    feed_id: i64,
    created_at: String,
    updated_at: String,
}

impl From<&FeedFollow> for FeedFollowView {
    fn from(follow: &FeedFollow) -> Self {
        Self {
            id: follow.id,
            user_id: follow.user_id,
            feed_id: follow.feed_id,
            created_at: rfc3339(follow.created_at),
            updated_at: rfc3339(follow.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct PostView<'a> {
    id: i64,
    feed_id: i64,
    title: &'a str,
    url: &'a str,
    description: Option<&'a str>,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Post> for PostView<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            id: post.id,
            feed_id: post.feed_id,
            title: &post.title,
            url: &post.url,
            description: post.description.as_deref(),
            published_at: post.published_at.map(rfc3339),
            created_at: rfc3339(post.created_at),
            updated_at: rfc3339(post.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedCreatedView<'a> {
    feed: FeedView<'a>,
    feed_follow: FeedFollowView,
}

#[derive(Debug, Serialize)]
struct OutcomeView<'a> {
    feed_id: i64,
    name: &'a str,
    inserted: usize,
    already_present: usize,
    skipped: usize,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CycleView<'a> {
    fetched_at: String,
    selected: usize,
    succeeded: usize,
    failed: usize,
    new_posts: usize,
    feeds: Vec<OutcomeView<'a>>,
}

impl<'a> From<&'a CycleReport> for CycleView<'a> {
    fn from(report: &'a CycleReport) -> Self {
        let feeds = report
            .outcomes
            .iter()
            .map(|o| {
                let (inserted, already_present, skipped, error) = match &o.result {
                    Ok(s) => (s.inserted, s.already_present, s.skipped, None),
                    Err(e) => (0, 0, 0, Some(e.to_string())),
                };
                OutcomeView {
                    feed_id: o.feed_id,
                    name: &o.feed_name,
                    inserted,
                    already_present,
                    skipped,
                    error,
                }
            })
            .collect();

        Self {
            fetched_at: rfc3339_millis(report.fetched_at),
            selected: report.selected(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            new_posts: report.new_posts(),
            feeds,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode response")?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn authenticate(db: &Database, api_key: &str) -> Result<User> {
    db.get_user_by_api_key(api_key.trim())
        .await
        .context("Failed to look up user")?
        .ok_or_else(|| anyhow::anyhow!("No user found for that API key"))
}

pub async fn create_user(db: &Database, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("User name must not be empty");
    }
    let user = db.create_user(name).await.context("Failed to create user")?;
    print_json(&UserView::from(&user))
}

pub async fn show_user(db: &Database, api_key: &str) -> Result<()> {
    let user = authenticate(db, api_key).await?;
    print_json(&UserView::from(&user))
}

pub async fn add_feed(db: &Database, api_key: &str, name: &str, url: &str) -> Result<()> {
    let user = authenticate(db, api_key).await?;

    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Feed name must not be empty");
    }
    let url = validate_feed_url(url).with_context(|| format!("Refusing feed URL '{}'", url))?;

    let (feed, follow) = db
        .create_feed(user.id, name, url.as_str())
        .await
        .context("Failed to create feed")?;

    print_json(&FeedCreatedView {
        feed: FeedView::from(&feed),
        feed_follow: FeedFollowView::from(&follow),
    })
}

pub async fn list_feeds(db: &Database) -> Result<()> {
    let feeds = db.get_feeds().await.context("Failed to list feeds")?;
    let views: Vec<FeedView> = feeds.iter().map(FeedView::from).collect();
    print_json(&views)
}

pub async fn follow_feed(db: &Database, api_key: &str, feed_id: i64) -> Result<()> {
    let user = authenticate(db, api_key).await?;

    if db.get_feed(feed_id).await.context("Failed to look up feed")?.is_none() {
        anyhow::bail!("Feed {} does not exist", feed_id);
    }
    let follow = db
        .create_feed_follow(user.id, feed_id)
        .await
        .with_context(|| format!("Failed to follow feed {} (already following?)", feed_id))?;

    print_json(&FeedFollowView::from(&follow))
}

pub async fn list_follows(db: &Database, api_key: &str) -> Result<()> {
    let user = authenticate(db, api_key).await?;
    let follows = db
        .get_feed_follows_for_user(user.id)
        .await
        .context("Failed to list feed follows")?;
    let views: Vec<FeedFollowView> = follows.iter().map(FeedFollowView::from).collect();
    print_json(&views)
}

pub async fn unfollow(db: &Database, api_key: &str, follow_id: i64) -> Result<()> {
    let user = authenticate(db, api_key).await?;
    let deleted = db
        .delete_feed_follow(follow_id, user.id)
        .await
        .context("Failed to delete feed follow")?;
    if !deleted {
        anyhow::bail!("Feed follow {} not found", follow_id);
    }
    print_json(&serde_json::json!({}))
}

pub async fn list_posts(db: &Database, api_key: &str, limit: Option<i64>) -> Result<()> {
    let user = authenticate(db, api_key).await?;
    let posts = db
        .get_posts_for_user(user.id, limit)
        .await
        .context("Failed to get posts for user")?;
    let views: Vec<PostView> = posts.iter().map(PostView::from).collect();
    print_json(&views)
}

pub fn print_cycle(report: &CycleReport) -> Result<()> {
    print_json(&CycleView::from(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_formatting() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(rfc3339(1_630_946_700), "2021-09-06T16:45:00+00:00");
        assert_eq!(
            rfc3339_millis(1_630_946_700_250),
            "2021-09-06T16:45:00.250+00:00"
        );
    }

    #[test]
    fn test_post_view_shape() {
        let post = Post {
            id: 1,
            feed_id: 2,
            title: "Title".into(),
            url: "https://example.com/1".into(),
            description: None,
            published_at: None,
            created_at: 0,
            updated_at: 0,
        };

        let value = serde_json::to_value(PostView::from(&post)).unwrap();
        assert_eq!(value["url"], "https://example.com/1");
        assert!(value["description"].is_null());
        assert!(value["published_at"].is_null());
    }
}
