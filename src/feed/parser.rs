use feed_rs::parser;
use thiserror::Error;
use url::Url;

use crate::scraper::FailureKind;

/// Title given to items whose feed entry has none
const UNTITLED: &str = "Untitled";

/// A feed document reduced to the fields the aggregator stores.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<ParsedItem>,
    /// Items dropped because they failed validation
    pub skipped: Vec<ItemValidationError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// Unix seconds. `None` when the entry carries no date or one that could
    /// not be parsed.
    pub published_at: Option<i64>,
}

/// Reasons a single feed entry is dropped. These never fail the whole feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemValidationError {
    #[error("Item \"{title}\" has no link")]
    MissingUrl { title: String },
    #[error("Item link is not an absolute http(s) URL: {url}")]
    InvalidUrl { url: String },
}

impl ItemValidationError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::ItemValidation
    }
}

/// Parse an RSS or Atom document.
///
/// `base_url` is the address the document was fetched from; relative item
/// links are resolved against it. Entries without a usable link are recorded
/// in [`ParsedFeed::skipped`] and the rest of the document is still returned.
///
/// # Errors
///
/// Returns the `feed-rs` error when the body is not a well-formed feed.
pub fn parse_feed(bytes: &[u8], base_url: &str) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;
    let base = Url::parse(base_url).ok();

    let title = feed.title.map(|t| t.content.trim().to_string()).filter(|t| !t.is_empty());

    let mut items = Vec::with_capacity(feed.entries.len());
    let mut skipped = Vec::new();

    for entry in feed.entries {
        let item_title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let href = entry
            .links
            .iter()
            .map(|l| l.href.trim())
            .find(|h| !h.is_empty());

        let url = match href {
            Some(href) => match resolve_link(base.as_ref(), href) {
                Some(url) => url,
                None => {
                    skipped.push(ItemValidationError::InvalidUrl {
                        url: href.to_string(),
                    });
                    continue;
                }
            },
            None => {
                skipped.push(ItemValidationError::MissingUrl { title: item_title });
                continue;
            }
        };

        let published_at = entry.published.or(entry.updated).map(|dt| dt.timestamp());
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        items.push(ParsedItem {
            title: item_title,
            url,
            description,
            published_at,
        });
    }

    Ok(ParsedFeed {
        title,
        items,
        skipped,
    })
}

/// Resolve `href` against the feed address and keep it only if the result is
/// an http(s) URL.
fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(href).ok()?,
        Err(_) => return None,
    };

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}
