//! Feed retrieval and parsing.
//!
//! - [`parser`] turns RSS/Atom bytes into a [`ParsedFeed`] using `feed-rs`,
//!   dropping individual items that lack a usable link.
//! - [`fetcher`] performs the bounded HTTP GET and feeds the body to the parser.

mod fetcher;
mod parser;

pub use fetcher::{FeedFetcher, FetchError, DEFAULT_MAX_FEED_SIZE, DEFAULT_REQUEST_TIMEOUT};
pub use parser::{parse_feed, ItemValidationError, ParsedFeed, ParsedItem};
