mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use posts::{DEFAULT_POSTS_LIMIT, MAX_POSTS_LIMIT};
pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedFollow, InsertOutcome, NewPost, Post, User};
