pub mod client;
pub mod error;
pub mod normalize;
pub mod rotation;
pub mod types;

pub use client::FeedClient;
pub use error::FetchError;
pub use normalize::{normalize_item, normalize_items};
pub use rotation::{FeedApi, FeedSource, TokenRotatingFetcher, TokenSource};
pub use types::{Attachment, FeedBatch, FeedItem, FeedPost, FeedResponse};
