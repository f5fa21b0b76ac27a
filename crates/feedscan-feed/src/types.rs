//! Response types for the upstream feed endpoint.
//!
//! ## Observed shape
//!
//! ### Envelope
//! A successful response carries `items`, an array of `{post, attachments}`
//! objects, plus an opaque `cursor` for the next page. A rejected request may
//! still come back with HTTP 200 and an `error` object instead of `items`, so
//! both are modelled as optional and classified by the client.
//!
//! ### `posted_at`
//! Epoch seconds as a JSON number, sometimes fractional. Occasionally absent
//! on very fresh posts.
//!
//! ### Attachments
//! Media metadata usually lives on `post.attachments`; some items carry it on
//! the outer item instead. `width`, `height` and `n_frames` may each be
//! missing. `n_frames` is rendered at 30 frames per second. Numbers have been
//! seen as floats (`1920.0`) and as strings, so these fields are read leniently
//! and any value that is not a usable number counts as missing.
//!
//! Unknown fields are ignored throughout.

use serde::{Deserialize, Deserializer};

/// Top-level response from `GET <feed_url>?limit=..&cut=..`.
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub items: Option<Vec<FeedItem>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedItem {
    pub post: FeedPost,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedPost {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Epoch seconds.
    #[serde(default, deserialize_with = "lenient_number")]
    pub posted_at: Option<f64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_frames")]
    pub n_frames: Option<i64>,
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(json_number))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .map(f64::round)
        .filter(|n| (0.0..=f64::from(u32::MAX)).contains(n))
        .map(|n| n as u32))
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_frames<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    // i32 bounds keep the cast exact; no clip is anywhere near that long.
    Ok(lenient_number(deserializer)?
        .map(f64::round)
        .filter(|n| (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(n))
        .map(|n| n as i64))
}

/// Items returned by one successful fetch.
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub items: Vec<FeedItem>,
    pub cursor: Option<String>,
}

impl FeedBatch {
    /// Ids of every item, in feed order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.post.id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
