//! Normalization from raw feed items to [`feedscan_core::NewPost`].

use chrono::{DateTime, Utc};
use feedscan_core::{frames_to_duration, orientation, NewPost};

use crate::types::FeedItem;

/// Normalizes one feed item, using `now` when the item has no `posted_at`.
///
/// Media metadata comes from the post's first attachment, falling back to the
/// item's first attachment. Fractional timestamps are floored to whole
/// seconds. Empty text is stored as absent.
#[must_use]
pub fn normalize_item(item: &FeedItem, now: DateTime<Utc>) -> NewPost {
    let post = &item.post;
    let media = post
        .attachments
        .first()
        .or_else(|| item.attachments.first())
        .cloned()
        .unwrap_or_default();

    NewPost {
        id: post.id.clone(),
        posted_at: posted_at(post.posted_at, now),
        orientation: orientation(media.width, media.height),
        duration: frames_to_duration(media.n_frames),
        text: post
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(str::to_owned),
    }
}

/// Normalizes every item in a batch against a single `now`.
#[must_use]
pub fn normalize_items(items: &[FeedItem], now: DateTime<Utc>) -> Vec<NewPost> {
    items.iter().map(|item| normalize_item(item, now)).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn posted_at(epoch_secs: Option<f64>, now: DateTime<Utc>) -> DateTime<Utc> {
    epoch_secs
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| DateTime::from_timestamp(secs.floor() as i64, 0))
        .unwrap_or_else(|| DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now))
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
