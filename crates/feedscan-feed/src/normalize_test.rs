use super::*;
use chrono::TimeZone;
use feedscan_core::Orientation;
use rust_decimal::Decimal;

use crate::types::{Attachment, FeedPost};

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

fn attachment(width: u32, height: u32, n_frames: i64) -> Attachment {
    Attachment {
        width: Some(width),
        height: Some(height),
        n_frames: Some(n_frames),
    }
}

fn make_item(id: &str, post_attachments: Vec<Attachment>) -> FeedItem {
    FeedItem {
        post: FeedPost {
            id: id.to_owned(),
            text: Some("a fox running through snow".to_owned()),
            posted_at: Some(1_700_000_000.0),
            attachments: post_attachments,
        },
        attachments: vec![],
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_800_000_000, 500_000_000).unwrap()
}

// -----------------------------------------------------------------------
// normalize_item
// -----------------------------------------------------------------------

#[test]
fn normalize_item_maps_post_fields() {
    let item = make_item("s_1", vec![attachment(1080, 1920, 300)]);
    let post = normalize_item(&item, fixed_now());

    assert_eq!(post.id, "s_1");
    assert_eq!(post.posted_at.timestamp(), 1_700_000_000);
    assert_eq!(post.orientation, Orientation::Tall);
    assert_eq!(post.duration, Decimal::new(1000, 2));
    assert_eq!(post.text.as_deref(), Some("a fox running through snow"));
}

#[test]
fn normalize_item_floors_fractional_timestamp() {
    let mut item = make_item("s_2", vec![]);
    item.post.posted_at = Some(1_700_000_000.9);
    assert_eq!(
        normalize_item(&item, fixed_now()).posted_at.timestamp(),
        1_700_000_000
    );
}

#[test]
fn normalize_item_missing_timestamp_uses_now_floored() {
    let mut item = make_item("s_3", vec![]);
    item.post.posted_at = None;
    let post = normalize_item(&item, fixed_now());
    assert_eq!(post.posted_at.timestamp(), 1_800_000_000);
    assert_eq!(post.posted_at.timestamp_subsec_nanos(), 0);
}

#[test]
fn normalize_item_without_media_is_square_zero_duration() {
    let item = make_item("s_4", vec![]);
    let post = normalize_item(&item, fixed_now());
    assert_eq!(post.orientation, Orientation::Square);
    assert_eq!(post.duration, Decimal::ZERO);
}

#[test]
fn normalize_item_falls_back_to_item_attachments() {
    let mut item = make_item("s_5", vec![]);
    item.attachments = vec![attachment(1920, 1080, 451)];
    let post = normalize_item(&item, fixed_now());
    assert_eq!(post.orientation, Orientation::Wide);
    assert_eq!(post.duration, Decimal::new(1503, 2));
}

#[test]
fn normalize_item_prefers_post_attachment() {
    let mut item = make_item("s_6", vec![attachment(1000, 1000, 30)]);
    item.attachments = vec![attachment(1920, 1080, 300)];
    let post = normalize_item(&item, fixed_now());
    assert_eq!(post.orientation, Orientation::Square);
    assert_eq!(post.duration, Decimal::new(100, 2));
}

#[test]
fn normalize_item_empty_text_is_none() {
    let mut item = make_item("s_7", vec![]);
    item.post.text = Some(String::new());
    assert!(normalize_item(&item, fixed_now()).text.is_none());
}

#[test]
fn normalize_items_preserves_order() {
    let items = vec![make_item("a", vec![]), make_item("b", vec![])];
    let posts = normalize_items(&items, fixed_now());
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}
