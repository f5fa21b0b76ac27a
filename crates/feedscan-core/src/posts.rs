use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Frame rate the upstream renders at; `n_frames / FRAMES_PER_SECOND` is the clip length.
pub const FRAMES_PER_SECOND: i64 = 30;

const WIDE_RATIO: f64 = 1.1;
const TALL_RATIO: f64 = 0.9;

/// Aspect class of a post's media, derived from its width/height ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Wide,
    Tall,
    Square,
}

impl Orientation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Wide => "wide",
            Orientation::Tall => "tall",
            Orientation::Square => "square",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feed item normalized into the shape stored in `posts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    /// Upstream-assigned identifier; primary key of `posts`.
    pub id: String,
    pub posted_at: DateTime<Utc>,
    pub orientation: Orientation,
    /// Clip length in seconds, two decimal places.
    pub duration: Decimal,
    pub text: Option<String>,
}

/// Classify media dimensions.
///
/// Ratios strictly above 1.1 are wide, strictly below 0.9 are tall, and
/// everything in `[0.9, 1.1]` is square. Missing or zero dimensions are square.
#[must_use]
pub fn orientation(width: Option<u32>, height: Option<u32>) -> Orientation {
    let (Some(width), Some(height)) = (width, height) else {
        return Orientation::Square;
    };
    if width == 0 || height == 0 {
        return Orientation::Square;
    }

    let ratio = f64::from(width) / f64::from(height);
    if ratio > WIDE_RATIO {
        Orientation::Wide
    } else if ratio < TALL_RATIO {
        Orientation::Tall
    } else {
        Orientation::Square
    }
}

/// Convert a frame count to seconds, rounded to two decimals.
///
/// Missing or non-positive frame counts yield zero.
#[must_use]
pub fn frames_to_duration(frames: Option<i64>) -> Decimal {
    match frames {
        Some(n) if n > 0 => (Decimal::from(n) / Decimal::from(FRAMES_PER_SECOND))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        _ => Decimal::ZERO,
    }
}
