//! Poll-rate feedback control.
//!
//! The overlap between two consecutive fetches tells us whether the cadence
//! keeps up with the feed: low overlap means items may have slipped past
//! between polls, high overlap means most of each fetch is already known.

use std::collections::HashSet;
use std::hash::{BuildHasher, Hash};

use crate::AppConfig;

/// Points below target before the interval shrinks.
const LOW_OVERLAP_BAND: f64 = 5.0;
/// Points above target before the interval grows.
const HIGH_OVERLAP_BAND: f64 = 10.0;
const DECREASE_STEP_MS: u64 = 500;
const INCREASE_STEP_MS: u64 = 1_000;
const ROUND_TO_MS: u64 = 100;

/// Bounds and target for the adaptive poll interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollTuning {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub base_interval_ms: u64,
    pub target_overlap_pct: f64,
}

impl Default for PollTuning {
    fn default() -> Self {
        Self {
            min_interval_ms: 6_000,
            max_interval_ms: 30_000,
            base_interval_ms: 10_000,
            target_overlap_pct: 30.0,
        }
    }
}

impl PollTuning {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            min_interval_ms: config.min_poll_interval_ms,
            max_interval_ms: config.max_poll_interval_ms,
            base_interval_ms: config.base_poll_interval_ms,
            target_overlap_pct: config.target_overlap_pct,
        }
    }

    /// Next interval after a successful scan that observed `overlap_pct`.
    #[must_use]
    pub fn next_interval(&self, current_ms: u64, overlap_pct: f64) -> u64 {
        let next = if overlap_pct < self.target_overlap_pct - LOW_OVERLAP_BAND {
            current_ms.saturating_sub(DECREASE_STEP_MS)
        } else if overlap_pct > self.target_overlap_pct + HIGH_OVERLAP_BAND {
            current_ms.saturating_add(INCREASE_STEP_MS)
        } else {
            current_ms
        };
        self.clamp(round_to_step(next))
    }

    /// Backoff applied once failures have piled up: double, capped at the maximum.
    #[must_use]
    pub fn escalate(&self, current_ms: u64) -> u64 {
        self.clamp(round_to_step(current_ms.saturating_mul(2)))
    }

    fn clamp(&self, interval_ms: u64) -> u64 {
        interval_ms.clamp(self.min_interval_ms, self.max_interval_ms)
    }
}

fn round_to_step(ms: u64) -> u64 {
    ms.saturating_add(ROUND_TO_MS / 2) / ROUND_TO_MS * ROUND_TO_MS
}

/// Percentage of `current` ids that were also present in `previous`.
///
/// Returns 0 when either set is empty (first scan, or an empty fetch).
#[must_use]
pub fn compute_overlap<T, S>(current: &HashSet<T, S>, previous: &HashSet<T, S>) -> f64
where
    T: Eq + Hash,
    S: BuildHasher,
{
    if previous.is_empty() || current.is_empty() {
        return 0.0;
    }
    let shared = current.iter().filter(|id| previous.contains(*id)).count();
    #[allow(clippy::cast_precision_loss)]
    let pct = shared as f64 / current.len() as f64 * 100.0;
    pct
}
