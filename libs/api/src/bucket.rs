use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How the receipt instant of a message is turned into a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BucketPolicy {
    /// The bucket key is the receipt instant itself. Two messages only
    /// share a row when received within the same microsecond.
    Exact,
    /// The receipt instant floored to a fixed window, so the fields of one
    /// reading coalesce when they arrive within `window_ms` of the window start.
    Window {
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
}

fn default_window_ms() -> u64 {
    1000
}

impl Default for BucketPolicy {
    fn default() -> Self {
        BucketPolicy::Window { window_ms: default_window_ms() }
    }
}

impl BucketPolicy {
    pub fn window(width: Duration) -> Self {
        BucketPolicy::Window { window_ms: width.as_millis() as u64 }
    }

    /// Bucket key for a message received at `at`.
    pub fn bucket_for(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            BucketPolicy::Exact => at,
            // A zero window degenerates to millisecond truncation.
            BucketPolicy::Window { window_ms } => {
                let width = window_ms.max(1) as i64;
                let ms = at.timestamp_millis();
                Utc.timestamp_millis_opt(ms - ms.rem_euclid(width))
                    .single()
                    .unwrap_or(at)
            }
        }
    }
}
