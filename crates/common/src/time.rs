use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in millis. Entry timestamps are stored in this form so
/// they survive restarts, unlike monotonic instants.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time: before epoch")
        .as_millis() as u64
}
