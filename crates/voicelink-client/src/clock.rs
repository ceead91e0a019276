//! Wall-clock helpers shared by the client components.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Seconds since the Unix epoch.
pub(crate) fn epoch_secs() -> i64 {
    epoch_ms() / 1000
}
