//! Wall-clock helpers shared by the store crates.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::ids::EpochMillis;

/// Current time in milliseconds since the unix epoch.
#[must_use]
pub fn unix_time_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as EpochMillis)
}
