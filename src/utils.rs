//! Small helpers without a better home.

use chrono::Utc;

/// Seconds since the Unix epoch, as recorded in index sidecars.
pub fn get_utc_timestamp() -> u64 {
    // clamp pre-epoch clocks rather than wrapping
    Utc::now().timestamp().max(0) as u64
}
