use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as whole Unix seconds.
///
/// Every persisted timestamp in the system uses this resolution.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Current wall-clock time as fractional Unix seconds.
///
/// Used only on the heartbeat wire format, which carries float seconds.
pub fn now_unix_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
