//! Jittered delays and cancellation-aware sleeping.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `base + uniform(0, jitter)` seconds
pub fn jittered(base_seconds: u64, jitter_seconds: u64) -> Duration {
    let extra = if jitter_seconds == 0 {
        0.0
    } else {
        fastrand::f64() * jitter_seconds as f64
    };
    Duration::from_secs(base_seconds) + Duration::from_secs_f64(extra)
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
