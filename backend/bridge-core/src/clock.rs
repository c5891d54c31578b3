//! Instant arithmetic for timers fed by caller and config durations.

use std::time::Duration;

use tokio::time::Instant;

/// About thirty years. Timers past this point are treated as never firing.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, clamped to [`FAR_FUTURE`] instead of overflowing.
pub(crate) fn instant_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(FAR_FUTURE)).unwrap_or(now)
}
