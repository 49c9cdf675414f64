//! Monotonic microsecond clock.
//!
//! Process-wide, init-once, no teardown. Read-only from any context,
//! including ISRs. Never wall-clock: values are only meaningful as
//! differences.

/// Current monotonic time in microseconds.
#[cfg(target_os = "espidf")]
#[inline]
pub fn now_us() -> i64 {
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

/// Current monotonic time in microseconds.
///
/// Host builds anchor the epoch at first use.
#[cfg(not(target_os = "espidf"))]
#[inline]
pub fn now_us() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as i64
}
