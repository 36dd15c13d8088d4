pub mod backoff;
pub mod cancellation;
pub mod checkpoint;

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    u64::try_from(now).unwrap_or_default()
}
