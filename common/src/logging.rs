use std::time::Duration;

/// Runs `fut` and logs a warning if it takes longer than `max` — the
/// teacher's timing guard (`backend/src/logger.rs`), lifted here so both the
/// binary and the library crates it wires together can use it.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
