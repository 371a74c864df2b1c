use std::time::Duration;

/// Yields to the scheduler for approximately `ms` milliseconds.
///
/// With `ms == 0` this is a single scheduling yield (`tokio::task::yield_now`) rather than an
/// actual timer registration, which keeps zero-delay transforms and tests cheap. Transforms that
/// want to stagger their emissions (see the async multi-emit scenario in the test suite) call this
/// with a nonzero delay, backed by `tokio::time::sleep` so that `tokio::time::pause`/`advance` make
/// the resulting tests deterministic.
pub async fn timeout(ms: u64) {
    if ms == 0 {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
