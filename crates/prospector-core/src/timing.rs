use std::future::Future;
use std::time::{Duration, Instant};

/// Await `fut` and log how long it took under `label`.
///
/// Output and errors pass through untouched.
pub async fn timed<F: Future>(label: &str, fut: F) -> F::Output {
    let (output, elapsed) = measured(fut).await;
    tracing::info!(
        stage = label,
        elapsed_ms = elapsed.as_millis() as u64,
        "{label} finished in {:.2}s",
        elapsed.as_secs_f64()
    );
    output
}

/// Await `fut` and return its output with the elapsed wall time.
pub async fn measured<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = fut.await;
    (output, start.elapsed())
}
