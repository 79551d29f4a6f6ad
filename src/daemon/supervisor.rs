use anyhow::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Restart `run_component` with exponential backoff until `shutdown` fires.
///
/// A clean exit while not shutting down counts as a failure. With
/// `max_restarts > 0` the supervisor gives up after that many consecutive
/// failures.
pub(super) fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    max_restarts: u32,
    shutdown: CancellationToken,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);
        let mut consecutive_failures: u32 = 0;

        loop {
            tracing::info!(component = name, "daemon component starting");
            match run_component().await {
                Ok(()) if shutdown.is_cancelled() => {
                    tracing::info!(component = name, "daemon component stopped");
                    break;
                }
                Ok(()) => {
                    tracing::warn!(component = name, "daemon component exited unexpectedly");
                    backoff = initial_backoff_secs.max(1);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                Err(e) => {
                    tracing::error!(component = name, "daemon component failed: {e:#}");
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            if max_restarts > 0 && consecutive_failures > max_restarts {
                tracing::error!(
                    component = name,
                    "daemon component exceeded max restarts ({max_restarts}), circuit open"
                );
                break;
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(backoff)) => {}
            }
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn supervisor_opens_circuit_after_max_restarts() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let handle = spawn_component_supervisor(
            "daemon-test-fail",
            1,
            1,
            1,
            CancellationToken::new(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("boom") }
            },
        );

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn supervisor_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let component_token = shutdown.clone();
        let handle = spawn_component_supervisor(
            "daemon-test-exit",
            1,
            1,
            0,
            shutdown.clone(),
            move || {
                let token = component_token.clone();
                async move {
                    token.cancelled().await;
                    Ok(())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();
    }
}
