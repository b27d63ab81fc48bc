pub mod cleanup;
pub mod consent_expiry;
pub mod sync_sweep;
pub mod token_refresh;
pub mod webhook_retry;

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run `job` every `period`, starting immediately, until `cancel` fires.
///
/// A run that overlaps the next tick delays it rather than bunching runs up.
pub async fn every<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future,
{
    tracing::info!(job = name, interval_secs = period.as_secs(), "Job started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = name, "Job stopping");
                break;
            }
            _ = interval.tick() => {
                job().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn runs_on_every_tick_until_cancelled() {
        let runs = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let runs = runs.clone();
            let cancel = cancel.clone();
            every("test", Duration::from_secs(10), cancel, move || {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            })
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Ticks at 0 s, 10 s and 20 s.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
