//! Background sweep that deletes expired undo entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::undo::UndoService;

pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the expiry sweep every `interval` until `cancel` fires.
///
/// The first sweep runs immediately. A failed sweep is logged and retried on the next tick.
pub async fn run_undo_reaper(
    service: Arc<UndoService>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Undo reaper started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Undo reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                match service.purge_expired().await {
                    Ok(0) => tracing::debug!("Undo reaper: nothing to purge"),
                    Ok(deleted) => tracing::debug!(deleted, "Undo reaper: sweep finished"),
                    Err(err) => {
                        tracing::warn!(error = %err, "Undo reaper: sweep failed");
                    }
                }
            }
        }
    }
}
