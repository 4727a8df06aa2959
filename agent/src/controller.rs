//! The retry/status controller: the timer loop that drives cycles, the
//! dns-failure backoff, and the storefront order alert cooldown.
//!
//! One cooperative loop fires a cycle every `pull_interval`. Cycles never
//! overlap: a tick that lands while one is running is skipped by the
//! engine's cycle guard, not queued.
//!
//! Of the failure classes only `dns` gets an out-of-band retry. A dns
//! failure usually means the machine just came back from suspend or
//! switched networks, where resolving recovers in seconds; the other
//! classes are covered well enough by the fixed interval.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::cycle::{CycleOutcome, SyncEngine};
use crate::events::SyncEvent;

/// Drive sync cycles until the process ends.
///
/// Returns immediately when no remote is configured; local reads and
/// writes work without a sync loop.
pub async fn run(engine: Arc<SyncEngine>) {
    if !engine.is_configured() {
        info!("SYNC_BASE_URL not set; sync loop not started");
        return;
    }

    let mut ticker = interval(engine.config().pull_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick fires immediately, giving an initial cycle on
        // startup before the interval cadence begins.
        ticker.tick().await;
        if engine.run_cycle().await == CycleOutcome::Skipped {
            debug!("tick skipped; previous cycle still running");
        }
    }
}

impl SyncEngine {
    /// Schedule a one-shot backoff retry after a dns-classified failure.
    /// At most one retry is pending at a time; the delay doubles per
    /// consecutive failure up to the configured cap.
    pub(crate) fn schedule_retry(
        self: &Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // Boxed with an explicit `Send` bound rather than left as an `async
        // fn` opaque type: `run_cycle` awaits this future and `schedule_retry`
        // spawns `run_cycle`, so an inferred opaque return type would make the
        // `tokio::spawn` `Send` obligation recurse into itself. A concrete
        // boxed `+ Send` return type breaks that auto-trait inference cycle.
        Box::pin(async move {
            let delay = {
                let mut retry = self.retry.lock().await;
                if retry.scheduled {
                    return;
                }
                let factor = 2u32.saturating_pow(retry.attempt.min(16));
                let delay = self
                    .config()
                    .retry_base
                    .saturating_mul(factor)
                    .min(self.config().retry_max);
                retry.attempt += 1;
                retry.scheduled = true;
                delay
            };

            info!(delay_ms = delay.as_millis() as u64, "dns failure; retry scheduled");
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.retry.lock().await.scheduled = false;
                debug!("backoff retry firing");
                engine.run_cycle().await;
            });
        })
    }

    /// Forget the backoff progression after a successful cycle. A retry
    /// already sleeping fires one extra (guarded) cycle, which is
    /// harmless.
    pub(crate) async fn reset_retry(&self) {
        self.retry.lock().await.attempt = 0;
    }

    /// Emit a storefront order alert unless one fired within the
    /// cooldown window.
    pub(crate) async fn maybe_alert(&self, count: usize) {
        if !self.config().notifications_enabled || count == 0 {
            return;
        }

        {
            let mut last = self.last_alert_at.lock().await;
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.config().notify_cooldown {
                    debug!(count, "order alert suppressed by cooldown");
                    return;
                }
            }
            *last = Some(now);
        }

        info!(count, "new storefront orders arrived");
        self.events().emit(SyncEvent::NewOrderAlert { count });
    }
}
