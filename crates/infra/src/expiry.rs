//! Expiry scheduler: periodic sweep forcing overdue orders to EXPIRED.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use partsmarket_core::Clock;
use partsmarket_events::EventBus;

use crate::error::MarketResult;
use crate::marketplace::{ExpirySweep, MarketplaceService};
use crate::notify::OrderEnvelope;
use crate::store::MarketplaceStore;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to stop a running scheduler.
#[derive(Debug)]
pub struct ExpirySchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ExpirySchedulerHandle {
    /// Signal the task and wait for the sweep in progress (if any) to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "expiry scheduler task ended abnormally");
        }
    }
}

pub struct ExpiryScheduler<S: ?Sized, B> {
    service: Arc<MarketplaceService<S, B>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<S, B> ExpiryScheduler<S, B>
where
    S: MarketplaceStore + ?Sized + 'static,
    B: EventBus<OrderEnvelope> + 'static,
{
    pub fn new(service: Arc<MarketplaceService<S, B>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep at the clock's current time.
    pub async fn sweep_once(&self) -> MarketResult<ExpirySweep> {
        let now = self.clock.now();
        let sweep = self.service.expire_due(now).await?;
        if !sweep.expired.is_empty() || sweep.failed > 0 {
            info!(
                expired = sweep.expired.len(),
                skipped = sweep.skipped,
                failed = sweep.failed,
                "expiry sweep finished"
            );
        }
        Ok(sweep)
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    pub fn spawn(self) -> ExpirySchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "expiry scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_once().await {
                            error!(error = %err, "expiry sweep failed");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("expiry scheduler stopped");
        });

        ExpirySchedulerHandle { shutdown, join }
    }
}
