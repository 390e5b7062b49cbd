//! ExpirySweeper processor.
//!
//! The ExpirySweeper is responsible for:
//! - Expiring open sessions whose deadline has passed, on a fixed interval
//! - Dropping terminal snapshots past their retention window from the cache
//! - Re-reading `policy.sweep_interval` when the policy is reloaded
//!
//! Expiry goes through the engine's compare-and-set like any other
//! transition, so overlapping sweeps (or a sweep racing a counter-offer)
//! never expire a session twice or expire one that was just extended.

use kanau::processor::Processor;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::ConfigWatcher;
use crate::engine::{NegotiationError, SessionEngine};

/// One sweep at wall-clock time `now`.
#[derive(Debug, Clone, Copy)]
pub struct SweepTick {
    pub now: OffsetDateTime,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

pub struct ExpirySweeper {
    engine: SessionEngine,
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl ExpirySweeper {
    pub fn new(engine: SessionEngine) -> Self {
        Self { engine }
    }

    /// Run the sweeper until shutdown is signaled.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut config_watcher: ConfigWatcher,
    ) {
        let mut period = self.engine.policy().read().await.sweep_interval;
        let mut interval = ticker(period);
        info!(interval = ?period, "ExpirySweeper started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ExpirySweeper received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let next = self.engine.policy().read().await.sweep_interval;
                    if next != period {
                        info!(from = ?period, to = ?next, "Sweep interval changed");
                        period = next;
                        interval = ticker(period);
                    }
                }

                _ = interval.tick() => {
                    let tick = SweepTick { now: self.engine.now() };
                    match self.process(tick).await {
                        Ok(report) if report == SweepReport::default() => {
                            debug!("Sweep found nothing to do");
                        }
                        Ok(report) => {
                            info!(expired = report.expired, purged = report.purged, "Sweep finished");
                        }
                        Err(e) => error!(error = %e, "Sweep failed"),
                    }
                }
            }
        }

        info!("ExpirySweeper shutdown complete");
    }
}

impl Processor<SweepTick> for ExpirySweeper {
    type Output = SweepReport;
    type Error = NegotiationError;

    async fn process(&self, tick: SweepTick) -> Result<SweepReport, NegotiationError> {
        let expired = self.engine.sweep_expired(tick.now).await?;
        let purged = self.engine.purge_terminal_snapshots(tick.now).await;
        Ok(SweepReport { expired, purged })
    }
}
