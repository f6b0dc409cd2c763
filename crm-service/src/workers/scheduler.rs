use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::services::storage::BillingStore;
use crate::services::RecurringInvoiceGenerator;

/// Periodically drives [`RecurringInvoiceGenerator::run_once`].
///
/// The first run happens one period after start. Runs never overlap: a run
/// that outlasts the period delays the next tick instead of stacking.
pub struct RecurringInvoiceScheduler<S: BillingStore + ?Sized + 'static> {
    generator: RecurringInvoiceGenerator<S>,
    period: Duration,
    shutdown_token: CancellationToken,
}

impl<S: BillingStore + ?Sized + 'static> RecurringInvoiceScheduler<S> {
    pub fn new(generator: RecurringInvoiceGenerator<S>, period: Duration) -> Self {
        Self {
            generator,
            period,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let token = self.shutdown_token.clone();
        let period = self.period;
        let generator = self.generator;

        tracing::info!(
            period_secs = period.as_secs(),
            "Starting recurring invoice scheduler"
        );

        let task = tokio::spawn({
            let token = token.clone();
            async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::info!("Recurring invoice scheduler shutting down");
                            break;
                        }
                        _ = ticker.tick() => {
                            let summary = generator.run_once().await;
                            tracing::debug!(
                                generated = summary.generated,
                                failed_templates = summary.failed_templates,
                                "Scheduled recurring run finished"
                            );
                        }
                    }
                }
            }
        });

        SchedulerHandle { token, task }
    }
}

/// Owner of a running scheduler loop.
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it. A run already in progress completes
    /// first.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Recurring invoice scheduler task failed");
        }
    }
}
