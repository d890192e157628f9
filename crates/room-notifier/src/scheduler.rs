use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::audit;
use crate::calendar_client::CalendarSource;
use crate::db::DedupStore;
use crate::notifier::ChatChannel;
use crate::poller::AppContext;

/// Work the scheduler drives on its two tickers.
#[allow(async_fn_in_trait)]
pub trait ScheduledService {
    /// One poll cycle
    async fn poll(&mut self) -> Result<()>;

    /// One retention sweep
    async fn sweep(&mut self) -> Result<()>;

    /// Persist a failure the service could not report itself (a panic).
    async fn record_failure(&mut self, message: String);

    /// Release connections once the loop has stopped.
    async fn shutdown(&mut self);
}

pub struct PollingScheduler {
    poll_interval: Duration,
    sweep_interval: Duration,
    stop: CancellationToken,
}

impl PollingScheduler {
    pub fn new(poll_interval: Duration, sweep_interval: Duration, stop: CancellationToken) -> Self {
        Self {
            poll_interval,
            sweep_interval,
            stop,
        }
    }

    /// Poll immediately, then every `poll_interval`, sweeping every
    /// `sweep_interval`, until the stop token is cancelled.
    ///
    /// A cycle that is already running finishes before the stop is honoured.
    pub async fn run<S: ScheduledService>(&self, service: &mut S) {
        let mut poll_ticker = time::interval(self.poll_interval);
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_ticker = time::interval(self.sweep_interval);
        sweep_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Scheduler started (poll interval: {:?}, sweep interval: {:?})",
            self.poll_interval,
            self.sweep_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,
                _ = poll_ticker.tick() => {
                    tracing::debug!("Running poll cycle");
                    if let Some(message) = guarded("Poll cycle", service.poll()).await {
                        service.record_failure(message).await;
                    }
                }
                _ = sweep_ticker.tick() => {
                    tracing::debug!("Running retention sweep");
                    if let Some(message) = guarded("Retention sweep", service.sweep()).await {
                        service.record_failure(message).await;
                    }
                }
            }
        }

        tracing::info!("Stop requested, shutting down scheduler");
        service.shutdown().await;
    }
}

/// Await `job`, containing both errors and panics.
///
/// Errors were already written to the audit log by the job itself. A panic is
/// returned as a message for the caller to record.
async fn guarded<F>(label: &str, job: F) -> Option<String>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::debug!("{} failed: {:#}", label, e);
            None
        }
        Err(panic) => {
            let message = format!("{} panicked: {}", label, panic_message(panic.as_ref()));
            tracing::error!("{}", message);
            Some(message)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<Src, St, Ch> ScheduledService for AppContext<Src, St, Ch>
where
    Src: CalendarSource,
    St: DedupStore,
    Ch: ChatChannel,
{
    async fn poll(&mut self) -> Result<()> {
        self.run_poll_cycle(Utc::now()).await?;
        Ok(())
    }

    async fn sweep(&mut self) -> Result<()> {
        self.run_retention(Utc::now()).await?;
        Ok(())
    }

    async fn record_failure(&mut self, message: String) {
        audit::error(&mut self.store, message).await;
    }

    async fn shutdown(&mut self) {
        self.notifier.shutdown().await;
        audit::info(&mut self.store, "Service stopped").await;
    }
}
