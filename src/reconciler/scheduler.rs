// Reconciliation scheduler - polls every active invoice in batches
//
// Batch strategy:
// - Snapshot the active set and split it into cohorts by settlement backend
// - Cohorts run concurrently, invoices within a cohort run one at a time
// - A batch never starts sooner than `min_batch_period` after the previous one
//   started, to stay under third-party provider rate limits
// - stop() is honoured at the next batch boundary; an in-flight batch always
//   completes

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::payment::registry::ActivePayments;
use crate::reconciler::cohort::{partition, run_cohort, CohortReport};
use crate::reconciler::governor::{CheckGovernor, GovernorConfig};

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum wall-clock time between the starts of two batches
    pub min_batch_period: Duration,
    pub governor: GovernorConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_batch_period: Duration::from_secs(30),
            governor: GovernorConfig::default(),
        }
    }
}

/// Summary of one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchReport {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub invoices: usize,
    pub cohorts: usize,
    pub totals: CohortReport,
}

#[derive(Debug, Default)]
struct LoopState {
    running: bool,
    stop_requested: bool,
}

struct SchedulerInner {
    registry: Arc<ActivePayments>,
    governor: CheckGovernor,
    min_batch_period: Duration,
    state: Mutex<LoopState>,
}

/// Reconciliation scheduler - drives the batch loop over the active invoice set
#[derive(Clone)]
pub struct ReconciliationScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReconciliationScheduler {
    pub fn new(registry: Arc<ActivePayments>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                governor: CheckGovernor::new(config.governor),
                min_batch_period: config.min_batch_period,
                state: Mutex::new(LoopState::default()),
            }),
        }
    }

    /// Start batching in the background
    ///
    /// Returns `None` when the loop is already running. A pending stop request
    /// is withdrawn in that case, so the running loop carries on.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                if state.stop_requested {
                    info!("Withdrawing pending stop request, scheduler keeps running");
                    state.stop_requested = false;
                } else {
                    warn!("Reconciliation scheduler already running");
                }
                return None;
            }
            state.running = true;
        }

        info!(
            "⏰ Reconciliation scheduler started (min batch period {:?})",
            self.inner.min_batch_period
        );

        let inner = self.inner.clone();
        Some(tokio::spawn(async move { inner.run_loop().await }))
    }

    /// Ask the loop to halt at the next batch boundary
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            info!("Stop requested, scheduler will halt after the current batch");
            state.stop_requested = true;
        } else {
            debug!("Stop requested while scheduler is idle, ignoring");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Run a single batch without pacing
    pub async fn run_batch(&self) -> BatchReport {
        self.inner.run_batch().await
    }
}

impl SchedulerInner {
    async fn run_loop(&self) {
        loop {
            if self.consume_stop_request() {
                info!("✓ Reconciliation scheduler stopped");
                return;
            }

            let report = self.run_batch().await;

            if let Some(wait) = pacing_delay(report.elapsed, self.min_batch_period) {
                info!("Waiting {:?} for min refresh time", wait);
                sleep(wait).await;
            }
        }
    }

    fn consume_stop_request(&self) -> bool {
        let mut state = self.state.lock();
        if state.stop_requested {
            state.stop_requested = false;
            state.running = false;
            true
        } else {
            false
        }
    }

    async fn run_batch(&self) -> BatchReport {
        let started_at = Instant::now();
        let snapshot = self.registry.snapshot();
        let invoices = snapshot.len();
        let cohorts = partition(snapshot);

        debug!(
            "🔄 Starting batch: {} invoices in {} cohorts",
            invoices,
            cohorts.len()
        );

        let reports = join_all(
            cohorts
                .iter()
                .map(|(key, cohort)| run_cohort(*key, cohort, &self.governor)),
        )
        .await;

        let mut totals = CohortReport::default();
        for report in reports {
            totals.merge(report);
        }

        let elapsed = started_at.elapsed();
        info!(
            "Batch finished in {:?}: {} checked, {} changed, {} failed",
            elapsed, totals.checked, totals.changed, totals.failed
        );

        BatchReport {
            started_at,
            elapsed,
            invoices,
            cohorts: cohorts.len(),
            totals,
        }
    }
}

/// Remaining time to wait so batches start at least `min_period` apart
fn pacing_delay(elapsed: Duration, min_period: Duration) -> Option<Duration> {
    min_period
        .checked_sub(elapsed)
        .filter(|remaining| !remaining.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::models::{BackendType, Currency, PaymentStatus};
    use crate::test_support::{payment_created_at, ScriptedBackend, Step};

    const MIN_PERIOD: Duration = Duration::from_secs(30);

    fn scheduler(registry: Arc<ActivePayments>) -> ReconciliationScheduler {
        ReconciliationScheduler::new(
            registry,
            SchedulerConfig {
                min_batch_period: MIN_PERIOD,
                governor: GovernorConfig {
                    deadline: Duration::from_secs(60),
                    retry_delay: Duration::from_secs(5),
                },
            },
        )
    }

    fn slow_backend(backend_type: BackendType, latency: Duration) -> Arc<ScriptedBackend> {
        Arc::new(
            ScriptedBackend::new(backend_type, Step::Resolve(PaymentStatus::Waiting))
                .with_latency(latency),
        )
    }

    #[test]
    fn test_pacing_delay() {
        assert_eq!(
            pacing_delay(Duration::from_secs(4), Duration::from_secs(30)),
            Some(Duration::from_secs(26))
        );
        assert_eq!(
            pacing_delay(Duration::from_secs(30), Duration::from_secs(30)),
            None
        );
        assert_eq!(
            pacing_delay(Duration::from_secs(45), Duration::from_secs(30)),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cohorts_overlap_within_a_batch() {
        let registry = Arc::new(ActivePayments::default());
        let native = slow_backend(BackendType::Native, Duration::from_secs(10));
        let provider = slow_backend(BackendType::Provider, Duration::from_secs(10));

        registry
            .track(payment_created_at(Currency::Sol, BackendType::Native, 0), native.clone())
            .unwrap();
        registry
            .track(payment_created_at(Currency::Btc, BackendType::Provider, 1), provider.clone())
            .unwrap();

        let report = scheduler(registry).run_batch().await;

        assert_eq!(report.cohorts, 2);
        assert_eq!(report.totals.checked, 2);
        assert!(report.elapsed < Duration::from_secs(20));

        let a = native.calls()[0];
        let b = provider.calls()[0];
        assert!(a.started < b.finished && b.started < a.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_respect_min_period() {
        let registry = Arc::new(ActivePayments::default());
        let backend = slow_backend(BackendType::Native, Duration::from_secs(1));
        registry
            .track(payment_created_at(Currency::Matic, BackendType::Native, 0), backend.clone())
            .unwrap();

        let scheduler = scheduler(registry);
        let handle = scheduler.start().unwrap();
        sleep(Duration::from_secs(100)).await;
        scheduler.stop();
        handle.await.unwrap();

        let calls = backend.calls();
        assert!(calls.len() >= 3, "only {} batches", calls.len());
        for pair in calls.windows(2) {
            assert!(pair[1].started - pair[0].started >= MIN_PERIOD);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_batches_are_not_padded() {
        let registry = Arc::new(ActivePayments::default());
        let backend = slow_backend(BackendType::Native, Duration::from_secs(45));
        registry
            .track(payment_created_at(Currency::Sol, BackendType::Native, 0), backend.clone())
            .unwrap();

        let scheduler = scheduler(registry);
        let handle = scheduler.start().unwrap();
        sleep(Duration::from_secs(100)).await;
        scheduler.stop();
        handle.await.unwrap();

        let calls = backend.calls();
        assert!(calls.len() >= 2);
        assert_eq!(calls[1].started - calls[0].started, Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_batch_finish_and_start_resumes() {
        let registry = Arc::new(ActivePayments::default());
        let backend = slow_backend(BackendType::Native, Duration::from_secs(10));
        registry
            .track(payment_created_at(Currency::Sol, BackendType::Native, 0), backend.clone())
            .unwrap();

        let scheduler = scheduler(registry);
        let handle = scheduler.start().unwrap();

        sleep(Duration::from_secs(5)).await;
        scheduler.stop();
        assert_eq!(backend.call_count(), 0);

        handle.await.unwrap();
        assert!(!scheduler.is_running());
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].finished - calls[0].started, Duration::from_secs(10));

        let handle = scheduler.start().unwrap();
        sleep(Duration::from_secs(15)).await;
        assert_eq!(backend.call_count(), 2);

        scheduler.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_withdraws_stop() {
        let registry = Arc::new(ActivePayments::default());
        let backend = slow_backend(BackendType::Native, Duration::from_secs(10));
        registry
            .track(payment_created_at(Currency::Sol, BackendType::Native, 0), backend.clone())
            .unwrap();

        let scheduler = scheduler(registry);
        let handle = scheduler.start().unwrap();
        assert!(scheduler.start().is_none());

        sleep(Duration::from_secs(5)).await;
        scheduler.stop();
        assert!(scheduler.start().is_none());

        // Still running through the next boundary
        sleep(Duration::from_secs(40)).await;
        assert!(scheduler.is_running());
        assert_eq!(backend.call_count(), 2);

        scheduler.stop();
        handle.await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_is_ignored() {
        let registry = Arc::new(ActivePayments::default());
        let scheduler = scheduler(registry);

        scheduler.stop();
        assert!(!scheduler.is_running());

        let handle = scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop();
        handle.await.unwrap();
    }
}
