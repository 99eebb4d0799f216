use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::payment::models::CohortKey;
use crate::payment::registry::{ActivePayment, StatusUpdate};
use crate::reconciler::governor::CheckGovernor;

/// Invoices grouped by the backend that serves them, in snapshot order
pub type Cohorts = BTreeMap<CohortKey, Vec<Arc<ActivePayment>>>;

/// Group a registry snapshot into cohorts. Every invoice lands in exactly one.
pub fn partition(snapshot: Vec<Arc<ActivePayment>>) -> Cohorts {
    let mut cohorts = Cohorts::new();
    for payment in snapshot {
        cohorts
            .entry(payment.identity().cohort_key())
            .or_default()
            .push(payment);
    }
    cohorts
}

/// What happened to one cohort during a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CohortReport {
    /// Invoices that went through the governor
    pub checked: usize,
    /// Checks that moved an invoice to a new status
    pub changed: usize,
    /// Terminal invoices left alone
    pub skipped: usize,
    /// Timeouts, rejected transitions and panics
    pub failed: usize,
}

impl CohortReport {
    pub fn merge(&mut self, other: CohortReport) {
        self.checked += other.checked;
        self.changed += other.changed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Check every invoice in the cohort one after another
///
/// Invoices in a cohort share an upstream provider, so they are never checked
/// concurrently. A failure on one invoice is logged and the runner moves on.
pub async fn run_cohort(
    key: CohortKey,
    cohort: &[Arc<ActivePayment>],
    governor: &CheckGovernor,
) -> CohortReport {
    let mut report = CohortReport::default();
    if cohort.is_empty() {
        return report;
    }

    debug!("Cohort {} starting with {} invoices", key, cohort.len());

    for payment in cohort {
        let invoice = payment.id();
        let status = payment.status();

        if status.is_terminal() {
            debug!("Skipping invoice {} in terminal status {}", invoice, status);
            report.skipped += 1;
            continue;
        }

        report.checked += 1;

        let outcome = AssertUnwindSafe(governor.resolve(payment))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(resolution)) => match payment.apply_observation(resolution.observation) {
                Ok(StatusUpdate::Changed { .. }) => report.changed += 1,
                Ok(StatusUpdate::Unchanged) => {}
                Err(e) => {
                    warn!("Ignoring status report for invoice {}: {}", invoice, e);
                    report.failed += 1;
                }
            },
            Ok(Err(e)) => {
                error!("Check failed for invoice {}: {}", invoice, e);
                report.failed += 1;
            }
            Err(_) => {
                error!("Check for invoice {} panicked", invoice);
                report.failed += 1;
            }
        }
    }

    info!(
        "Cohort {} done: {} checked, {} changed, {} skipped, {} failed",
        key, report.checked, report.changed, report.skipped, report.failed
    );

    report
}
