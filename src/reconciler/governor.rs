use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::CheckError;
use crate::payment::registry::ActivePayment;
use crate::settlement::traits::{Observation, StatusCheck};

/// Timing for a single governed status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Hard ceiling for one invoice, measured from the first attempt
    pub deadline: Duration,
    /// Pause between inconclusive attempts
    pub retry_delay: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// A conclusive answer and how many attempts it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub observation: Observation,
    pub attempts: u32,
}

/// Wraps one invoice's status check in a retry loop bounded by a deadline
///
/// Backend errors and inconclusive answers are both retried after
/// `retry_delay`. When the deadline fires, the attempt loop is dropped,
/// cancelling any backend call still in flight; nothing keeps retrying in
/// the background.
#[derive(Debug, Clone)]
pub struct CheckGovernor {
    config: GovernorConfig,
}

impl CheckGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> GovernorConfig {
        self.config
    }

    pub async fn resolve(&self, payment: &ActivePayment) -> Result<Resolution, CheckError> {
        let invoice = payment.id();
        info!("Checking transaction: {}", invoice);

        match timeout(self.config.deadline, self.attempt_until_known(payment)).await {
            Ok(resolution) => Ok(resolution),
            Err(_) => {
                warn!(
                    "Status check for {} gave up after {:?}",
                    invoice, self.config.deadline
                );
                Err(CheckError::Timeout {
                    invoice,
                    after: self.config.deadline,
                })
            }
        }
    }

    async fn attempt_until_known(&self, payment: &ActivePayment) -> Resolution {
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match payment.check().await {
                Ok(StatusCheck::Resolved(observation)) => {
                    return Resolution {
                        observation,
                        attempts,
                    };
                }
                Ok(StatusCheck::Indeterminate) => {
                    debug!(
                        "Attempt {} for {} inconclusive, retrying in {:?}",
                        attempts,
                        payment.id(),
                        self.config.retry_delay
                    );
                }
                Err(e) => {
                    debug!(
                        "Attempt {} for {} failed via {}: {}, retrying in {:?}",
                        attempts,
                        payment.id(),
                        payment.backend_name(),
                        e,
                        self.config.retry_delay
                    );
                }
            }

            sleep(self.config.retry_delay).await;
        }
    }
}
