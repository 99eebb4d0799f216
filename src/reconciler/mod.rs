// Invoice reconciliation: scheduler -> cohort runner -> check governor
pub mod cohort;
pub mod governor;
pub mod scheduler;

pub use cohort::{partition, run_cohort, CohortReport, Cohorts};
pub use governor::{CheckGovernor, GovernorConfig, Resolution};
pub use scheduler::{BatchReport, ReconciliationScheduler, SchedulerConfig};
