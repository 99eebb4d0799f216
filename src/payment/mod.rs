pub mod models;
pub mod registry;

pub use models::{BackendType, CohortKey, Currency, InvoiceView, Payment, PaymentIdentity, PaymentStatus};
pub use registry::{ActivePayment, ActivePayments, StatusChange, StatusUpdate};
