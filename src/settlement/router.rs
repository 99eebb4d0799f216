use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::payment::models::{BackendType, CohortKey, Currency, Payment};
use crate::payment::registry::{ActivePayment, ActivePayments};
use crate::settlement::traits::SettlementBackend;

/// BackendRouter - picks the settlement backend for an invoice
///
/// Native backends are keyed by currency. A single provider backend serves
/// every currency it supports.
pub struct BackendRouter {
    native: HashMap<Currency, Arc<dyn SettlementBackend>>,
    provider: Option<Arc<dyn SettlementBackend>>,
}

impl BackendRouter {
    pub fn new() -> Self {
        Self {
            native: HashMap::new(),
            provider: None,
        }
    }

    /// Register a direct chain RPC backend for a currency
    ///
    /// Only call this during initialization
    pub fn register_native(
        &mut self,
        currency: Currency,
        backend: Arc<dyn SettlementBackend>,
    ) -> AppResult<()> {
        if backend.backend_type() != BackendType::Native || !backend.supports(currency) {
            return Err(AppError::Unsupported {
                currency,
                reason: format!("{} is not a native backend for it", backend.name()),
            });
        }

        info!(
            "Registering native backend {} for {} ({})",
            backend.name(),
            currency.name(),
            currency
        );
        self.native.insert(currency, backend);
        Ok(())
    }

    pub fn register_provider(&mut self, backend: Arc<dyn SettlementBackend>) -> AppResult<()> {
        if backend.backend_type() != BackendType::Provider {
            return Err(AppError::Config(format!(
                "{} is not a provider backend",
                backend.name()
            )));
        }

        info!("Registering provider backend {}", backend.name());
        self.provider = Some(backend);
        Ok(())
    }

    pub fn backend_for(&self, payment: &Payment) -> AppResult<Arc<dyn SettlementBackend>> {
        let currency = payment.currency;

        match payment.backend_type {
            BackendType::Native => self.native.get(&currency).cloned().ok_or_else(|| {
                AppError::Unsupported {
                    currency,
                    reason: "no native backend registered".to_string(),
                }
            }),
            BackendType::Provider => match &self.provider {
                Some(provider) if provider.supports(currency) => Ok(provider.clone()),
                Some(provider) => Err(AppError::Unsupported {
                    currency,
                    reason: format!("provider {} does not serve it", provider.name()),
                }),
                None => Err(AppError::Unsupported {
                    currency,
                    reason: "no provider backend registered".to_string(),
                }),
            },
        }
    }

    /// Hand a new invoice to the registry together with its backend
    #[instrument(skip(self, registry, payment), fields(invoice = %payment.id, currency = %payment.currency))]
    pub fn track(
        &self,
        registry: &ActivePayments,
        payment: Payment,
    ) -> AppResult<Arc<ActivePayment>> {
        let backend = self.backend_for(&payment)?;
        registry.track(payment, backend)
    }

    /// Cohorts this router can produce
    pub fn cohort_keys(&self) -> Vec<CohortKey> {
        let mut keys: Vec<CohortKey> = self.native.keys().map(|c| CohortKey::Native(*c)).collect();
        if self.provider.is_some() {
            keys.push(CohortKey::Provider);
        }
        keys.sort();
        keys
    }
}

impl Default for BackendRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::models::PaymentStatus;
    use crate::test_support::{payment_created_at, ScriptedBackend};

    fn router() -> BackendRouter {
        let mut router = BackendRouter::new();
        router
            .register_native(Currency::Sol, ScriptedBackend::native())
            .unwrap();
        router.register_provider(ScriptedBackend::provider()).unwrap();
        router
    }

    #[test]
    fn test_router_registration() {
        let router = router();
        assert_eq!(
            router.cohort_keys(),
            vec![CohortKey::Native(Currency::Sol), CohortKey::Provider]
        );
    }

    #[test]
    fn test_router_rejects_wrong_backend_kind() {
        let mut router = BackendRouter::new();
        assert!(router
            .register_native(Currency::Matic, ScriptedBackend::provider())
            .is_err());
        assert!(router.register_provider(ScriptedBackend::native()).is_err());
    }

    #[test]
    fn test_unroutable_invoices_are_rejected_up_front() {
        let router = router();
        let registry = ActivePayments::default();

        // No native MATIC backend registered
        let matic = payment_created_at(Currency::Matic, BackendType::Native, 0);
        assert!(matches!(
            router.track(&registry, matic),
            Err(AppError::Unsupported {
                currency: Currency::Matic,
                ..
            })
        ));

        let btc = payment_created_at(Currency::Btc, BackendType::Provider, 1);
        let entry = router.track(&registry, btc).unwrap();
        assert_eq!(entry.status(), PaymentStatus::Waiting);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_provider_without_currency_support() {
        struct NarrowProvider;

        #[async_trait::async_trait]
        impl SettlementBackend for NarrowProvider {
            fn name(&self) -> &'static str {
                "narrow"
            }
            fn backend_type(&self) -> BackendType {
                BackendType::Provider
            }
            fn supports(&self, currency: Currency) -> bool {
                currency == Currency::Btc
            }
            async fn check_payment(
                &self,
                _payment: &Payment,
            ) -> AppResult<crate::settlement::traits::StatusCheck> {
                Ok(crate::settlement::traits::StatusCheck::Indeterminate)
            }
        }

        let mut router = BackendRouter::new();
        router.register_provider(Arc::new(NarrowProvider)).unwrap();

        let doge = payment_created_at(Currency::Doge, BackendType::Provider, 0);
        assert!(router.backend_for(&doge).is_err());

        let btc = payment_created_at(Currency::Btc, BackendType::Provider, 0);
        assert_eq!(router.backend_for(&btc).unwrap().name(), "narrow");
    }
}
