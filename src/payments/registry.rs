//! Gateway registry
//!
//! Built once at startup from configuration and shared by reference. Callers
//! select an adapter by provider id and never branch on the concrete type.

use crate::config::GatewaysConfig;
use crate::error::AppResult;
use crate::payments::currency::ExchangeRates;
use crate::payments::http::{HttpTransport, ReqwestTransport};
use crate::payments::providers::{EasyKashGateway, PaymobGateway, TapGateway};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::ProviderId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct GatewayRegistry {
    gateways: HashMap<ProviderId, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Build every adapter over a shared `reqwest` transport
    pub fn from_config(config: &GatewaysConfig, rates: Arc<dyn ExchangeRates>) -> AppResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.http.timeout())?);
        Ok(Self::with_transport(config, transport, rates))
    }

    /// Build every adapter over the given transport
    pub fn with_transport(
        config: &GatewaysConfig,
        transport: Arc<dyn HttpTransport>,
        rates: Arc<dyn ExchangeRates>,
    ) -> Self {
        let gateways: Vec<Arc<dyn PaymentGateway>> = vec![
            Arc::new(PaymobGateway::new(
                config.paymob.clone(),
                transport.clone(),
                &config.http,
                rates,
            )),
            Arc::new(EasyKashGateway::new(
                config.easykash.clone(),
                transport.clone(),
                &config.http,
            )),
            Arc::new(TapGateway::new(config.tap.clone(), transport, &config.http)),
        ];

        let gateways: HashMap<_, _> = gateways
            .into_iter()
            .map(|gateway| (gateway.id(), gateway))
            .collect();

        let configured: Vec<&str> = ProviderId::ALL
            .into_iter()
            .filter(|id| gateways.get(id).is_some_and(|g| g.is_configured()))
            .map(|id| id.as_str())
            .collect();
        info!(configured = ?configured, "Payment gateway registry initialized");

        Self { gateways }
    }

    pub fn get(&self, id: ProviderId) -> Option<&dyn PaymentGateway> {
        self.gateways.get(&id).map(|gateway| gateway.as_ref())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&dyn PaymentGateway> {
        name.parse().ok().and_then(|id| self.get(id))
    }

    /// Adapters with every required credential present, in provider order
    pub fn configured(&self) -> Vec<&dyn PaymentGateway> {
        self.iter().filter(|gateway| gateway.is_configured()).collect()
    }

    /// All adapters in provider order
    pub fn iter(&self) -> impl Iterator<Item = &dyn PaymentGateway> + '_ {
        ProviderId::ALL
            .into_iter()
            .filter_map(move |id| self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::currency::StaticExchangeRates;
    use crate::payments::test_support::MockTransport;

    fn registry(config: &GatewaysConfig) -> GatewayRegistry {
        GatewayRegistry::with_transport(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(StaticExchangeRates::new()),
        )
    }

    #[test]
    fn test_every_provider_registered() {
        let registry = registry(&GatewaysConfig::default());
        let names: Vec<&str> = registry.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["paymob", "easykash", "tap"]);
        assert!(registry.configured().is_empty());
    }

    #[test]
    fn test_lookup_by_name() {
        let mut config = GatewaysConfig::default();
        config.tap.secret_key = "sk".to_string();
        let registry = registry(&config);

        let tap = registry.get_by_name("TAP").unwrap();
        assert_eq!(tap.id(), ProviderId::Tap);
        assert!(tap.is_configured());
        assert!(registry.get_by_name("stripe").is_none());

        let configured: Vec<ProviderId> = registry.configured().iter().map(|g| g.id()).collect();
        assert_eq!(configured, vec![ProviderId::Tap]);
    }

    #[test]
    fn test_capabilities_are_discoverable() {
        let registry = registry(&GatewaysConfig::default());
        for gateway in registry.iter() {
            assert!(gateway.as_webhooks().is_some(), "{}", gateway.name());
        }
        assert!(registry.get(ProviderId::Paymob).unwrap().as_refunds().is_some());
        assert!(registry.get(ProviderId::EasyKash).unwrap().as_refunds().is_none());
        assert!(registry.get(ProviderId::Tap).unwrap().as_tokenization().is_none());
    }
}
