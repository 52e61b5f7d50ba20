//! Gateway configuration
//!
//! Every provider gets an immutable configuration snapshot built once at
//! startup. Values come from an optional file plus `PAYMENTS__*` environment
//! variables, e.g. `PAYMENTS__PAYMOB__SECRET_KEY` or
//! `PAYMENTS__EXCHANGE_RATES__USD_EGP=48.5`.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Read-only view over a provider configuration used by the shared gateway
/// helpers (credential presence checks, base URL resolution).
pub trait GatewaySettings {
    /// Look up a credential or option by its configuration key
    fn value(&self, key: &str) -> Option<&str>;
    /// Explicit sandbox flag, `None` when unset
    fn sandbox(&self) -> Option<bool>;
    fn base_url(&self) -> &str;
    fn sandbox_url(&self) -> &str;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewaysConfig {
    pub paymob: PaymobConfig,
    pub easykash: EasyKashConfig,
    pub tap: TapConfig,
    pub http: HttpConfig,
    /// Conversion table keyed `<from>_<to>` (case-insensitive), value = units
    /// of `to` per unit of `from`
    pub exchange_rates: HashMap<String, Decimal>,
}

impl GatewaysConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PAYMENTS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("easykash.payment_options"),
            )
            .build()?;

        let config: GatewaysConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.http.timeout_secs == 0 {
            return Err(AppError::configuration(
                "http.timeout_secs must be greater than 0",
            ));
        }
        if self.http.max_read_attempts == 0 {
            return Err(AppError::configuration(
                "http.max_read_attempts must be at least 1",
            ));
        }

        let urls = [
            ("paymob.base_url", &self.paymob.base_url),
            ("paymob.sandbox_url", &self.paymob.sandbox_url),
            ("easykash.base_url", &self.easykash.base_url),
            ("easykash.sandbox_url", &self.easykash.sandbox_url),
            ("tap.base_url", &self.tap.base_url),
            ("tap.sandbox_url", &self.tap.sandbox_url),
        ];
        for (key, url) in urls {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(AppError::configuration(format!(
                    "{} must be an http(s) URL, got '{}'",
                    key, url
                )));
            }
        }

        for (pair, rate) in &self.exchange_rates {
            if parse_rate_key(pair).is_none() {
                return Err(AppError::configuration(format!(
                    "exchange rate key '{}' must look like USD_EGP",
                    pair
                )));
            }
            if *rate <= Decimal::ZERO {
                return Err(AppError::configuration(format!(
                    "exchange rate {} must be positive, got {}",
                    pair, rate
                )));
            }
        }

        if self.tap.default_country_code.is_empty()
            || !self.tap.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AppError::configuration(
                "tap.default_country_code must be numeric",
            ));
        }

        Ok(())
    }
}

/// Split a `USD_EGP` style key into upper-cased currency codes
pub fn parse_rate_key(key: &str) -> Option<(String, String)> {
    let (from, to) = key.split_once('_')?;
    if from.len() != 3 || to.len() != 3 {
        return None;
    }
    Some((from.to_ascii_uppercase(), to.to_ascii_uppercase()))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Attempts for idempotent reads; writes are always attempted once
    pub max_read_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_read_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Paymob integration ids per payment method
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntegrationIds {
    pub card: u64,
    pub wallet: u64,
    pub apple_pay: u64,
    pub installments: u64,
}

/// Billing values used when a hosted card-capture session has no customer data
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackBilling {
    pub email: String,
    pub phone: String,
    pub country: String,
    pub city: String,
}

impl Default for FallbackBilling {
    fn default() -> Self {
        Self {
            email: "noreply@itqanway.com".to_string(),
            phone: "+201000000000".to_string(),
            country: "EGY".to_string(),
            city: "Cairo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymobConfig {
    pub sandbox: Option<bool>,
    pub base_url: String,
    pub sandbox_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub public_key: String,
    /// Secret for transaction callback HMACs, distinct from the API secret
    pub hmac_secret: String,
    pub integration_ids: IntegrationIds,
    /// The only currency Paymob Egypt settles in
    pub settlement_currency: String,
    pub tokenization_enabled: bool,
    pub payment_key_expiration_secs: u64,
    pub fallback_billing: FallbackBilling,
}

impl Default for PaymobConfig {
    fn default() -> Self {
        Self {
            sandbox: None,
            base_url: "https://accept.paymob.com".to_string(),
            sandbox_url: "https://accept.paymob.com".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            public_key: String::new(),
            hmac_secret: String::new(),
            integration_ids: IntegrationIds::default(),
            settlement_currency: "EGP".to_string(),
            tokenization_enabled: true,
            payment_key_expiration_secs: 3600,
            fallback_billing: FallbackBilling::default(),
        }
    }
}

impl GatewaySettings for PaymobConfig {
    fn value(&self, key: &str) -> Option<&str> {
        match key {
            "api_key" => Some(self.api_key.as_str()),
            "secret_key" => Some(self.secret_key.as_str()),
            "public_key" => Some(self.public_key.as_str()),
            "hmac_secret" => Some(self.hmac_secret.as_str()),
            _ => None,
        }
    }

    fn sandbox(&self) -> Option<bool> {
        self.sandbox
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sandbox_url(&self) -> &str {
        &self.sandbox_url
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EasyKashConfig {
    pub sandbox: Option<bool>,
    pub base_url: String,
    pub sandbox_url: String,
    pub api_key: String,
    pub secret_key: String,
    /// Falls back to `secret_key` when empty
    pub webhook_secret: String,
    /// Explicit payment option codes; empty means "derive from the method"
    pub payment_options: Vec<u32>,
    /// Expiry for cash vouchers (Fawry/Aman), in hours
    pub cash_expiry_hours: u32,
}

impl Default for EasyKashConfig {
    fn default() -> Self {
        Self {
            sandbox: None,
            base_url: "https://back.easykash.net".to_string(),
            sandbox_url: "https://sandbox.easykash.net".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            payment_options: Vec::new(),
            cash_expiry_hours: 72,
        }
    }
}

impl GatewaySettings for EasyKashConfig {
    fn value(&self, key: &str) -> Option<&str> {
        match key {
            "api_key" => Some(self.api_key.as_str()),
            "secret_key" => Some(self.secret_key.as_str()),
            "webhook_secret" => Some(self.webhook_secret.as_str()),
            _ => None,
        }
    }

    fn sandbox(&self) -> Option<bool> {
        self.sandbox
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sandbox_url(&self) -> &str {
        &self.sandbox_url
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub sandbox: Option<bool>,
    pub base_url: String,
    pub sandbox_url: String,
    pub secret_key: String,
    pub public_key: String,
    /// Falls back to `secret_key` when empty
    pub webhook_secret: String,
    /// Dialing code assumed when a phone number carries no known prefix
    pub default_country_code: String,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            sandbox: None,
            base_url: "https://api.tap.company".to_string(),
            sandbox_url: "https://api.tap.company".to_string(),
            secret_key: String::new(),
            public_key: String::new(),
            webhook_secret: String::new(),
            default_country_code: "966".to_string(),
        }
    }
}

impl GatewaySettings for TapConfig {
    fn value(&self, key: &str) -> Option<&str> {
        match key {
            "secret_key" => Some(self.secret_key.as_str()),
            "public_key" => Some(self.public_key.as_str()),
            "webhook_secret" => Some(self.webhook_secret.as_str()),
            _ => None,
        }
    }

    fn sandbox(&self) -> Option<bool> {
        self.sandbox
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sandbox_url(&self) -> &str {
        &self.sandbox_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = GatewaysConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.paymob.settlement_currency, "EGP");
        assert_eq!(config.easykash.cash_expiry_hours, 72);
        assert_eq!(config.tap.default_country_code, "966");
        assert_eq!(config.http.max_read_attempts, 3);
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let mut config = GatewaysConfig::default();
        config
            .exchange_rates
            .insert("usd_egp".to_string(), Decimal::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_rate_key() {
        let mut config = GatewaysConfig::default();
        config
            .exchange_rates
            .insert("dollar-to-pound".to_string(), Decimal::new(49, 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_rate_key() {
        assert_eq!(
            parse_rate_key("sar_egp"),
            Some(("SAR".to_string(), "EGP".to_string()))
        );
        assert_eq!(parse_rate_key("SAREGP"), None);
    }

    #[test]
    fn test_rejects_bad_url() {
        let mut config = GatewaysConfig::default();
        config.tap.base_url = "api.tap.company".to_string();
        assert!(config.validate().is_err());
    }
}
