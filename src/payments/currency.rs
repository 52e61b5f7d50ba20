//! Minor/major unit arithmetic and settlement-currency conversion

use crate::config::parse_rate_key;
use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::types::Metadata;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::collections::HashMap;

/// Number of decimal places in the currency's minor unit
pub fn currency_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "KWD" | "BHD" | "OMR" | "JOD" | "IQD" | "LYD" | "TND" => 3,
        "JPY" | "KRW" | "VND" | "CLP" => 0,
        _ => 2,
    }
}

pub fn to_major_units(amount_in_minor: i64, currency: &str) -> Decimal {
    Decimal::new(amount_in_minor, currency_exponent(currency))
}

/// Round a major-unit amount half away from zero into minor units
pub fn to_minor_units(amount: Decimal, currency: &str) -> Option<i64> {
    let scale = Decimal::from(10_i64.pow(currency_exponent(currency)));
    amount
        .checked_mul(scale)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Source of exchange rates used when a provider settles in one currency only
pub trait ExchangeRates: Send + Sync {
    /// Units of `to` per one unit of `from`, `None` when unknown
    fn rate(&self, from: &str, to: &str) -> Option<Decimal>;
}

/// Fixed rate table, usually built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticExchangeRates {
    rates: HashMap<(String, String), Decimal>,
}

impl StaticExchangeRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `USD_EGP = 48.5` style entries; malformed keys are skipped
    pub fn from_config(entries: &HashMap<String, Decimal>) -> Self {
        let rates = entries
            .iter()
            .filter_map(|(key, rate)| parse_rate_key(key).map(|pair| (pair, *rate)))
            .collect();
        Self { rates }
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates
            .insert((from.to_ascii_uppercase(), to.to_ascii_uppercase()), rate);
        self
    }
}

impl ExchangeRates for StaticExchangeRates {
    fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to, from))
            .filter(|rate| !rate.is_zero())
            .map(|rate| Decimal::ONE / *rate)
    }
}

/// Amount actually charged plus what the caller originally asked for
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount_in_cents: i64,
    pub currency: String,
    pub original_amount_in_cents: i64,
    pub original_currency: String,
    /// `None` when no conversion was needed
    pub exchange_rate: Option<Decimal>,
}

impl Conversion {
    pub fn is_converted(&self) -> bool {
        self.exchange_rate.is_some()
    }

    /// Convert another minor-unit amount (e.g. a line item) at the same rate
    pub fn apply(&self, amount_in_cents: i64) -> Option<i64> {
        match self.exchange_rate {
            None => Some(amount_in_cents),
            Some(rate) => {
                let major = to_major_units(amount_in_cents, &self.original_currency).checked_mul(rate)?;
                to_minor_units(major, &self.currency)
            }
        }
    }

    /// Reconciliation fields recorded on the payment result
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(
            "original_amount_cents".to_string(),
            Value::from(self.original_amount_in_cents),
        );
        metadata.insert(
            "original_currency".to_string(),
            Value::from(self.original_currency.clone()),
        );
        metadata.insert(
            "charged_amount_cents".to_string(),
            Value::from(self.amount_in_cents),
        );
        metadata.insert(
            "charged_currency".to_string(),
            Value::from(self.currency.clone()),
        );
        metadata.insert(
            "exchange_rate".to_string(),
            self.exchange_rate
                .map(|rate| Value::from(rate.normalize().to_string()))
                .unwrap_or(Value::Null),
        );
        metadata
    }
}

/// Convert an amount into the provider's settlement currency
///
/// Amounts already in the settlement currency pass through with no rate.
pub fn convert_to_settlement(
    amount_in_cents: i64,
    currency: &str,
    settlement_currency: &str,
    rates: &dyn ExchangeRates,
) -> AppResult<Conversion> {
    let currency = currency.to_ascii_uppercase();
    let settlement = settlement_currency.to_ascii_uppercase();

    if currency == settlement {
        return Ok(Conversion {
            amount_in_cents,
            currency: settlement,
            original_amount_in_cents: amount_in_cents,
            original_currency: currency,
            exchange_rate: None,
        });
    }

    let unsupported = || {
        AppError::new(ValidationError::UnsupportedConversion {
            from: currency.clone(),
            to: settlement.clone(),
        })
    };

    let rate = rates
        .rate(&currency, &settlement)
        .filter(|rate| *rate > Decimal::ZERO)
        .ok_or_else(unsupported)?;

    let converted = to_major_units(amount_in_cents, &currency)
        .checked_mul(rate)
        .and_then(|major| to_minor_units(major, &settlement))
        .filter(|amount| *amount > 0)
        .ok_or_else(unsupported)?;

    Ok(Conversion {
        amount_in_cents: converted,
        currency: settlement,
        original_amount_in_cents: amount_in_cents,
        original_currency: currency,
        exchange_rate: Some(rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> StaticExchangeRates {
        StaticExchangeRates::new().with_rate("USD", "EGP", Decimal::new(49, 0))
    }

    #[test]
    fn test_settlement_currency_passes_through() {
        let conversion = convert_to_settlement(25_000, "egp", "EGP", &rates()).unwrap();
        assert_eq!(conversion.amount_in_cents, 25_000);
        assert_eq!(conversion.currency, "EGP");
        assert!(conversion.exchange_rate.is_none());
        assert!(!conversion.is_converted());
    }

    #[test]
    fn test_hundred_dollars_at_49() {
        let conversion = convert_to_settlement(10_000, "USD", "EGP", &rates()).unwrap();
        assert_eq!(conversion.amount_in_cents, 490_000);
        assert_eq!(conversion.exchange_rate, Some(Decimal::new(49, 0)));
        assert_eq!(conversion.original_amount_in_cents, 10_000);
        assert_eq!(conversion.original_currency, "USD");

        let metadata = conversion.metadata();
        assert_eq!(metadata["original_currency"], "USD");
        assert_eq!(metadata["exchange_rate"], "49");
    }

    #[test]
    fn test_inverse_rate_lookup() {
        let rates = StaticExchangeRates::new().with_rate("EGP", "SAR", Decimal::new(8, 2));
        let rate = rates.rate("SAR", "EGP").unwrap();
        assert_eq!(rate, Decimal::new(125, 1));
    }

    #[test]
    fn test_missing_rate_is_an_error() {
        assert!(convert_to_settlement(1_000, "GBP", "EGP", &rates()).is_err());
    }

    #[test]
    fn test_item_conversion_uses_same_rate() {
        let conversion = convert_to_settlement(10_000, "USD", "EGP", &rates()).unwrap();
        assert_eq!(conversion.apply(2_550), Some(124_950));
    }

    #[test]
    fn test_three_decimal_currencies() {
        assert_eq!(to_major_units(1_500, "KWD"), Decimal::new(1_500, 3));
        assert_eq!(to_minor_units(Decimal::new(15, 1), "KWD"), Some(1_500));
        assert_eq!(to_minor_units(Decimal::new(10_005, 3), "EGP"), Some(1_001));
    }

    #[test]
    fn test_out_of_range_amounts_are_none() {
        assert_eq!(to_minor_units(Decimal::MAX, "EGP"), None);
        assert_eq!(to_minor_units(Decimal::MAX, "KWD"), None);
        assert_eq!(to_minor_units(Decimal::from(i64::MAX), "EGP"), None);

        let huge = StaticExchangeRates::new().with_rate("USD", "EGP", Decimal::MAX);
        assert!(convert_to_settlement(i64::MAX, "USD", "EGP", &huge).is_err());
    }

    #[test]
    fn test_from_config_skips_bad_keys() {
        let mut entries = HashMap::new();
        entries.insert("usd_egp".to_string(), Decimal::new(49, 0));
        entries.insert("nonsense".to_string(), Decimal::ONE);
        let rates = StaticExchangeRates::from_config(&entries);
        assert_eq!(rates.rate("USD", "EGP"), Some(Decimal::new(49, 0)));
    }
}
