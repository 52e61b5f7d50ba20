//! Paymob intention creation and verification
//!
//! Builds the unified-checkout intention (items, integration ids, billing),
//! forces the settlement currency, and reads transactions back.

use super::client::PaymobClient;
use crate::config::PaymobConfig;
use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::codes;
use crate::payments::currency::{convert_to_settlement, Conversion, ExchangeRates};
use crate::payments::http::is_path_id;
use crate::payments::reference::CorrelationReference;
use crate::payments::types::{split_full_name, Metadata, PaymentIntent, PaymentResult};
use crate::payments::webhook::{field_string, lookup};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_ITEM_NAME: &str = "Subscription";

/// Billing fields Paymob requires even when the customer gave none
pub(crate) fn build_billing_data(
    overrides: &Metadata,
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
) -> Metadata {
    let mut billing = Metadata::new();
    for (key, value) in [
        ("first_name", "N/A"),
        ("last_name", "N/A"),
        ("email", "na@na.com"),
        ("phone_number", "NA"),
        ("country", "SA"),
        ("city", "NA"),
        ("street", "NA"),
        ("building", "NA"),
        ("floor", "NA"),
        ("apartment", "NA"),
    ] {
        billing.insert(key.to_string(), Value::from(value));
    }
    billing.extend(overrides.clone());

    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        let (first, last) = split_full_name(name);
        billing.insert("first_name".to_string(), Value::from(first));
        billing.insert("last_name".to_string(), Value::from(last));
    }
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        billing.insert("email".to_string(), Value::from(email));
    }
    if let Some(phone) = phone.filter(|p| !p.is_empty()) {
        billing.insert("phone_number".to_string(), Value::from(phone));
    }
    billing
}

/// Failed result for a transaction body whose success flag is not true
pub(crate) fn declined(transaction_id: &str, txn: Value) -> PaymentResult {
    let code = lookup(&txn, "data.txn_response_code")
        .map(field_string)
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| codes::DECLINED.to_string());
    let message = lookup(&txn, "data.message")
        .map(field_string)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "Payment was declined".to_string());

    PaymentResult::failed(code, message)
        .with_localized_message(codes::localized_message(codes::DECLINED))
        .with_transaction_id(transaction_id)
        .with_raw(txn)
}

pub struct PaymobProcessor {
    client: Arc<PaymobClient>,
    config: Arc<PaymobConfig>,
    rates: Arc<dyn ExchangeRates>,
}

impl PaymobProcessor {
    pub fn new(
        client: Arc<PaymobClient>,
        config: Arc<PaymobConfig>,
        rates: Arc<dyn ExchangeRates>,
    ) -> Self {
        Self {
            client,
            config,
            rates,
        }
    }

    /// Express the intent amount in the settlement currency
    pub fn convert(&self, intent: &PaymentIntent) -> AppResult<Conversion> {
        let conversion = convert_to_settlement(
            intent.amount_in_cents,
            &intent.currency,
            &self.config.settlement_currency,
            self.rates.as_ref(),
        )?;

        if let Some(rate) = conversion.exchange_rate {
            info!(
                payment_id = ?intent.payment_id,
                original_amount_cents = conversion.original_amount_in_cents,
                original_currency = %conversion.original_currency,
                charged_amount_cents = conversion.amount_in_cents,
                charged_currency = %conversion.currency,
                exchange_rate = %rate,
                "Paymob currency conversion applied"
            );
        }
        Ok(conversion)
    }

    /// Integration ids for a payment method; unset (zero) ids are dropped
    pub fn integration_ids(&self, method: &str) -> Vec<u64> {
        let ids = &self.config.integration_ids;
        let candidates = match method {
            "wallet" => vec![ids.wallet],
            "apple_pay" => vec![ids.apple_pay],
            "bank_installments" => vec![ids.installments],
            "all" => vec![ids.card, ids.wallet, ids.apple_pay],
            _ => vec![ids.card],
        };
        candidates.into_iter().filter(|id| *id != 0).collect()
    }

    /// Order lines in the settlement currency; a single line for the whole
    /// amount when the intent has none
    pub fn build_items(&self, intent: &PaymentIntent, conversion: &Conversion) -> AppResult<Vec<Value>> {
        if intent.items.is_empty() {
            return Ok(vec![json!({
                "name": intent.description.as_deref().unwrap_or(DEFAULT_ITEM_NAME),
                "amount": conversion.amount_in_cents,
                "quantity": 1,
            })]);
        }

        intent
            .items
            .iter()
            .map(|item| {
                let amount = match item.amount {
                    Some(amount) => conversion.apply(amount).ok_or_else(|| {
                        AppError::new(ValidationError::UnsupportedConversion {
                            from: conversion.original_currency.clone(),
                            to: conversion.currency.clone(),
                        })
                    })?,
                    None => conversion.amount_in_cents,
                };
                let name = if item.name.is_empty() {
                    DEFAULT_ITEM_NAME
                } else {
                    item.name.as_str()
                };
                Ok(json!({
                    "name": name,
                    "amount": amount,
                    "quantity": item.quantity.max(1),
                }))
            })
            .collect()
    }

    pub fn intention_body(
        &self,
        intent: &PaymentIntent,
        conversion: &Conversion,
        reference: &CorrelationReference,
        integration_ids: &[u64],
    ) -> AppResult<Value> {
        let billing = build_billing_data(
            &intent.billing_data,
            intent.customer_name.as_deref(),
            intent.customer_email.as_deref(),
            intent.customer_phone.as_deref(),
        );

        let mut body = json!({
            "amount": conversion.amount_in_cents,
            "currency": conversion.currency,
            "payment_methods": integration_ids,
            "items": self.build_items(intent, conversion)?,
            "billing_data": billing,
            "extras": {
                "payment_id": intent.payment_id,
                "academy_id": intent.academy_id,
                "save_card": intent.save_card,
            },
            "special_reference": reference.to_string(),
        });

        if intent.save_card {
            body["save_card"] = Value::Bool(true);
        }
        if let Some(url) = &intent.success_url {
            body["redirection_url"] = Value::from(url.as_str());
        }
        if let Some(url) = &intent.webhook_url {
            body["notification_url"] = Value::from(url.as_str());
        }
        Ok(body)
    }

    /// Iframe URL, only when a public key is configured
    pub fn iframe_url(&self, client_secret: &str) -> Option<String> {
        (!self.config.public_key.is_empty())
            .then(|| self.client.checkout_url(&self.config.public_key, client_secret))
    }

    /// Create a unified-checkout intention for an already converted amount
    pub async fn create_intention(&self, intent: &PaymentIntent, conversion: &Conversion) -> PaymentResult {
        let integration_ids = self.integration_ids(&intent.payment_method);
        if integration_ids.is_empty() {
            error!(
                payment_method = %intent.payment_method,
                "Paymob: no valid integration id configured"
            );
            return PaymentResult::failed(
                codes::NO_INTEGRATION_ID,
                format!(
                    "No valid Paymob integration ID configured for payment method: {}",
                    intent.payment_method
                ),
            );
        }

        let reference = CorrelationReference::new(intent.academy_id, intent.payment_id);
        let body = match self.intention_body(intent, conversion, &reference, &integration_ids) {
            Ok(body) => body,
            Err(e) => return PaymentResult::failed(codes::CURRENCY_CONVERSION_FAILED, e.to_string()),
        };

        let response = self.client.post_with_secret("/v1/intention/", &body).await;
        if !response.success {
            error!(
                intent = %intent.safe_log_fields(),
                "Paymob intention failed: {}",
                response.error_message("")
            );
            return PaymentResult::failed(
                codes::INTENTION_FAILED,
                response.error_message("Failed to create payment intention"),
            )
            .with_raw(response.body());
        }

        let data = response.data;
        let client_secret = data
            .get("client_secret")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if client_secret.is_empty() {
            return PaymentResult::failed(
                codes::INTENTION_FAILED,
                "Paymob did not return a client secret",
            )
            .with_raw(data);
        }

        let intention_id = data.get("id").map(field_string).unwrap_or_default();
        let payment_keys = data
            .get("payment_keys")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let iframe_url = self.iframe_url(&client_secret);

        info!(
            intention_id = %intention_id,
            has_iframe_url = iframe_url.is_some(),
            "Paymob intention created"
        );

        PaymentResult::pending(intention_id.clone())
            .with_iframe(iframe_url, client_secret, payment_keys)
            .with_raw(data)
            .with_metadata("intention_id", intention_id)
            .with_metadata("merchant_order_id", reference.to_string())
            .with_metadata("save_card_requested", intent.save_card)
            .extend_metadata(conversion.metadata())
    }

    /// Read a transaction back and map its success flag
    pub async fn verify(&self, transaction_id: &str) -> PaymentResult {
        if !is_path_id(transaction_id) {
            return PaymentResult::failed(codes::INVALID_ARGUMENT, "Invalid Paymob transaction id")
                .with_transaction_id(transaction_id);
        }

        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => {
                return PaymentResult::failed(
                    codes::AUTH_FAILED,
                    format!("Failed to authenticate with Paymob: {}", e),
                )
                .with_transaction_id(transaction_id)
            }
        };

        let response = self.client.transaction(transaction_id, &token).await;
        if !response.success {
            return PaymentResult::failed(
                codes::VERIFICATION_FAILED,
                response.error_message("Failed to verify payment"),
            )
            .with_transaction_id(transaction_id)
            .with_raw(response.body());
        }

        transaction_result(transaction_id, response.data)
    }
}

/// Map a Paymob transaction body onto a result
pub(crate) fn transaction_result(transaction_id: &str, txn: Value) -> PaymentResult {
    if txn.get("success").and_then(Value::as_bool) != Some(true) {
        return declined(transaction_id, txn);
    }

    let order_id = lookup(&txn, "order.id")
        .or_else(|| txn.get("order"))
        .filter(|order| !order.is_object())
        .map(field_string)
        .unwrap_or_default();

    let mut result = PaymentResult::success(transaction_id)
        .with_gateway_order_id(order_id)
        .with_metadata("amount_cents", txn.get("amount_cents").cloned().unwrap_or(Value::Null))
        .with_metadata("currency", txn.get("currency").cloned().unwrap_or(Value::Null))
        .with_metadata(
            "source_type",
            lookup(&txn, "source_data.type")
                .map(field_string)
                .unwrap_or_else(|| "card".to_string()),
        );

    let token = lookup(&txn, "source_data.token")
        .map(field_string)
        .filter(|token| !token.is_empty());
    if let Some(token) = token {
        let pan = lookup(&txn, "source_data.pan").map(field_string).unwrap_or_default();
        result = result
            .with_metadata("card_token", token)
            .with_metadata(
                "card_brand",
                lookup(&txn, "source_data.sub_type").cloned().unwrap_or(Value::Null),
            )
            .with_metadata("card_last_four", last_four(&pan));
    }

    result.with_raw(txn)
}

pub(crate) fn last_four(pan: &str) -> Value {
    let digits: String = pan.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        Value::Null
    } else {
        Value::from(&digits[digits.len().saturating_sub(4)..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, IntegrationIds};
    use crate::payments::currency::StaticExchangeRates;
    use crate::payments::http::GatewayHttp;
    use crate::payments::test_support::MockTransport;
    use crate::payments::types::PaymentItem;
    use rust_decimal::Decimal;

    fn config() -> PaymobConfig {
        PaymobConfig {
            api_key: "api".to_string(),
            secret_key: "sk".to_string(),
            public_key: "pk".to_string(),
            integration_ids: IntegrationIds {
                card: 11,
                wallet: 22,
                apple_pay: 0,
                installments: 0,
            },
            ..PaymobConfig::default()
        }
    }

    fn processor_with(transport: Arc<MockTransport>, config: PaymobConfig) -> PaymobProcessor {
        let http = GatewayHttp::new(
            "Paymob",
            "https://accept.paymob.com",
            transport,
            &HttpConfig {
                retry_backoff_ms: 0,
                ..HttpConfig::default()
            },
        );
        let client = Arc::new(PaymobClient::new(http, &config));
        let rates = StaticExchangeRates::new().with_rate("USD", "EGP", Decimal::new(49, 0));
        PaymobProcessor::new(client, Arc::new(config), Arc::new(rates))
    }

    fn processor(transport: Arc<MockTransport>) -> PaymobProcessor {
        processor_with(transport, config())
    }

    #[test]
    fn test_integration_ids_drop_zeros() {
        let processor = processor(Arc::new(MockTransport::new()));
        assert_eq!(processor.integration_ids("card"), vec![11]);
        assert_eq!(processor.integration_ids("all"), vec![11, 22]);
        assert_eq!(processor.integration_ids("apple_pay"), Vec::<u64>::new());
        assert_eq!(processor.integration_ids("unknown"), vec![11]);
    }

    #[test]
    fn test_billing_placeholders_and_overrides() {
        let mut overrides = Metadata::new();
        overrides.insert("city".to_string(), Value::from("Giza"));
        let billing = build_billing_data(&overrides, Some("Sara Ahmed Ali"), None, Some("+20100"));
        assert_eq!(billing["first_name"], "Sara");
        assert_eq!(billing["last_name"], "Ahmed Ali");
        assert_eq!(billing["email"], "na@na.com");
        assert_eq!(billing["phone_number"], "+20100");
        assert_eq!(billing["city"], "Giza");
        assert_eq!(billing["floor"], "NA");
    }

    #[test]
    fn test_items_are_converted_individually() {
        let processor = processor(Arc::new(MockTransport::new()));
        let intent = PaymentIntent::new(10_000, "USD", 1)
            .with_item(PaymentItem::new("Course", 6_000, 1))
            .with_item(PaymentItem {
                name: String::new(),
                amount: None,
                quantity: 0,
            });
        let conversion = processor.convert(&intent).unwrap();
        let items = processor.build_items(&intent, &conversion).unwrap();
        assert_eq!(items[0]["amount"], 294_000);
        assert_eq!(items[1]["amount"], 490_000);
        assert_eq!(items[1]["name"], DEFAULT_ITEM_NAME);
        assert_eq!(items[1]["quantity"], 1);
    }

    #[test]
    fn test_intention_body_carries_reference_and_urls() {
        let processor = processor(Arc::new(MockTransport::new()));
        let intent = PaymentIntent::new(5_000, "EGP", 4)
            .with_payment_id(9)
            .with_description("Monthly plan")
            .with_urls(Some("https://app.test/return"), Some("https://app.test/hook"))
            .saving_card();
        let conversion = processor.convert(&intent).unwrap();
        let reference = CorrelationReference::new(4, Some(9));
        let body = processor
            .intention_body(&intent, &conversion, &reference, &[11])
            .unwrap();
        assert_eq!(body["amount"], 5_000);
        assert_eq!(body["currency"], "EGP");
        assert_eq!(body["payment_methods"], json!([11]));
        assert_eq!(body["items"][0]["name"], "Monthly plan");
        assert_eq!(body["special_reference"], reference.to_string());
        assert_eq!(body["save_card"], true);
        assert_eq!(body["redirection_url"], "https://app.test/return");
        assert_eq!(body["notification_url"], "https://app.test/hook");
        assert_eq!(body["extras"]["payment_id"], 9);
    }

    #[tokio::test]
    async fn test_create_intention_returns_iframe() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            201,
            json!({"id": "pi_1", "client_secret": "egy_csk", "payment_keys": [{"key": "k"}]}),
        );
        let processor = processor(transport.clone());
        let intent = PaymentIntent::new(10_000, "USD", 2).with_payment_id(5);
        let conversion = processor.convert(&intent).unwrap();

        let result = processor.create_intention(&intent, &conversion).await;
        assert!(result.is_pending());
        assert_eq!(result.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(result.client_secret(), Some("egy_csk"));
        assert_eq!(
            result.iframe_url(),
            Some("https://accept.paymob.com/unifiedcheckout/?publicKey=pk&clientSecret=egy_csk")
        );
        assert_eq!(result.metadata["original_currency"], "USD");
        assert_eq!(result.metadata["charged_amount_cents"], 490_000);

        let request = &transport.requests()[0];
        assert_eq!(request.headers["authorization"], "Token sk");
        assert!(request.url.ends_with("/v1/intention/"));
    }

    #[tokio::test]
    async fn test_missing_integration_id() {
        let transport = Arc::new(MockTransport::new());
        let processor = processor(transport.clone());
        let intent = PaymentIntent::new(1_000, "EGP", 1).with_method("apple_pay");
        let conversion = processor.convert(&intent).unwrap();

        let result = processor.create_intention(&intent, &conversion).await;
        assert_eq!(result.error_code.as_deref(), Some(codes::NO_INTEGRATION_ID));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_intention_http_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(400, json!({"detail": "amount mismatch"}));
        let processor = processor(transport);
        let intent = PaymentIntent::new(1_000, "EGP", 1);
        let conversion = processor.convert(&intent).unwrap();

        let result = processor.create_intention(&intent, &conversion).await;
        assert_eq!(result.error_code.as_deref(), Some(codes::INTENTION_FAILED));
        assert_eq!(result.error_message.as_deref(), Some("amount mismatch"));
    }

    #[tokio::test]
    async fn test_verify_success_sets_order_id() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(201, json!({"token": "auth"}));
        transport.push_json(
            200,
            json!({
                "id": 321,
                "success": true,
                "amount_cents": 5000,
                "currency": "EGP",
                "order": {"id": 777},
                "source_data": {"type": "card", "sub_type": "MasterCard", "pan": "2346", "token": "card_tok"}
            }),
        );
        let result = processor(transport.clone()).verify("321").await;
        assert!(result.is_successful());
        assert_eq!(result.gateway_order_id.as_deref(), Some("777"));
        assert_eq!(result.metadata["card_token"], "card_tok");
        assert_eq!(result.metadata["card_last_four"], "2346");
        assert_eq!(
            transport.requests()[1].headers["authorization"],
            "Bearer auth"
        );
    }

    #[tokio::test]
    async fn test_verify_declined_uses_response_code() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(201, json!({"token": "auth"}));
        transport.push_json(
            200,
            json!({"id": 9, "success": false, "data": {"txn_response_code": "INSUFFICIENT_FUNDS", "message": "no money"}}),
        );
        let result = processor(transport).verify("9").await;
        assert!(result.is_failed());
        assert_eq!(result.error_code.as_deref(), Some("INSUFFICIENT_FUNDS"));
        assert_eq!(result.error_message.as_deref(), Some("no money"));
    }

    #[tokio::test]
    async fn test_verify_rejects_path_like_ids() {
        let transport = Arc::new(MockTransport::new());
        for id in ["1/../2", "9?x=1", ""] {
            let result = processor(transport.clone()).verify(id).await;
            assert_eq!(result.error_code.as_deref(), Some(codes::INVALID_ARGUMENT), "{id}");
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_verify_auth_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(403, json!({"detail": "forbidden"}));
        let result = processor(transport).verify("9").await;
        assert_eq!(result.error_code.as_deref(), Some(codes::AUTH_FAILED));
        assert_eq!(result.transaction_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_declined_without_code() {
        let result = declined("1", json!({"success": false}));
        assert_eq!(result.error_code.as_deref(), Some(codes::DECLINED));
    }
}
