//! Paymob card tokenization and token charges
//!
//! Saved cards are charged through the legacy acceptance API: order, payment
//! key, then a pay call whose source is the stored token.

use super::client::PaymobClient;
use super::processor::{build_billing_data, declined, last_four, PaymobProcessor};
use crate::config::PaymobConfig;
use crate::payments::codes;
use crate::payments::reference::{tokenization_reference, CorrelationReference};
use crate::payments::traits::SavedPaymentMethod;
use crate::payments::types::{
    CardData, ChargeContext, PaymentResult, TokenizationOptions, TokenizationResult,
};
use crate::payments::webhook::field_string;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Amount of the hosted card-capture intention, in piasters
const TOKENIZATION_AMOUNT: i64 = 100;

/// Card brand from the leading digits of a (masked) PAN
pub fn detect_card_brand(masked_pan: &str) -> Option<&'static str> {
    let pan = masked_pan.trim();
    let first_two = pan.get(..2).unwrap_or("");
    if pan.starts_with('4') {
        Some("visa")
    } else if matches!(first_two, "51" | "52" | "53" | "54" | "55") {
        Some("mastercard")
    } else if first_two == "50" || pan.starts_with("507") {
        Some("meeza")
    } else if matches!(first_two, "34" | "37") {
        Some("amex")
    } else {
        None
    }
}

pub struct PaymobTokenization {
    client: Arc<PaymobClient>,
    processor: Arc<PaymobProcessor>,
    config: Arc<PaymobConfig>,
}

impl PaymobTokenization {
    pub fn new(
        client: Arc<PaymobClient>,
        processor: Arc<PaymobProcessor>,
        config: Arc<PaymobConfig>,
    ) -> Self {
        Self {
            client,
            processor,
            config,
        }
    }

    /// Enabled in config and both API credentials present
    pub fn supports_tokenization(&self) -> bool {
        self.config.tokenization_enabled
            && !self.config.api_key.trim().is_empty()
            && !self.config.secret_key.trim().is_empty()
    }

    pub fn min_recurring_interval(&self) -> Duration {
        Duration::zero()
    }

    /// Save-card intention for a token-only checkout session
    pub async fn create_session(&self, user_id: u64, options: &TokenizationOptions) -> PaymentResult {
        if !self.supports_tokenization() {
            return PaymentResult::failed(codes::TOKENIZATION_DISABLED, "Card tokenization is not enabled");
        }

        let integration_ids = self.processor.integration_ids("card");
        if integration_ids.is_empty() {
            error!(user_id, "Paymob: no card integration id configured for tokenization");
            return PaymentResult::failed(
                codes::NO_INTEGRATION_ID,
                "No valid Paymob integration ID configured for card tokenization",
            );
        }

        let fallback = &self.config.fallback_billing;
        let billing = json!({
            "first_name": options.first_name.as_deref().unwrap_or("User"),
            "last_name": options.last_name.clone().unwrap_or_else(|| user_id.to_string()),
            "email": options.email.as_deref().unwrap_or(&fallback.email),
            "phone_number": options.phone.as_deref().unwrap_or(&fallback.phone),
            "country": options.country.as_deref().unwrap_or(&fallback.country),
            "city": options.city.as_deref().unwrap_or(&fallback.city),
            "street": "NA",
            "building": "NA",
            "floor": "NA",
            "apartment": "NA",
        });

        let reference = tokenization_reference(user_id, Utc::now());
        let mut body = json!({
            "amount": TOKENIZATION_AMOUNT,
            "currency": "EGP",
            "payment_methods": integration_ids,
            "items": [{
                "name": "Card Tokenization",
                "amount": TOKENIZATION_AMOUNT,
                "quantity": 1,
            }],
            "billing_data": billing,
            "extras": {
                "user_id": user_id,
                "academy_id": options.academy_id,
                "tokenization_only": true,
            },
            "save_card": true,
            "special_reference": reference,
        });
        if let Some(url) = options.callback_url.as_deref().filter(|url| !url.is_empty()) {
            body["redirection_url"] = Value::from(url);
        }

        let response = self.client.post_with_secret("/v1/intention/", &body).await;
        if !response.success {
            error!(user_id, "Paymob tokenization session failed: {}", response.error_message(""));
            return PaymentResult::failed(
                codes::TOKENIZATION_FAILED,
                response.error_message("Failed to start card tokenization"),
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
                codes::TOKENIZATION_FAILED,
                "Paymob did not return a client secret",
            )
            .with_raw(data);
        }

        let intention_id = data.get("id").map(field_string).unwrap_or_default();
        PaymentResult::pending(intention_id.clone())
            .with_iframe(self.processor.iframe_url(&client_secret), client_secret, Vec::new())
            .with_metadata("intention_id", intention_id)
            .with_metadata("special_reference", reference)
            .with_metadata("tokenization_only", true)
            .with_raw(data)
    }

    /// Tokenize raw card fields: verification order, payment key, token
    pub async fn tokenize_card(&self, card: &CardData, user_id: u64) -> TokenizationResult {
        if !self.supports_tokenization() {
            return TokenizationResult::failed(
                codes::TOKENIZATION_DISABLED,
                "Card tokenization is not enabled",
            );
        }

        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => {
                return TokenizationResult::failed(
                    codes::AUTH_FAILED,
                    format!("Failed to authenticate with Paymob: {}", e),
                )
            }
        };

        let order = self
            .client
            .post_with_token(
                "/api/ecommerce/orders",
                &token,
                json!({
                    "delivery_needed": false,
                    "amount_cents": 0,
                    "currency": "EGP",
                    "items": [],
                }),
            )
            .await;
        let order_id = order.data.get("id").cloned().unwrap_or(Value::Null);
        if !order.success || order_id.is_null() {
            return TokenizationResult::failed(codes::ORDER_FAILED, "Failed to create verification order")
                .with_raw(order.body());
        }

        let key = self
            .client
            .post_with_token(
                "/api/acceptance/payment_keys",
                &token,
                json!({
                    "amount_cents": 0,
                    "expiration": self.config.payment_key_expiration_secs,
                    "order_id": order_id,
                    "billing_data": {
                        "first_name": card.holder_name,
                        "last_name": "N/A",
                        "email": card.email.as_deref().unwrap_or("na@na.com"),
                        "phone_number": card.phone.as_deref().unwrap_or("NA"),
                        "country": "EG",
                        "city": "NA",
                        "street": "NA",
                        "building": "NA",
                        "floor": "NA",
                        "apartment": "NA",
                    },
                    "currency": "EGP",
                    "integration_id": self.config.integration_ids.card,
                    "lock_order_when_paid": false,
                }),
            )
            .await;
        let payment_key = key
            .data
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !key.success || payment_key.is_empty() {
            return TokenizationResult::failed(codes::PAYMENT_KEY_FAILED, "Failed to get payment key")
                .with_raw(key.body());
        }

        let response = self
            .client
            .http()
            .execute(
                http::Method::POST,
                "/api/acceptance/tokens",
                Some(&json!({
                    "payment_token": payment_key,
                    "card_number": card.number,
                    "card_holdername": card.holder_name,
                    "card_expiry_mm": card.expiry_month,
                    "card_expiry_yy": card.expiry_year,
                    "card_cvn": card.cvv,
                })),
                &[],
            )
            .await;

        let data = response.data.clone();
        let card_token = data
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !response.success || card_token.is_empty() {
            return TokenizationResult::failed(
                codes::TOKENIZATION_FAILED,
                response.error_message("Failed to tokenize card"),
            )
            .with_raw(response.body());
        }

        let masked_pan = data
            .get("masked_pan")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let brand = data
            .get("card_subtype")
            .and_then(Value::as_str)
            .filter(|brand| !brand.is_empty())
            .map(str::to_ascii_lowercase)
            .or_else(|| detect_card_brand(masked_pan).map(str::to_string));

        info!(user_id, card_brand = ?brand, "Paymob card tokenized");

        let mut result = TokenizationResult::success(card_token);
        result.card_brand = brand;
        result.last_four = last_four(masked_pan).as_str().map(str::to_string);
        result.expiry_month = Some(card.expiry_month.clone());
        result.expiry_year = Some(card.expiry_year.clone());
        result.holder_name = Some(card.holder_name.clone()).filter(|name| !name.is_empty());
        result.with_raw(data)
    }

    /// Charge a stored token without customer interaction
    pub async fn charge_token(
        &self,
        card_token: &str,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult {
        if !self.supports_tokenization() {
            return PaymentResult::failed(codes::TOKENIZATION_DISABLED, "Card tokenization is not enabled");
        }

        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => {
                return PaymentResult::failed(
                    codes::AUTH_FAILED,
                    format!("Failed to authenticate with Paymob: {}", e),
                )
            }
        };

        let reference = CorrelationReference::new(context.academy_id.unwrap_or(0), context.payment_id);
        let order = self
            .client
            .post_with_token(
                "/api/ecommerce/orders",
                &token,
                json!({
                    "delivery_needed": false,
                    "amount_cents": amount_in_cents,
                    "currency": currency,
                    "merchant_order_id": reference.to_string(),
                    "items": [],
                }),
            )
            .await;
        let order_id = order.data.get("id").cloned().unwrap_or(Value::Null);
        if !order.success || order_id.is_null() {
            return PaymentResult::failed(codes::ORDER_FAILED, order.error_message("Failed to create order"))
                .with_raw(order.body());
        }

        let billing = build_billing_data(
            &context.billing_data,
            context.customer_name.as_deref(),
            context.customer_email.as_deref(),
            context.customer_phone.as_deref(),
        );
        let key = self
            .client
            .post_with_token(
                "/api/acceptance/payment_keys",
                &token,
                json!({
                    "amount_cents": amount_in_cents,
                    "expiration": self.config.payment_key_expiration_secs,
                    "order_id": order_id,
                    "billing_data": billing,
                    "currency": currency,
                    "integration_id": self.config.integration_ids.card,
                }),
            )
            .await;
        let payment_key = key
            .data
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !key.success || payment_key.is_empty() {
            return PaymentResult::failed(codes::PAYMENT_KEY_FAILED, "Failed to get payment key")
                .with_raw(key.body());
        }

        let pay = self
            .client
            .http()
            .execute(
                http::Method::POST,
                "/api/acceptance/payments/pay",
                Some(&json!({
                    "source": { "identifier": card_token, "subtype": "TOKEN" },
                    "payment_token": payment_key,
                })),
                &[],
            )
            .await;
        if !pay.success {
            return PaymentResult::failed(codes::PAYMENT_FAILED, pay.error_message("Payment failed"))
                .with_raw(pay.body());
        }

        let txn = pay.data;
        let transaction_id = txn.get("id").map(field_string).unwrap_or_default();
        if txn.get("success").and_then(Value::as_bool) != Some(true) {
            return declined(&transaction_id, txn);
        }

        info!(
            transaction_id = %transaction_id,
            payment_id = ?context.payment_id,
            "Paymob token charge succeeded"
        );

        PaymentResult::success(transaction_id)
            .with_gateway_order_id(field_string(&order_id))
            .with_metadata("amount_cents", amount_in_cents)
            .with_metadata("currency", currency)
            .with_metadata("is_token_payment", true)
            .with_metadata("merchant_order_id", reference.to_string())
            .with_raw(txn)
    }

    pub async fn charge_saved_method(
        &self,
        method: &mut dyn SavedPaymentMethod,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult {
        if !self.supports_tokenization() {
            return PaymentResult::failed(codes::TOKENIZATION_DISABLED, "Card tokenization is not enabled");
        }
        if !method.is_usable() {
            return PaymentResult::failed(codes::PAYMENT_METHOD_UNUSABLE, "Payment method is not usable");
        }

        let mut context = context.clone();
        if context.customer_name.is_none() {
            context.customer_name = method.holder_name().map(str::to_string);
        }
        if context.billing_data.is_empty() {
            context.billing_data = method.billing_address();
        }

        let token = method.token().to_string();
        let result = self
            .charge_token(&token, amount_in_cents, currency, &context)
            .await;
        if result.is_successful() {
            method.touch_last_used();
        }
        result
    }

    /// Paymob has no token deletion endpoint; removal is local only
    pub async fn delete_token(&self, token: &str) -> bool {
        let prefix: String = token.chars().take(10).collect();
        info!(token_prefix = %prefix, "Paymob token deletion acknowledged locally");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, IntegrationIds};
    use crate::payments::currency::StaticExchangeRates;
    use crate::payments::http::GatewayHttp;
    use crate::payments::test_support::MockTransport;

    struct StoredCard {
        usable: bool,
        touched: u32,
    }

    impl SavedPaymentMethod for StoredCard {
        fn token(&self) -> &str {
            "card_tok"
        }

        fn holder_name(&self) -> Option<&str> {
            Some("Omar Khaled")
        }

        fn is_usable(&self) -> bool {
            self.usable
        }

        fn touch_last_used(&mut self) {
            self.touched += 1;
        }
    }

    fn config() -> PaymobConfig {
        PaymobConfig {
            api_key: "api".to_string(),
            secret_key: "sk".to_string(),
            public_key: "pk".to_string(),
            integration_ids: IntegrationIds {
                card: 11,
                ..IntegrationIds::default()
            },
            ..PaymobConfig::default()
        }
    }

    fn service(transport: Arc<MockTransport>) -> PaymobTokenization {
        service_with(config(), transport)
    }

    fn service_with(config: PaymobConfig, transport: Arc<MockTransport>) -> PaymobTokenization {
        let config = Arc::new(config);
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
        let processor = Arc::new(PaymobProcessor::new(
            client.clone(),
            config.clone(),
            Arc::new(StaticExchangeRates::new()),
        ));
        PaymobTokenization::new(client, processor, config)
    }

    fn push_charge_flow(transport: &MockTransport, success: bool) {
        transport.push_json(201, json!({"token": "auth"}));
        transport.push_json(201, json!({"id": 8080}));
        transport.push_json(201, json!({"token": "pay_key"}));
        transport.push_json(200, json!({"id": 999, "success": success}));
    }

    #[test]
    fn test_detect_card_brand() {
        assert_eq!(detect_card_brand("4111xxxxxxxx1111"), Some("visa"));
        assert_eq!(detect_card_brand("5312xxxxxxxx2346"), Some("mastercard"));
        assert_eq!(detect_card_brand("5078xxxxxxxx0001"), Some("meeza"));
        assert_eq!(detect_card_brand("3714xxxxxxxx0005"), Some("amex"));
        assert_eq!(detect_card_brand("6011xxxxxxxx0000"), None);
        assert_eq!(detect_card_brand(""), None);
    }

    #[tokio::test]
    async fn test_session_uses_fixed_amount_and_reference() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(201, json!({"id": "pi_tok", "client_secret": "cs_tok"}));

        let result = service(transport.clone())
            .create_session(77, &TokenizationOptions::default())
            .await;
        assert!(result.is_pending());
        assert_eq!(result.client_secret(), Some("cs_tok"));

        let body = transport.last_body();
        assert_eq!(body["amount"], 100);
        assert_eq!(body["currency"], "EGP");
        assert_eq!(body["save_card"], true);
        assert_eq!(body["billing_data"]["last_name"], "77");
        assert_eq!(body["billing_data"]["city"], "Cairo");
        assert!(body["special_reference"].as_str().unwrap().starts_with("TOKEN-77-"));
        assert_eq!(body["payment_methods"], json!([11]));
    }

    #[tokio::test]
    async fn test_session_requires_card_integration_id() {
        let transport = Arc::new(MockTransport::new());
        let config = PaymobConfig {
            integration_ids: IntegrationIds::default(),
            ..config()
        };

        let result = service_with(config, transport.clone())
            .create_session(77, &TokenizationOptions::default())
            .await;
        assert_eq!(result.error_code.as_deref(), Some(codes::NO_INTEGRATION_ID));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_tokenization_blocks_every_charge_path() {
        let transport = Arc::new(MockTransport::new());
        let service = service_with(
            PaymobConfig {
                tokenization_enabled: false,
                ..config()
            },
            transport.clone(),
        );

        let charged = service
            .charge_token("card_tok", 5_000, "EGP", &ChargeContext::default())
            .await;
        assert_eq!(charged.error_code.as_deref(), Some(codes::TOKENIZATION_DISABLED));

        let mut card = StoredCard {
            usable: true,
            touched: 0,
        };
        let saved = service
            .charge_saved_method(&mut card, 5_000, "EGP", &ChargeContext::default())
            .await;
        assert_eq!(saved.error_code.as_deref(), Some(codes::TOKENIZATION_DISABLED));
        assert_eq!(card.touched, 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_tokenize_card() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(201, json!({"token": "auth"}));
        transport.push_json(201, json!({"id": 1}));
        transport.push_json(201, json!({"token": "pay_key"}));
        transport.push_json(201, json!({"token": "card_tok", "masked_pan": "xxxx-xxxx-xxxx-2346", "card_subtype": "MasterCard"}));

        let card = CardData {
            number: "5123456789012346".to_string(),
            holder_name: "Test User".to_string(),
            expiry_month: "12".to_string(),
            expiry_year: "30".to_string(),
            cvv: "123".to_string(),
            email: None,
            phone: None,
        };
        let result = service(transport.clone()).tokenize_card(&card, 5).await;
        assert!(result.success);
        assert_eq!(result.token.as_deref(), Some("card_tok"));
        assert_eq!(result.card_brand.as_deref(), Some("mastercard"));
        assert_eq!(result.last_four.as_deref(), Some("2346"));
        assert_eq!(transport.requests()[1].body.as_ref().unwrap()["amount_cents"], 0);
    }

    #[tokio::test]
    async fn test_charge_token_uses_token_source() {
        let transport = Arc::new(MockTransport::new());
        push_charge_flow(&transport, true);

        let result = service(transport.clone())
            .charge_token("card_tok", 5_000, "EGP", &ChargeContext::default())
            .await;
        assert!(result.is_successful());
        assert_eq!(result.transaction_id.as_deref(), Some("999"));
        assert_eq!(result.gateway_order_id.as_deref(), Some("8080"));

        let pay = transport.last_body();
        assert_eq!(pay["source"]["identifier"], "card_tok");
        assert_eq!(pay["source"]["subtype"], "TOKEN");
        assert_eq!(pay["payment_token"], "pay_key");
    }

    #[tokio::test]
    async fn test_unusable_method_fails_fast() {
        let transport = Arc::new(MockTransport::new());
        let mut card = StoredCard {
            usable: false,
            touched: 0,
        };
        let result = service(transport.clone())
            .charge_saved_method(&mut card, 5_000, "EGP", &ChargeContext::default())
            .await;
        assert_eq!(result.error_code.as_deref(), Some(codes::PAYMENT_METHOD_UNUSABLE));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(card.touched, 0);
    }

    #[tokio::test]
    async fn test_saved_method_touched_only_on_success() {
        let transport = Arc::new(MockTransport::new());
        push_charge_flow(&transport, false);
        push_charge_flow(&transport, true);
        let service = service(transport.clone());
        let mut card = StoredCard {
            usable: true,
            touched: 0,
        };

        let declined = service
            .charge_saved_method(&mut card, 5_000, "EGP", &ChargeContext::default())
            .await;
        assert!(declined.is_failed());
        assert_eq!(card.touched, 0);

        let paid = service
            .charge_saved_method(&mut card, 5_000, "EGP", &ChargeContext::default())
            .await;
        assert!(paid.is_successful());
        assert_eq!(card.touched, 1);

        let key_request = &transport.requests()[6];
        assert_eq!(
            key_request.body.as_ref().unwrap()["billing_data"]["first_name"],
            "Omar"
        );
    }

    #[test]
    fn test_tokenization_requires_credentials() {
        let transport = Arc::new(MockTransport::new());
        let service = service(transport);
        assert!(service.supports_tokenization());
        assert_eq!(service.min_recurring_interval(), Duration::zero());
    }
}
