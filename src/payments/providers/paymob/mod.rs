//! Paymob gateway (Egypt, unified checkout iframe)
//!
//! The adapter is a thin facade over separately constructed services:
//! the API client, the intention processor, refunds/voids, tokenization and
//! webhook verification. Each is built once and shared through `Arc`.

pub mod client;
pub mod processor;
pub mod refunds;
pub mod tokenization;
pub mod webhooks;

pub use client::PaymobClient;
pub use processor::PaymobProcessor;
pub use refunds::{void_eligibility, PaymobRefunds, VoidEligibility};
pub use tokenization::{detect_card_brand, PaymobTokenization};
pub use webhooks::PaymobWebhooks;

use crate::config::{HttpConfig, PaymobConfig};
use crate::payments::codes;
use crate::payments::currency::ExchangeRates;
use crate::payments::http::{is_configured, resolve_base_url, GatewayHttp, HttpTransport};
use crate::payments::traits::{
    PaymentGateway, SavedPaymentMethod, SupportsRefunds, SupportsTokenization, SupportsVoids,
    SupportsWebhooks,
};
use crate::payments::types::{
    CardData, ChargeContext, FlowType, Metadata, PaymentIntent, PaymentResult, ProviderId,
    TokenizationOptions, TokenizationResult, WebhookPayload,
};
use crate::payments::webhook::WebhookRequest;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const REQUIRED_KEYS: &[&str] = &["api_key", "secret_key", "public_key"];
const SUPPORTED_METHODS: &[&str] = &["card", "wallet", "apple_pay", "bank_installments", "all"];

pub struct PaymobGateway {
    config: Arc<PaymobConfig>,
    processor: Arc<PaymobProcessor>,
    refunds: PaymobRefunds,
    tokenization: PaymobTokenization,
    webhooks: PaymobWebhooks,
}

impl PaymobGateway {
    /// Wire the sub-services around one shared client
    pub fn new(
        config: PaymobConfig,
        transport: Arc<dyn HttpTransport>,
        http: &HttpConfig,
        rates: Arc<dyn ExchangeRates>,
    ) -> Self {
        let config = Arc::new(config);
        let base_url = resolve_base_url(config.as_ref());
        let client = Arc::new(PaymobClient::new(
            GatewayHttp::new(client::PROVIDER, base_url, transport, http),
            &config,
        ));
        let processor = Arc::new(PaymobProcessor::new(client.clone(), config.clone(), rates));

        Self {
            refunds: PaymobRefunds::new(client.clone()),
            tokenization: PaymobTokenization::new(client, processor.clone(), config.clone()),
            webhooks: PaymobWebhooks::new(config.clone()),
            processor,
            config,
        }
    }

    /// Look a transaction up by the `special_reference` sent on creation
    pub async fn inquire_by_merchant_order(&self, merchant_order_id: &str) -> PaymentResult {
        self.refunds.inquire_by_merchant_order(merchant_order_id).await
    }
}

#[async_trait]
impl PaymentGateway for PaymobGateway {
    fn id(&self) -> ProviderId {
        ProviderId::Paymob
    }

    fn display_name(&self) -> &'static str {
        "Paymob"
    }

    fn is_configured(&self) -> bool {
        is_configured(self.config.as_ref(), REQUIRED_KEYS)
    }

    fn supported_methods(&self) -> &'static [&'static str] {
        SUPPORTED_METHODS
    }

    fn flow_type(&self) -> FlowType {
        FlowType::Iframe
    }

    async fn create_payment_intent(&self, intent: &PaymentIntent) -> PaymentResult {
        if !self.is_configured() {
            warn!("Paymob payment requested but the gateway is not configured");
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Paymob gateway is not configured");
        }
        if let Err(e) = intent.validate() {
            return PaymentResult::failed(codes::INVALID_ARGUMENT, e.to_string());
        }

        info!(intent = %intent.safe_log_fields(), "Paymob createPaymentIntent");

        let conversion = match self.processor.convert(intent) {
            Ok(conversion) => conversion,
            Err(e) => return PaymentResult::failed(codes::CURRENCY_CONVERSION_FAILED, e.to_string()),
        };

        match intent.card_token.as_deref().filter(|token| !token.is_empty()) {
            Some(token) => {
                let context = ChargeContext::from(intent);
                self.tokenization
                    .charge_token(token, conversion.amount_in_cents, &conversion.currency, &context)
                    .await
                    .extend_metadata(conversion.metadata())
            }
            None => self.processor.create_intention(intent, &conversion).await,
        }
    }

    async fn verify_payment(&self, transaction_id: &str, _data: &Metadata) -> PaymentResult {
        if !self.is_configured() {
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Paymob gateway is not configured")
                .with_transaction_id(transaction_id);
        }
        self.processor.verify(transaction_id).await
    }

    fn as_webhooks(&self) -> Option<&dyn SupportsWebhooks> {
        Some(self)
    }

    fn as_refunds(&self) -> Option<&dyn SupportsRefunds> {
        Some(self)
    }

    fn as_voids(&self) -> Option<&dyn SupportsVoids> {
        Some(self)
    }

    fn as_tokenization(&self) -> Option<&dyn SupportsTokenization> {
        Some(self)
    }
}

impl SupportsWebhooks for PaymobGateway {
    fn verify_webhook_signature(&self, request: &WebhookRequest) -> bool {
        self.webhooks.verify(request)
    }

    fn parse_webhook_payload(&self, request: &WebhookRequest) -> WebhookPayload {
        self.webhooks.parse(request)
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhooks.secret()
    }

    fn supported_webhook_events(&self) -> &'static [&'static str] {
        webhooks::SUPPORTED_EVENTS
    }
}

#[async_trait]
impl SupportsRefunds for PaymobGateway {
    async fn refund(
        &self,
        transaction_id: &str,
        amount_in_cents: Option<i64>,
        reason: Option<&str>,
    ) -> PaymentResult {
        if !self.is_configured() {
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Paymob gateway is not configured");
        }
        self.refunds.refund(transaction_id, amount_in_cents, reason).await
    }

    fn supports_partial_refunds(&self) -> bool {
        true
    }

    fn refund_window(&self) -> Duration {
        refunds::refund_window()
    }
}

#[async_trait]
impl SupportsVoids for PaymobGateway {
    async fn void(&self, transaction_id: &str) -> PaymentResult {
        if !self.is_configured() {
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Paymob gateway is not configured");
        }
        self.refunds.void(transaction_id).await
    }

    async fn can_void(&self, transaction_id: &str, cached: Option<&Value>) -> bool {
        self.refunds.can_void(transaction_id, cached).await
    }

    fn void_window(&self) -> Duration {
        refunds::void_window()
    }
}

#[async_trait]
impl SupportsTokenization for PaymobGateway {
    fn supports_tokenization(&self) -> bool {
        self.tokenization.supports_tokenization()
    }

    fn min_recurring_interval(&self) -> Duration {
        self.tokenization.min_recurring_interval()
    }

    async fn create_tokenization_session(
        &self,
        user_id: u64,
        options: &TokenizationOptions,
    ) -> PaymentResult {
        self.tokenization.create_session(user_id, options).await
    }

    async fn tokenize_card(&self, card: &CardData, user_id: u64) -> TokenizationResult {
        self.tokenization.tokenize_card(card, user_id).await
    }

    async fn charge_token(
        &self,
        token: &str,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult {
        self.tokenization
            .charge_token(token, amount_in_cents, currency, context)
            .await
    }

    async fn charge_saved_method(
        &self,
        method: &mut dyn SavedPaymentMethod,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult {
        self.tokenization
            .charge_saved_method(method, amount_in_cents, currency, context)
            .await
    }

    async fn delete_token(&self, token: &str) -> bool {
        self.tokenization.delete_token(token).await
    }
}
