//! Tap Payments gateway implementation
//!
//! Redirect flow for the Gulf markets. A single charge request carries both
//! the customer return URL and the webhook URL; Tap appends `tap_id` to the
//! return URL when it sends the customer back.

use crate::config::{HttpConfig, TapConfig};
use crate::payments::codes;
use crate::payments::currency::{currency_exponent, to_minor_units};
use crate::payments::http::{is_configured, is_path_id, resolve_base_url, GatewayHttp, HttpTransport};
use crate::payments::reference::CorrelationReference;
use crate::payments::signature::{verify_hex, HmacAlgorithm};
use crate::payments::traits::{PaymentGateway, SupportsWebhooks};
use crate::payments::types::{
    split_full_name, FlowType, Metadata, PaymentIntent, PaymentResult, PaymentStatus, ProviderId,
    WebhookPayload,
};
use crate::payments::webhook::{field_string, lookup, WebhookRequest};
use async_trait::async_trait;
use http::Method;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

const PROVIDER: &str = "Tap";
const REQUIRED_KEYS: &[&str] = &["secret_key"];
const SUPPORTED_METHODS: &[&str] = &["card", "mada", "knet", "benefit", "apple_pay", "all"];
const SUPPORTED_EVENTS: &[&str] = &[
    "CAPTURED",
    "AUTHORIZED",
    "INITIATED",
    "IN_PROGRESS",
    "ABANDONED",
    "CANCELLED",
    "FAILED",
    "DECLINED",
    "RESTRICTED",
    "VOID",
    "TIMEDOUT",
    "UNKNOWN",
];

/// Dialing codes recognized at the start of an international number
const COUNTRY_CODES: &[&str] = &["966", "971", "965", "973", "974", "968", "962", "20"];

/// Split a phone number into (country code, national number)
///
/// Only numbers written in international form (leading `+` or `00`, or longer
/// than a national number) are matched against the dialing-code table;
/// everything else gets `default_country_code` with leading zeros removed.
pub fn parse_phone(phone: &str, default_country_code: &str) -> (String, String) {
    let trimmed = phone.trim();
    let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut international = trimmed.starts_with('+');
    if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
        international = true;
    }

    if international || digits.len() > 10 {
        if let Some(code) = COUNTRY_CODES.iter().find(|code| digits.starts_with(*code)) {
            let national = digits[code.len()..].trim_start_matches('0').to_string();
            return (code.to_string(), national);
        }
    }

    (
        default_country_code.to_string(),
        digits.trim_start_matches('0').to_string(),
    )
}

/// Three-state mapping of a Tap charge status
pub fn map_status(status: &str) -> PaymentStatus {
    match status.to_ascii_uppercase().as_str() {
        "CAPTURED" | "AUTHORIZED" => PaymentStatus::Success,
        "INITIATED" | "IN_PROGRESS" => PaymentStatus::Pending,
        _ => PaymentStatus::Failed,
    }
}

/// Amount rendered with the currency's decimals, as Tap signs it
fn format_amount(amount: &Value, currency: &str) -> String {
    let text = field_string(amount);
    let exponent = currency_exponent(currency);
    match Decimal::from_str(text.trim()) {
        Ok(value) => format!("{:.*}", exponent as usize, value.round_dp(exponent)),
        Err(_) => text,
    }
}

fn text(value: &Value, path: &str) -> Option<String> {
    lookup(value, path)
        .map(field_string)
        .filter(|s| !s.is_empty())
}

/// First error description from a Tap error body
fn tap_error(data: &Value) -> Option<String> {
    data.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|error| text(error, "description").or_else(|| text(error, "message")))
}

pub struct TapGateway {
    config: TapConfig,
    http: GatewayHttp,
}

impl TapGateway {
    pub fn new(config: TapConfig, transport: Arc<dyn HttpTransport>, http: &HttpConfig) -> Self {
        let base_url = resolve_base_url(&config);
        Self {
            http: GatewayHttp::new(PROVIDER, base_url, transport, http),
            config,
        }
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.config.secret_key)
    }

    fn customer(&self, intent: &PaymentIntent) -> Value {
        let (first_name, last_name) =
            split_full_name(intent.customer_name.as_deref().unwrap_or("Customer"));
        let mut customer = json!({
            "first_name": first_name,
            "last_name": last_name,
        });
        if let Some(email) = intent.customer_email.as_deref().filter(|e| !e.is_empty()) {
            customer["email"] = Value::from(email);
        }
        if let Some(phone) = intent.customer_phone.as_deref().filter(|p| !p.is_empty()) {
            let (country_code, number) = parse_phone(phone, &self.config.default_country_code);
            customer["phone"] = json!({
                "country_code": country_code,
                "number": number,
            });
        }
        customer
    }

    fn charge_result(&self, charge_id: &str, charge: Value) -> PaymentResult {
        let status = text(&charge, "status")
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        match map_status(&status) {
            PaymentStatus::Success => PaymentResult::success(charge_id)
                .with_gateway_order_id(
                    text(&charge, "reference.payment")
                        .or_else(|| text(&charge, "reference.gateway"))
                        .unwrap_or_default(),
                )
                .with_metadata("status", status)
                .with_metadata("amount", charge.get("amount").cloned().unwrap_or(Value::Null))
                .with_metadata("currency", charge.get("currency").cloned().unwrap_or(Value::Null))
                .with_metadata(
                    "payment_method",
                    text(&charge, "source.payment_method").unwrap_or_else(|| "card".to_string()),
                )
                .with_metadata(
                    "card_brand",
                    lookup(&charge, "card.brand").cloned().unwrap_or(Value::Null),
                )
                .with_metadata(
                    "card_last_four",
                    lookup(&charge, "card.last_four").cloned().unwrap_or(Value::Null),
                )
                .with_raw(charge),
            PaymentStatus::Pending => PaymentResult::pending(charge_id)
                .with_metadata("status", status)
                .with_raw(charge),
            PaymentStatus::Failed => {
                let message = text(&charge, "response.message")
                    .unwrap_or_else(|| format!("Payment status: {}", status));
                PaymentResult::failed(status, message)
                    .with_transaction_id(charge_id)
                    .with_metadata(
                        "response_code",
                        lookup(&charge, "response.code").cloned().unwrap_or(Value::Null),
                    )
                    .with_raw(charge)
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for TapGateway {
    fn id(&self) -> ProviderId {
        ProviderId::Tap
    }

    fn display_name(&self) -> &'static str {
        "تاب"
    }

    fn is_configured(&self) -> bool {
        is_configured(&self.config, REQUIRED_KEYS)
    }

    fn supported_methods(&self) -> &'static [&'static str] {
        SUPPORTED_METHODS
    }

    fn flow_type(&self) -> FlowType {
        FlowType::Redirect
    }

    async fn create_payment_intent(&self, intent: &PaymentIntent) -> PaymentResult {
        if !self.is_configured() {
            warn!("Tap payment requested but the gateway is not configured");
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Tap gateway is not configured");
        }
        if let Err(e) = intent.validate() {
            return PaymentResult::failed(codes::INVALID_ARGUMENT, e.to_string());
        }
        let Some(redirect_url) = intent.success_url.as_deref().filter(|u| !u.is_empty()) else {
            return PaymentResult::failed(
                codes::INVALID_ARGUMENT,
                "A redirect URL is required for Tap payments",
            );
        };

        let reference = CorrelationReference::new(intent.academy_id, intent.payment_id);
        let amount = intent.amount_in_major_units();
        let mut body = json!({
            "amount": amount.to_f64().unwrap_or_default(),
            "currency": intent.currency,
            "threeDSecure": true,
            "save_card": intent.save_card,
            "description": intent.description.as_deref().unwrap_or("Subscription payment"),
            "reference": {
                "transaction": reference.to_string(),
                "order": reference.to_string(),
            },
            "receipt": { "email": false, "sms": false },
            "customer": self.customer(intent),
            "source": { "id": "src_all" },
            "redirect": { "url": redirect_url },
            "metadata": {
                "payment_id": intent.payment_id,
                "academy_id": intent.academy_id,
            },
        });
        if let Some(webhook_url) = intent.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            body["post"] = json!({ "url": webhook_url });
        }

        info!(intent = %intent.safe_log_fields(), reference = %reference, "Tap creating charge");

        let authorization = self.authorization();
        let response = self
            .http
            .execute(
                Method::POST,
                "/v2/charges",
                Some(&body),
                &[("Authorization", authorization.as_str())],
            )
            .await;

        if !response.success {
            let message = tap_error(&response.data)
                .unwrap_or_else(|| response.error_message("Failed to create charge"));
            error!(reference = %reference, "Tap charge creation failed: {}", message);
            return PaymentResult::failed(codes::PAYMENT_CREATION_FAILED, message)
                .with_raw(response.body());
        }

        let data = response.data;
        let charge_id = text(&data, "id").unwrap_or_default();
        let Some(url) = text(&data, "transaction.url") else {
            error!(charge_id = %charge_id, "Tap did not return a transaction URL");
            return PaymentResult::failed(codes::NO_REDIRECT_URL, "Tap did not return a redirect URL")
                .with_transaction_id(charge_id)
                .with_raw(data);
        };

        info!(charge_id = %charge_id, payment_id = ?intent.payment_id, "Tap charge created");

        PaymentResult::pending(charge_id)
            .with_redirect(url)
            .with_metadata("charge_status", text(&data, "status").unwrap_or_default())
            .with_metadata("correlation_reference", reference.to_string())
            .with_metadata("payment_id", intent.payment_id)
            .with_metadata("academy_id", intent.academy_id)
            .with_raw(data)
    }

    async fn verify_payment(&self, transaction_id: &str, data: &Metadata) -> PaymentResult {
        if !self.is_configured() {
            return PaymentResult::failed(codes::NOT_CONFIGURED, "Tap gateway is not configured")
                .with_transaction_id(transaction_id);
        }

        let charge_id = data
            .get("tap_id")
            .map(field_string)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| transaction_id.to_string());
        if !is_path_id(&charge_id) {
            warn!(charge_id = %charge_id, "Tap verification rejected an invalid charge id");
            return PaymentResult::failed(codes::INVALID_ARGUMENT, "Invalid Tap charge id")
                .with_transaction_id(charge_id);
        }

        let authorization = self.authorization();
        let response = self
            .http
            .execute(
                Method::GET,
                &format!("/v2/charges/{}", charge_id),
                None,
                &[("Authorization", authorization.as_str())],
            )
            .await;

        if !response.success {
            let message = tap_error(&response.data)
                .unwrap_or_else(|| response.error_message("Failed to verify payment"));
            error!(charge_id = %charge_id, "Tap verification failed: {}", message);
            return PaymentResult::failed(codes::VERIFICATION_FAILED, message)
                .with_transaction_id(charge_id)
                .with_raw(response.body());
        }

        self.charge_result(&charge_id, response.data)
    }

    fn as_webhooks(&self) -> Option<&dyn SupportsWebhooks> {
        Some(self)
    }
}

impl SupportsWebhooks for TapGateway {
    fn verify_webhook_signature(&self, request: &WebhookRequest) -> bool {
        let Some(secret) = self.webhook_secret() else {
            warn!("Tap webhook secret not configured");
            return false;
        };
        let Some(signature) = request.header("hashstring").filter(|s| !s.is_empty()) else {
            warn!("Tap webhook arrived without a hashstring header");
            return false;
        };

        let charge = &request.body;
        let currency = text(charge, "currency").unwrap_or_default();
        let amount = charge
            .get("amount")
            .map(|amount| format_amount(amount, &currency))
            .unwrap_or_default();
        let field = |path: &str| text(charge, path).unwrap_or_default();
        let message = format!(
            "x_id{}x_amount{}x_currency{}x_gateway_reference{}x_payment_reference{}x_status{}x_created{}",
            field("id"),
            amount,
            currency,
            field("reference.gateway"),
            field("reference.payment"),
            field("status"),
            field("transaction.created"),
        );

        let valid = verify_hex(HmacAlgorithm::Sha256, secret, &message, signature);
        if !valid {
            warn!(charge_id = %field("id"), "Tap HMAC verification failed");
        }
        valid
    }

    fn parse_webhook_payload(&self, request: &WebhookRequest) -> WebhookPayload {
        let charge = request.body.clone();
        let status = text(&charge, "status")
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let currency = text(&charge, "currency").map(|c| c.to_ascii_uppercase());
        let amount_in_cents = match (charge.get("amount"), currency.as_deref()) {
            (Some(amount), Some(currency)) => Decimal::from_str(field_string(amount).trim())
                .ok()
                .and_then(|amount| to_minor_units(amount, currency)),
            _ => None,
        };
        let reference = text(&charge, "reference.transaction")
            .and_then(|r| CorrelationReference::parse(&r));
        let metadata_id = |key: &str| {
            lookup(&charge, &format!("metadata.{}", key))
                .and_then(|v| field_string(v).parse::<u64>().ok())
                .filter(|id| *id != 0)
        };

        let mut payload = WebhookPayload::new(ProviderId::Tap, status.clone(), Value::Null);
        payload.status = map_status(&status);
        payload.transaction_id = text(&charge, "id");
        payload.order_id = text(&charge, "reference.payment");
        payload.amount_in_cents = amount_in_cents;
        payload.currency = currency;
        payload.payment_id = metadata_id("payment_id").or_else(|| reference.and_then(|r| r.payment_id()));
        payload.academy_id = metadata_id("academy_id").or_else(|| reference.map(|r| r.academy_id));
        payload.payment_method = text(&charge, "source.payment_method");
        payload.card_brand = text(&charge, "card.brand");
        payload.card_last_four = text(&charge, "card.last_four");
        payload.raw = charge;
        payload
    }

    fn webhook_secret(&self) -> Option<&str> {
        [&self.config.webhook_secret, &self.config.secret_key]
            .into_iter()
            .map(|secret| secret.trim())
            .find(|secret| !secret.is_empty())
    }

    fn supported_webhook_events(&self) -> &'static [&'static str] {
        SUPPORTED_EVENTS
    }
}
