//! EasyKash payment gateway implementation
//!
//! Hosted redirect flow for Egypt (cards, wallets, Fawry, Aman, Meeza).
//! Unlike the other providers, EasyKash takes amounts in major units and only
//! accepts numeric customer references.

use crate::config::{EasyKashConfig, HttpConfig};
use crate::payments::codes;
use crate::payments::currency::to_minor_units;
use crate::payments::http::{is_configured, resolve_base_url, GatewayHttp, HttpTransport};
use crate::payments::reference::CorrelationReference;
use crate::payments::signature::{verify_hex, HmacAlgorithm};
use crate::payments::traits::{PaymentGateway, SupportsWebhooks};
use crate::payments::types::{
    FlowType, Metadata, PaymentIntent, PaymentResult, PaymentStatus, ProviderId, WebhookPayload,
};
use crate::payments::webhook::{field_string, WebhookRequest};
use async_trait::async_trait;
use http::Method;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

const PROVIDER: &str = "EasyKash";
const REQUIRED_KEYS: &[&str] = &["api_key", "secret_key"];
const SUPPORTED_METHODS: &[&str] = &["card", "wallet", "fawry", "aman", "meeza"];
const SUPPORTED_EVENTS: &[&str] = &["PAID", "FAILED", "EXPIRED", "DELIVERED", "CANCELED", "REFUNDED"];

/// Field order of the webhook HMAC message
const SIGNED_FIELDS: &[&str] = &[
    "ProductCode",
    "Amount",
    "ProductType",
    "PaymentMethod",
    "status",
    "easykashRef",
    "customerReference",
];

/// Placeholder mobile sent when the customer's number is not Egyptian
pub const DEFAULT_PHONE: &str = "01000000000";

/// EasyKash payment option codes
pub mod payment_option {
    pub const AMAN: u32 = 1;
    pub const CARD: u32 = 2;
    pub const WALLET: u32 = 4;
    pub const FAWRY: u32 = 5;
    pub const MEEZA: u32 = 6;
}

/// Payment option codes for a requested method; anything unrecognized offers
/// every option so the customer picks on the hosted page
pub fn payment_options_for(method: &str) -> Vec<u32> {
    use payment_option::*;
    match method {
        "card" => vec![CARD],
        "wallet" => vec![WALLET],
        "fawry" => vec![FAWRY],
        "aman" => vec![AMAN],
        "meeza" => vec![MEEZA],
        _ => vec![AMAN, CARD, WALLET, FAWRY, MEEZA],
    }
}

fn egyptian_mobile() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^01[0125][0-9]{8}$").ok())
        .as_ref()
}

/// Normalize a phone number to the 11-digit local format EasyKash accepts
///
/// Egyptian country prefixes are stripped and a leading zero forced. Saudi,
/// other international, and malformed numbers become [`DEFAULT_PHONE`].
pub fn normalize_phone(phone: Option<&str>) -> String {
    let digits: String = phone
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return DEFAULT_PHONE.to_string();
    }

    let mut number = digits.as_str();
    if number.starts_with("20") && number.len() > 10 {
        number = &number[2..];
    }
    if number.starts_with("0020") && number.len() > 12 {
        number = &number[4..];
    }

    if number.starts_with("966") {
        debug!("EasyKash: Saudi phone detected, using default phone");
        return DEFAULT_PHONE.to_string();
    }
    if number.len() > 11 && !number.starts_with('0') {
        debug!(length = number.len(), "EasyKash: international phone detected, using default phone");
        return DEFAULT_PHONE.to_string();
    }

    let number = if number.starts_with('0') {
        number.to_string()
    } else {
        format!("0{}", number)
    };

    match egyptian_mobile() {
        Some(pattern) if pattern.is_match(&number) => number,
        _ => {
            debug!(length = number.len(), "EasyKash: invalid phone format, using default phone");
            DEFAULT_PHONE.to_string()
        }
    }
}

/// Three-state mapping of an EasyKash status
pub fn map_status(status: &str) -> PaymentStatus {
    match status.to_ascii_uppercase().as_str() {
        "PAID" | "DELIVERED" => PaymentStatus::Success,
        "NEW" | "PENDING" => PaymentStatus::Pending,
        _ => PaymentStatus::Failed,
    }
}

/// Inquiry API response body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InquiryResponse {
    status: Option<String>,
    #[serde(rename = "easykashRef")]
    easykash_ref: Option<Value>,
    voucher: Option<Value>,
    #[serde(rename = "Amount")]
    amount: Option<Value>,
    #[serde(rename = "PaymentMethod")]
    payment_method: Option<String>,
    #[serde(rename = "BuyerName")]
    buyer_name: Option<String>,
    #[serde(rename = "BuyerEmail")]
    buyer_email: Option<String>,
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value.map(field_string).filter(|s| !s.is_empty())
}

pub struct EasyKashGateway {
    config: EasyKashConfig,
    http: GatewayHttp,
}

impl EasyKashGateway {
    pub fn new(config: EasyKashConfig, transport: Arc<dyn HttpTransport>, http: &HttpConfig) -> Self {
        let base_url = resolve_base_url(&config);
        Self {
            http: GatewayHttp::new(PROVIDER, base_url, transport, http),
            config,
        }
    }

    /// Configured payment options when set, otherwise derived from the method
    fn payment_options(&self, method: &str) -> Vec<u32> {
        let configured: Vec<u32> = self
            .config
            .payment_options
            .iter()
            .copied()
            .filter(|option| *option > 0)
            .collect();
        if configured.is_empty() {
            payment_options_for(method)
        } else {
            configured
        }
    }

    async fn inquire(&self, customer_reference: &str) -> PaymentResult {
        let reference = customer_reference
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(customer_reference));
        let response = self
            .http
            .execute_read(
                Method::POST,
                "/api/cash-api/inquire",
                Some(&json!({ "customerReference": reference })),
                &[("Authorization", self.config.api_key.as_str())],
            )
            .await;

        if !response.success {
            error!(
                customer_reference,
                "EasyKash inquiry failed: {}",
                response.error_message("")
            );
            return PaymentResult::failed(
                codes::VERIFICATION_FAILED,
                response.error_message("Failed to verify payment"),
            )
            .with_transaction_id(customer_reference)
            .with_raw(response.body());
        }

        let txn: InquiryResponse = match response.decode(PROVIDER) {
            Ok(txn) => txn,
            Err(e) => {
                error!(customer_reference, "EasyKash inquiry unreadable: {}", e);
                return PaymentResult::exception(&e)
                    .with_transaction_id(customer_reference)
                    .with_raw(response.body());
            }
        };
        let data = response.data;

        let status = txn
            .status
            .as_deref()
            .map(str::to_ascii_uppercase)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let transaction_id =
            non_empty(txn.easykash_ref.as_ref()).unwrap_or_else(|| customer_reference.to_string());

        match map_status(&status) {
            PaymentStatus::Success => PaymentResult::success(transaction_id)
                .with_gateway_order_id(non_empty(txn.voucher.as_ref()).unwrap_or_default())
                .with_metadata("amount", txn.amount.unwrap_or(Value::from(0)))
                .with_metadata(
                    "payment_method",
                    txn.payment_method.unwrap_or_else(|| "card".to_string()),
                )
                .with_metadata("buyer_name", txn.buyer_name.unwrap_or_default())
                .with_metadata("buyer_email", txn.buyer_email.unwrap_or_default())
                .with_raw(data),
            PaymentStatus::Pending => PaymentResult::pending(transaction_id)
                .with_metadata("status", status)
                .with_metadata("voucher", txn.voucher.unwrap_or(Value::Null))
                .with_raw(data),
            PaymentStatus::Failed => {
                PaymentResult::failed(status.clone(), format!("Payment status: {}", status))
                    .with_transaction_id(transaction_id)
                    .with_raw(data)
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for EasyKashGateway {
    fn id(&self) -> ProviderId {
        ProviderId::EasyKash
    }

    fn display_name(&self) -> &'static str {
        "إيزي كاش"
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
            warn!("EasyKash payment requested but the gateway is not configured");
            return PaymentResult::failed(codes::NOT_CONFIGURED, "EasyKash gateway is not configured");
        }
        if let Err(e) = intent.validate() {
            return PaymentResult::failed(codes::INVALID_ARGUMENT, e.to_string());
        }

        let Some(email) = intent.customer_email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return PaymentResult::failed(
                codes::INVALID_ARGUMENT,
                "Customer email is required for EasyKash payments",
            );
        };
        let Some(redirect_url) = intent.success_url.as_deref().filter(|u| !u.is_empty()) else {
            return PaymentResult::failed(
                codes::INVALID_ARGUMENT,
                "A redirect URL is required for EasyKash payments",
            );
        };

        let reference = CorrelationReference::new(intent.academy_id, intent.payment_id);
        let customer_reference = reference.numeric();
        let amount = Decimal::new(intent.amount_in_cents, 2).round_dp(2);
        let payment_options = self.payment_options(&intent.payment_method);

        let body = json!({
            "amount": amount.to_f64().unwrap_or_default(),
            "currency": intent.currency,
            "cashExpiry": self.config.cash_expiry_hours,
            "name": intent
                .customer_name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("Customer"),
            "email": email,
            "mobile": normalize_phone(intent.customer_phone.as_deref()),
            "redirectUrl": redirect_url,
            "customerReference": customer_reference,
            "paymentOptions": payment_options,
        });

        info!(
            customer_reference,
            payment_id = ?intent.payment_id,
            academy_id = intent.academy_id,
            amount = %amount,
            currency = %intent.currency,
            payment_options = ?payment_options,
            "EasyKash creating payment intent"
        );

        let response = self
            .http
            .execute(
                Method::POST,
                "/api/directpayv1/pay",
                Some(&body),
                &[("Authorization", self.config.api_key.as_str())],
            )
            .await;

        // Errors arrive with HTTP 200 and an `error` or bare `message` field
        let data = response.data.clone();
        let redirect = data
            .get("redirectUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty());
        let body_error = data.get("error").filter(|e| !e.is_null()).is_some()
            || (data.get("message").is_some() && data.get("redirectUrl").is_none());

        if !response.success || body_error {
            let message = non_empty(data.get("error"))
                .or_else(|| non_empty(data.get("message")))
                .unwrap_or_else(|| response.error_message("Failed to create payment"));
            error!(
                intent = %intent.safe_log_fields(),
                "EasyKash payment creation failed: {}", message
            );
            return PaymentResult::failed(codes::PAYMENT_CREATION_FAILED, message)
                .with_raw(response.body());
        }

        let Some(redirect) = redirect else {
            error!(customer_reference, "EasyKash did not return a redirect URL");
            return PaymentResult::failed(
                codes::NO_REDIRECT_URL,
                "EasyKash did not return a redirect URL",
            )
            .with_raw(data);
        };

        info!(
            customer_reference,
            payment_id = ?intent.payment_id,
            "EasyKash payment intent created"
        );

        PaymentResult::pending(customer_reference.to_string())
            .with_redirect(redirect)
            .with_metadata("customer_reference", customer_reference)
            .with_metadata("correlation_reference", reference.to_string())
            .with_metadata("payment_id", intent.payment_id)
            .with_metadata("academy_id", intent.academy_id)
            .with_raw(data)
    }

    async fn verify_payment(&self, transaction_id: &str, data: &Metadata) -> PaymentResult {
        if !self.is_configured() {
            return PaymentResult::failed(codes::NOT_CONFIGURED, "EasyKash gateway is not configured")
                .with_transaction_id(transaction_id);
        }

        let customer_reference =
            non_empty(data.get("customerReference")).unwrap_or_else(|| transaction_id.to_string());
        self.inquire(&customer_reference).await
    }

    fn as_webhooks(&self) -> Option<&dyn SupportsWebhooks> {
        Some(self)
    }
}

impl SupportsWebhooks for EasyKashGateway {
    fn verify_webhook_signature(&self, request: &WebhookRequest) -> bool {
        let Some(secret) = self.webhook_secret() else {
            warn!("EasyKash webhook secret not configured");
            return false;
        };
        let Some(signature) = request.input("signatureHash").filter(|s| !s.is_empty()) else {
            warn!("EasyKash webhook arrived without a signature hash");
            return false;
        };

        let message: String = SIGNED_FIELDS
            .iter()
            .map(|field| request.input(field).unwrap_or_default())
            .collect();

        let valid = verify_hex(HmacAlgorithm::Sha512, secret, &message, &signature);
        if !valid {
            warn!(
                customer_reference = ?request.input("customerReference"),
                "EasyKash HMAC verification failed"
            );
        }
        valid
    }

    fn parse_webhook_payload(&self, request: &WebhookRequest) -> WebhookPayload {
        let raw = if request.body.is_object() {
            request.body.clone()
        } else {
            Value::Object(
                request
                    .query
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            )
        };

        let status = non_empty(raw.get("status"))
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let currency = non_empty(raw.get("currency"))
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_else(|| "EGP".to_string());
        let amount_in_cents = non_empty(raw.get("Amount"))
            .and_then(|amount| Decimal::from_str(amount.trim()).ok())
            .and_then(|amount| to_minor_units(amount, &currency));
        let reference = non_empty(raw.get("customerReference"))
            .and_then(|r| CorrelationReference::parse(&r));

        let mut payload = WebhookPayload::new(ProviderId::EasyKash, status.clone(), raw.clone());
        payload.status = map_status(&status);
        payload.transaction_id = non_empty(raw.get("easykashRef"));
        payload.order_id = non_empty(raw.get("voucher"));
        payload.amount_in_cents = amount_in_cents;
        payload.currency = Some(currency);
        payload.payment_method = non_empty(raw.get("PaymentMethod"));
        payload.payment_id = reference.and_then(|r| r.payment_id());
        payload.academy_id = reference.map(|r| r.academy_id);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::signature::sign_hex;
    use crate::payments::test_support::MockTransport;

    fn config() -> EasyKashConfig {
        EasyKashConfig {
            api_key: "ek_api".to_string(),
            secret_key: "ek_secret".to_string(),
            ..EasyKashConfig::default()
        }
    }

    fn gateway(config: EasyKashConfig, transport: Arc<MockTransport>) -> EasyKashGateway {
        EasyKashGateway::new(
            config,
            transport,
            &HttpConfig {
                retry_backoff_ms: 0,
                ..HttpConfig::default()
            },
        )
    }

    fn intent() -> PaymentIntent {
        PaymentIntent::new(10_050, "EGP", 4)
            .with_payment_id(812)
            .with_customer(Some("Sara Adel"), Some("sara@example.com"), Some("+201012345678"))
            .with_urls(Some("https://academy.example/return"), None)
    }

    fn signed_body(secret: &str) -> Value {
        let mut body = json!({
            "ProductCode": "EDU",
            "Amount": "100.50",
            "ProductType": "Direct Pay",
            "PaymentMethod": "Cash Through Fawry",
            "BuyerName": "Sara Adel",
            "status": "PAID",
            "voucher": "V123",
            "easykashRef": "9876",
            "customerReference": "4-812-1769679900",
        });
        let message = "EDU100.50Direct PayCash Through FawryPAID98764-812-1769679900";
        body["signatureHash"] = Value::from(sign_hex(HmacAlgorithm::Sha512, secret, message).unwrap());
        body
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(Some("+201012345678")), "01012345678");
        assert_eq!(normalize_phone(Some("01112345678")), "01112345678");
        assert_eq!(normalize_phone(Some("1212345678")), "01212345678");
        assert_eq!(normalize_phone(Some("00201512345678")), "01512345678");
        assert_eq!(normalize_phone(Some("+966555123456")), DEFAULT_PHONE);
        assert_eq!(normalize_phone(Some("+447911123456")), DEFAULT_PHONE);
        assert_eq!(normalize_phone(Some("01312345678")), DEFAULT_PHONE);
        assert_eq!(normalize_phone(Some("n/a")), DEFAULT_PHONE);
        assert_eq!(normalize_phone(None), DEFAULT_PHONE);
    }

    #[test]
    fn test_payment_options_mapping() {
        assert_eq!(payment_options_for("fawry"), vec![5]);
        assert_eq!(payment_options_for("aman"), vec![1]);
        assert_eq!(payment_options_for("anything"), vec![1, 2, 4, 5, 6]);

        let configured = gateway(
            EasyKashConfig {
                payment_options: vec![0, 2, 31],
                ..config()
            },
            Arc::new(MockTransport::new()),
        );
        assert_eq!(configured.payment_options("fawry"), vec![2, 31]);
    }

    #[tokio::test]
    async fn test_create_sends_major_units() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"redirectUrl": "https://pay.easykash.net/r/1"}));

        let result = gateway(config(), transport.clone())
            .create_payment_intent(&intent())
            .await;
        assert!(result.is_pending());
        assert_eq!(result.redirect_url(), Some("https://pay.easykash.net/r/1"));
        assert_eq!(result.metadata["payment_id"], 812);

        let request = &transport.requests()[0];
        assert!(request.url.ends_with("/api/directpayv1/pay"));
        assert_eq!(request.headers.get("authorization").unwrap(), "ek_api");
        let body = request.body.clone().unwrap();
        assert_eq!(body["amount"], json!(100.5));
        assert_eq!(body["mobile"], "01012345678");
        assert_eq!(body["cashExpiry"], 72);
        assert_eq!(body["paymentOptions"], json!([2]));

        let reference = body["customerReference"].as_u64().unwrap();
        assert_eq!(reference % 100, 12);
        assert_eq!(result.transaction_id, Some(reference.to_string()));
    }

    #[tokio::test]
    async fn test_missing_email_is_invalid() {
        let transport = Arc::new(MockTransport::new());
        let mut intent = intent();
        intent.customer_email = None;

        let result = gateway(config(), transport.clone())
            .create_payment_intent(&intent)
            .await;
        assert_eq!(result.error_code.as_deref(), Some(codes::INVALID_ARGUMENT));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_error_inside_http_200() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"message": "Invalid API key"}));

        let result = gateway(config(), transport)
            .create_payment_intent(&intent())
            .await;
        assert_eq!(result.error_code.as_deref(), Some(codes::PAYMENT_CREATION_FAILED));
        assert_eq!(result.error_message.as_deref(), Some("Invalid API key"));
    }

    #[tokio::test]
    async fn test_missing_redirect_url() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"status": "ok"}));

        let result = gateway(config(), transport)
            .create_payment_intent(&intent())
            .await;
        assert_eq!(result.error_code.as_deref(), Some(codes::NO_REDIRECT_URL));
    }

    #[tokio::test]
    async fn test_verify_paid() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({
                "status": "PAID",
                "easykashRef": 9876,
                "voucher": "V123",
                "Amount": "100.50",
                "PaymentMethod": "Credit & Debit Card",
            }),
        );

        let mut data = Metadata::new();
        data.insert("customerReference".to_string(), json!(26_012_909_450_012_u64));
        let result = gateway(config(), transport.clone())
            .verify_payment("ignored", &data)
            .await;
        assert!(result.is_successful());
        assert_eq!(result.transaction_id.as_deref(), Some("9876"));
        assert_eq!(result.gateway_order_id.as_deref(), Some("V123"));
        assert_eq!(
            transport.last_body(),
            json!({"customerReference": 26_012_909_450_012_u64})
        );
    }

    #[tokio::test]
    async fn test_verify_pending_and_failed() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"status": "new"}));
        transport.push_json(200, json!({"status": "EXPIRED", "easykashRef": "55"}));
        let gateway = gateway(config(), transport);

        let pending = gateway.verify_payment("123", &Metadata::new()).await;
        assert!(pending.is_pending());
        assert_eq!(pending.transaction_id.as_deref(), Some("123"));

        let failed = gateway.verify_payment("123", &Metadata::new()).await;
        assert_eq!(failed.error_code.as_deref(), Some("EXPIRED"));
        assert_eq!(failed.transaction_id.as_deref(), Some("55"));
        assert_eq!(
            failed.error_message_localized.as_deref(),
            Some(codes::localized_message("EXPIRED"))
        );
    }

    #[tokio::test]
    async fn test_inquiry_is_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(503, json!({}));
        transport.push_json(200, json!({"status": "PAID", "easykashRef": "1"}));

        let result = gateway(config(), transport.clone())
            .verify_payment("123", &Metadata::new())
            .await;
        assert!(result.is_successful());
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_inquiry_is_an_exception() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"status": 5}));

        let result = gateway(config(), transport)
            .verify_payment("123", &Metadata::new())
            .await;
        assert!(result.is_failed());
        assert_eq!(result.error_code.as_deref(), Some(codes::EXCEPTION));
        assert!(result
            .error_message
            .is_some_and(|message| message.contains("EasyKash returned a malformed response")));
        assert_eq!(result.transaction_id.as_deref(), Some("123"));
        assert_eq!(result.raw_response, json!({"status": 5}));
    }

    #[test]
    fn test_webhook_signature() {
        let gateway = gateway(config(), Arc::new(MockTransport::new()));
        let body = signed_body("ek_secret");
        assert!(gateway.verify_webhook_signature(&WebhookRequest::from_body(body.clone())));

        let mut tampered = body;
        tampered["Amount"] = Value::from("1.00");
        assert!(!gateway.verify_webhook_signature(&WebhookRequest::from_body(tampered)));
    }

    #[test]
    fn test_dedicated_webhook_secret_wins() {
        let gateway = gateway(
            EasyKashConfig {
                webhook_secret: "hook".to_string(),
                ..config()
            },
            Arc::new(MockTransport::new()),
        );
        assert_eq!(gateway.webhook_secret(), Some("hook"));
        assert!(gateway.verify_webhook_signature(&WebhookRequest::from_body(signed_body("hook"))));
        assert!(!gateway.verify_webhook_signature(&WebhookRequest::from_body(signed_body("ek_secret"))));
    }

    #[test]
    fn test_empty_secret_rejects() {
        let gateway = gateway(EasyKashConfig::default(), Arc::new(MockTransport::new()));
        assert!(gateway.webhook_secret().is_none());
        assert!(!gateway.verify_webhook_signature(&WebhookRequest::from_body(signed_body("x"))));
    }

    #[test]
    fn test_parse_webhook_payload() {
        let gateway = gateway(config(), Arc::new(MockTransport::new()));
        let payload = gateway.parse_webhook_payload(&WebhookRequest::from_body(signed_body("wrong")));
        assert_eq!(payload.event_type, "PAID");
        assert!(payload.is_successful());
        assert_eq!(payload.transaction_id.as_deref(), Some("9876"));
        assert_eq!(payload.order_id.as_deref(), Some("V123"));
        assert_eq!(payload.amount_in_cents, Some(10_050));
        assert_eq!(payload.payment_id, Some(812));
        assert_eq!(payload.academy_id, Some(4));
        assert_eq!(payload.payment_method.as_deref(), Some("Cash Through Fawry"));
    }

    #[test]
    fn test_oversized_webhook_amount_is_dropped() {
        let gateway = gateway(config(), Arc::new(MockTransport::new()));
        let payload = gateway.parse_webhook_payload(&WebhookRequest::from_body(json!({
            "status": "PAID",
            "Amount": "79228162514264337593543950335",
        })));
        assert_eq!(payload.event_type, "PAID");
        assert_eq!(payload.amount_in_cents, None);
    }
}
