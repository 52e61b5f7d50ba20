//! Payment gateway types and data structures
//!
//! Provider-agnostic request/response shapes that cross the gateway boundary.

use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::codes;
use crate::payments::currency;
use crate::payments::http::redact;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Free-form provider extras attached to results and intents
pub type Metadata = serde_json::Map<String, Value>;

/// Identifier of a supported provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Paymob,
    EasyKash,
    Tap,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Paymob, ProviderId::EasyKash, ProviderId::Tap];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Paymob => "paymob",
            ProviderId::EasyKash => "easykash",
            ProviderId::Tap => "tap",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paymob" => Ok(ProviderId::Paymob),
            "easykash" => Ok(ProviderId::EasyKash),
            "tap" => Ok(ProviderId::Tap),
            other => Err(AppError::configuration(format!(
                "unknown payment provider '{}'",
                other
            ))),
        }
    }
}

/// How the customer completes a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Customer is sent to a provider-hosted page
    Redirect,
    /// Provider UI embedded through a client secret
    Iframe,
    /// Server-side charge against a stored token, no customer interaction
    DirectToken,
}

/// One line of the order shown on the provider's checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub name: String,
    /// Minor units; `None` means "use the intent amount"
    pub amount: Option<i64>,
    pub quantity: u32,
}

impl PaymentItem {
    pub fn new(name: impl Into<String>, amount: i64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            amount: Some(amount),
            quantity,
        }
    }
}

/// Request to collect money from a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Amount in minor units (cents, piasters, halalas)
    pub amount_in_cents: i64,
    /// ISO 4217 code
    pub currency: String,
    pub academy_id: u64,
    pub payment_id: Option<u64>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    /// One of the adapter's supported method strings
    pub payment_method: String,
    pub description: Option<String>,
    pub items: Vec<PaymentItem>,
    pub billing_data: Metadata,
    pub save_card: bool,
    /// Previously saved card token; when present the card is charged directly
    pub card_token: Option<String>,
    pub success_url: Option<String>,
    pub webhook_url: Option<String>,
}

impl PaymentIntent {
    pub fn new(amount_in_cents: i64, currency: impl Into<String>, academy_id: u64) -> Self {
        Self {
            amount_in_cents,
            currency: currency.into().to_ascii_uppercase(),
            academy_id,
            payment_id: None,
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            payment_method: "card".to_string(),
            description: None,
            items: Vec::new(),
            billing_data: Metadata::new(),
            save_card: false,
            card_token: None,
            success_url: None,
            webhook_url: None,
        }
    }

    pub fn with_payment_id(mut self, payment_id: u64) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_customer(
        mut self,
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Self {
        self.customer_name = name.map(str::to_string);
        self.customer_email = email.map(str::to_string);
        self.customer_phone = phone.map(str::to_string);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_item(mut self, item: PaymentItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_billing(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.billing_data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_card_token(mut self, token: impl Into<String>) -> Self {
        self.card_token = Some(token.into());
        self
    }

    pub fn saving_card(mut self) -> Self {
        self.save_card = true;
        self
    }

    pub fn with_urls(mut self, success_url: Option<&str>, webhook_url: Option<&str>) -> Self {
        self.success_url = success_url.map(str::to_string);
        self.webhook_url = webhook_url.map(str::to_string);
        self
    }

    /// Amount expressed in the currency's major unit (e.g. 100.50)
    pub fn amount_in_major_units(&self) -> Decimal {
        currency::to_major_units(self.amount_in_cents, &self.currency)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.amount_in_cents <= 0 {
            return Err(AppError::new(ValidationError::InvalidAmount {
                amount: self.amount_in_cents,
            }));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::new(ValidationError::MissingField {
                field: "currency".to_string(),
            }));
        }
        Ok(())
    }

    /// Summary safe to write to logs
    pub fn safe_log_fields(&self) -> Value {
        redact(&json!({
            "payment_id": self.payment_id,
            "academy_id": self.academy_id,
            "amount_in_cents": self.amount_in_cents,
            "currency": self.currency,
            "payment_method": self.payment_method,
            "has_customer_email": self.customer_email.is_some(),
            "has_customer_phone": self.customer_phone.is_some(),
            "items": self.items.len(),
            "save_card": self.save_card,
            "card_token": self.card_token,
        }))
    }
}

/// Three-state outcome of every gateway operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the caller must do next to complete the payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentAction {
    Redirect {
        url: String,
    },
    Iframe {
        iframe_url: Option<String>,
        client_secret: String,
        payment_keys: Vec<Value>,
    },
}

/// Outcome of a gateway operation
///
/// `raw_response` is the provider body as received and is NOT redacted; run it
/// through `redact` before storing or logging it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub action: Option<PaymentAction>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_message_localized: Option<String>,
    pub raw_response: Value,
    pub metadata: Metadata,
}

impl PaymentResult {
    fn with_status(status: PaymentStatus) -> Self {
        Self {
            status,
            transaction_id: None,
            gateway_order_id: None,
            action: None,
            error_code: None,
            error_message: None,
            error_message_localized: None,
            raw_response: Value::Null,
            metadata: Metadata::new(),
        }
    }

    pub fn success(transaction_id: impl Into<String>) -> Self {
        Self::with_status(PaymentStatus::Success).with_transaction_id(transaction_id)
    }

    pub fn pending(transaction_id: impl Into<String>) -> Self {
        Self::with_status(PaymentStatus::Pending).with_transaction_id(transaction_id)
    }

    /// Failure carrying the generic message and the localized text for `code`
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let localized = codes::localized_message(&code).to_string();
        Self {
            error_code: Some(code),
            error_message: Some(message.into()),
            error_message_localized: Some(localized),
            ..Self::with_status(PaymentStatus::Failed)
        }
    }

    /// Catch-all for errors that escaped the adapter's own handling
    pub fn exception(error: &AppError) -> Self {
        Self::failed(codes::EXCEPTION, error.to_string())
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        let id = transaction_id.into();
        self.transaction_id = if id.is_empty() { None } else { Some(id) };
        self
    }

    pub fn with_gateway_order_id(mut self, order_id: impl Into<String>) -> Self {
        let id = order_id.into();
        self.gateway_order_id = if id.is_empty() { None } else { Some(id) };
        self
    }

    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.action = Some(PaymentAction::Redirect { url: url.into() });
        self
    }

    pub fn with_iframe(
        mut self,
        iframe_url: Option<String>,
        client_secret: impl Into<String>,
        payment_keys: Vec<Value>,
    ) -> Self {
        self.action = Some(PaymentAction::Iframe {
            iframe_url,
            client_secret: client_secret.into(),
            payment_keys,
        });
        self
    }

    pub fn with_localized_message(mut self, message: impl Into<String>) -> Self {
        self.error_message_localized = Some(message.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw_response = raw;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn extend_metadata(mut self, extra: Metadata) -> Self {
        self.metadata.extend(extra);
        self
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.status == PaymentStatus::Failed
    }

    pub fn redirect_url(&self) -> Option<&str> {
        match &self.action {
            Some(PaymentAction::Redirect { url }) => Some(url.as_str()),
            _ => None,
        }
    }

    pub fn iframe_url(&self) -> Option<&str> {
        match &self.action {
            Some(PaymentAction::Iframe { iframe_url, .. }) => iframe_url.as_deref(),
            _ => None,
        }
    }

    pub fn client_secret(&self) -> Option<&str> {
        match &self.action {
            Some(PaymentAction::Iframe { client_secret, .. }) => Some(client_secret.as_str()),
            _ => None,
        }
    }
}

/// Normalized webhook event
///
/// Produced by parsing alone: a payload exists whether or not its signature
/// verified, so rejected deliveries can still be logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub provider: ProviderId,
    pub event_type: String,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub status: PaymentStatus,
    pub amount_in_cents: Option<i64>,
    pub currency: Option<String>,
    pub payment_id: Option<u64>,
    pub academy_id: Option<u64>,
    pub payment_method: Option<String>,
    pub card_token: Option<String>,
    pub card_brand: Option<String>,
    pub card_last_four: Option<String>,
    pub raw: Value,
}

impl WebhookPayload {
    pub fn new(provider: ProviderId, event_type: impl Into<String>, raw: Value) -> Self {
        Self {
            provider,
            event_type: event_type.into(),
            transaction_id: None,
            order_id: None,
            status: PaymentStatus::Pending,
            amount_in_cents: None,
            currency: None,
            payment_id: None,
            academy_id: None,
            payment_method: None,
            card_token: None,
            card_brand: None,
            card_last_four: None,
            raw,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    /// Key for caller-side duplicate delivery detection
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.provider,
            self.event_type,
            self.transaction_id.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

/// Raw card fields for server-side tokenization
#[derive(Clone, Deserialize)]
pub struct CardData {
    pub number: String,
    pub holder_name: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvv: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_four = self
            .number
            .get(self.number.len().saturating_sub(4)..)
            .unwrap_or("");
        f.debug_struct("CardData")
            .field("number", &format!("****{}", last_four))
            .field("holder_name", &self.holder_name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a card tokenization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizationResult {
    pub success: bool,
    pub token: Option<String>,
    pub card_brand: Option<String>,
    pub last_four: Option<String>,
    pub expiry_month: Option<String>,
    pub expiry_year: Option<String>,
    pub holder_name: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_message_localized: Option<String>,
    pub raw_response: Value,
}

impl TokenizationResult {
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            success: true,
            token: Some(token.into()),
            card_brand: None,
            last_four: None,
            expiry_month: None,
            expiry_year: None,
            holder_name: None,
            error_code: None,
            error_message: None,
            error_message_localized: None,
            raw_response: Value::Null,
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let localized = codes::localized_message(&code).to_string();
        Self {
            success: false,
            token: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            error_message_localized: Some(localized),
            ..Self::success(String::new())
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw_response = raw;
        self
    }
}

/// Customer details for a hosted card-capture session
#[derive(Debug, Clone, Default)]
pub struct TokenizationOptions {
    pub academy_id: Option<u64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub callback_url: Option<String>,
}

/// Context carried into a direct token charge
#[derive(Debug, Clone, Default)]
pub struct ChargeContext {
    pub payment_id: Option<u64>,
    pub academy_id: Option<u64>,
    pub billing_data: Metadata,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl From<&PaymentIntent> for ChargeContext {
    fn from(intent: &PaymentIntent) -> Self {
        Self {
            payment_id: intent.payment_id,
            academy_id: Some(intent.academy_id),
            billing_data: intent.billing_data.clone(),
            customer_name: intent.customer_name.clone(),
            customer_email: intent.customer_email.clone(),
            customer_phone: intent.customer_phone.clone(),
        }
    }
}

/// Split "First Middle Last" into ("First", "Middle Last"); a single word is
/// used for both parts.
pub fn split_full_name(full_name: &str) -> (String, String) {
    let trimmed = full_name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) if !rest.trim().is_empty() => {
            (first.to_string(), rest.trim().to_string())
        }
        _ => (trimmed.to_string(), trimmed.to_string()),
    }
}
