//! Paymob callback verification and parsing
//!
//! Paymob delivers the same transaction two ways: a server-to-server POST
//! (`{"type": "TRANSACTION", "obj": {...}}`) and a browser redirect whose
//! query string carries the flattened fields. Both carry the HMAC in the
//! `hmac` query parameter.

use super::processor::last_four;
use super::tokenization::detect_card_brand;
use crate::config::PaymobConfig;
use crate::payments::reference::CorrelationReference;
use crate::payments::signature::{verify_hex, HmacAlgorithm};
use crate::payments::types::{PaymentStatus, ProviderId, WebhookPayload};
use crate::payments::webhook::{field_string, lookup, WebhookRequest};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

pub const EVENT_TRANSACTION: &str = "TRANSACTION";
pub const EVENT_TOKEN: &str = "TOKEN";
pub const SUPPORTED_EVENTS: &[&str] = &[EVENT_TRANSACTION, EVENT_TOKEN];

/// Concatenation order for transaction callbacks
const TRANSACTION_HMAC_FIELDS: &[&str] = &[
    "amount_cents",
    "created_at",
    "currency",
    "error_occured",
    "has_parent_transaction",
    "id",
    "integration_id",
    "is_3d_secure",
    "is_auth",
    "is_capture",
    "is_refunded",
    "is_standalone_payment",
    "is_voided",
    "order.id",
    "owner",
    "pending",
    "source_data.pan",
    "source_data.sub_type",
    "source_data.type",
    "success",
];

/// Concatenation order for card-token callbacks
const TOKEN_HMAC_FIELDS: &[&str] = &[
    "card_subtype",
    "created_at",
    "email",
    "id",
    "masked_pan",
    "merchant_id",
    "order_id",
    "token",
];

pub struct PaymobWebhooks {
    config: Arc<PaymobConfig>,
}

impl PaymobWebhooks {
    pub fn new(config: Arc<PaymobConfig>) -> Self {
        Self { config }
    }

    pub fn secret(&self) -> Option<&str> {
        Some(self.config.hmac_secret.as_str()).filter(|secret| !secret.is_empty())
    }

    pub fn verify(&self, request: &WebhookRequest) -> bool {
        let Some(secret) = self.secret() else {
            warn!("Paymob webhook rejected: HMAC secret not configured");
            return false;
        };
        let Some(signature) = request.input("hmac").filter(|s| !s.is_empty()) else {
            warn!("Paymob webhook rejected: missing hmac parameter");
            return false;
        };

        let event = event_type(request);
        let message = hmac_message(&event, &callback_object(request));
        let valid = verify_hex(HmacAlgorithm::Sha512, secret, &message, &signature);
        if !valid {
            warn!(event = %event, "Paymob webhook HMAC mismatch");
        }
        valid
    }

    pub fn parse(&self, request: &WebhookRequest) -> WebhookPayload {
        let event = event_type(request);
        let obj = callback_object(request);
        if event == EVENT_TOKEN {
            parse_token(obj, request.body.clone())
        } else {
            parse_transaction(event, obj, raw_request(request))
        }
    }
}

fn event_type(request: &WebhookRequest) -> String {
    request
        .body
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| EVENT_TRANSACTION.to_string())
}

/// The callback object: `obj` from a POST body, or the redirect query string
/// rebuilt into the same nested shape
fn callback_object(request: &WebhookRequest) -> Value {
    if let Some(obj) = request.body.get("obj").filter(|obj| obj.is_object()) {
        return obj.clone();
    }

    let mut root = Map::new();
    for (key, value) in &request.query {
        if key == "hmac" {
            continue;
        }
        let value = Value::from(value.as_str());
        match key.split_once('.') {
            Some((parent, child)) => {
                let entry = root
                    .entry(parent.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = entry {
                    nested.insert(child.to_string(), value);
                }
            }
            None if key == "order" => {
                let entry = root
                    .entry("order".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = entry {
                    nested.insert("id".to_string(), value);
                }
            }
            None => {
                root.insert(key.clone(), value);
            }
        }
    }
    Value::Object(root)
}

fn hmac_message(event: &str, obj: &Value) -> String {
    let fields = if event == EVENT_TOKEN {
        TOKEN_HMAC_FIELDS
    } else {
        TRANSACTION_HMAC_FIELDS
    };
    fields
        .iter()
        .map(|path| hmac_field(obj, path))
        .collect()
}

fn hmac_field(obj: &Value, path: &str) -> String {
    match lookup(obj, path) {
        Some(value) => field_string(value),
        // `order` may be a bare id instead of an object
        None => match path.split_once('.') {
            Some((parent, _)) => obj
                .get(parent)
                .filter(|value| !value.is_object())
                .map(field_string)
                .unwrap_or_default(),
            None => String::new(),
        },
    }
}

fn raw_request(request: &WebhookRequest) -> Value {
    if !request.body.is_null() {
        return request.body.clone();
    }
    Value::Object(
        request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect(),
    )
}

fn flag(obj: &Value, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value.map(field_string).filter(|s| !s.is_empty())
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn transaction_status(obj: &Value) -> PaymentStatus {
    if flag(obj, "is_voided") || flag(obj, "is_refunded") {
        PaymentStatus::Failed
    } else if flag(obj, "success") {
        PaymentStatus::Success
    } else if flag(obj, "pending") {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Failed
    }
}

fn parse_transaction(event: String, obj: Value, raw: Value) -> WebhookPayload {
    let mut payload = WebhookPayload::new(ProviderId::Paymob, event, raw);
    payload.status = transaction_status(&obj);
    payload.transaction_id = non_empty(obj.get("id"));
    payload.order_id = non_empty(lookup(&obj, "order.id"));
    payload.amount_in_cents = match obj.get("amount_cents") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    payload.currency = non_empty(obj.get("currency"));
    payload.payment_method = non_empty(lookup(&obj, "source_data.type"));
    payload.card_brand = non_empty(lookup(&obj, "source_data.sub_type")).map(|b| b.to_ascii_lowercase());
    payload.card_last_four = lookup(&obj, "source_data.pan")
        .map(field_string)
        .and_then(|pan| last_four(&pan).as_str().map(str::to_string));

    let merchant_order = non_empty(lookup(&obj, "order.merchant_order_id"))
        .or_else(|| non_empty(obj.get("merchant_order_id")))
        .or_else(|| non_empty(lookup(&obj, "payment_key_claims.extra.special_reference")));
    if let Some(reference) = merchant_order.as_deref().and_then(CorrelationReference::parse) {
        payload.academy_id = Some(reference.academy_id);
        payload.payment_id = reference.payment_id();
    }

    let extras = lookup(&obj, "payment_key_claims.extra");
    if let Some(payment_id) = extras.and_then(|e| as_u64(e.get("payment_id"))) {
        payload.payment_id = Some(payment_id);
    }
    if let Some(academy_id) = extras.and_then(|e| as_u64(e.get("academy_id"))) {
        payload.academy_id = Some(academy_id);
    }
    payload
}

fn parse_token(obj: Value, raw: Value) -> WebhookPayload {
    let mut payload = WebhookPayload::new(ProviderId::Paymob, EVENT_TOKEN, raw);
    payload.status = PaymentStatus::Success;
    payload.transaction_id = non_empty(obj.get("id"));
    payload.order_id = non_empty(obj.get("order_id"));
    payload.card_token = non_empty(obj.get("token"));

    let masked_pan = obj.get("masked_pan").map(field_string).unwrap_or_default();
    payload.card_brand = non_empty(obj.get("card_subtype"))
        .map(|b| b.to_ascii_lowercase())
        .or_else(|| detect_card_brand(&masked_pan).map(str::to_string));
    payload.card_last_four = last_four(&masked_pan).as_str().map(str::to_string);
    payload.payment_method = Some("card".to_string());
    payload
}
