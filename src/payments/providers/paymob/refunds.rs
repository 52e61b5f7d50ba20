//! Paymob refunds, voids and transaction inquiry
//!
//! Paymob accepts refunds and voids at any age; the windows below are
//! enforced here.

use super::client::PaymobClient;
use super::processor::declined;
use crate::payments::codes;
use crate::payments::http::is_path_id;
use crate::payments::types::PaymentResult;
use crate::payments::webhook::{field_string, lookup};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub fn refund_window() -> Duration {
    Duration::days(30)
}

pub fn void_window() -> Duration {
    Duration::hours(24)
}

/// Why a transaction can or cannot be voided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoidEligibility {
    Eligible,
    AlreadyVoided,
    AlreadyRefunded,
    NotSuccessful,
    WindowElapsed,
    /// No usable creation time on the transaction
    Unknown,
}

/// Decide voidability from a transaction body without touching the network
pub fn void_eligibility(txn: &Value, now: DateTime<Utc>, window: Duration) -> VoidEligibility {
    let flag = |key: &str| match txn.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    if flag("is_voided") {
        return VoidEligibility::AlreadyVoided;
    }
    if flag("is_refunded") {
        return VoidEligibility::AlreadyRefunded;
    }
    if !flag("success") {
        return VoidEligibility::NotSuccessful;
    }

    match txn
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_created_at)
    {
        Some(created) if now - created > window => VoidEligibility::WindowElapsed,
        Some(_) => VoidEligibility::Eligible,
        None => VoidEligibility::Unknown,
    }
}

/// Paymob timestamps come with or without an offset; naive ones are UTC
pub(crate) fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

pub struct PaymobRefunds {
    client: Arc<PaymobClient>,
}

impl PaymobRefunds {
    pub fn new(client: Arc<PaymobClient>) -> Self {
        Self { client }
    }

    /// Refund; `None` refunds the full amount and sends no amount field
    pub async fn refund(
        &self,
        transaction_id: &str,
        amount_in_cents: Option<i64>,
        reason: Option<&str>,
    ) -> PaymentResult {
        if let Some(amount) = amount_in_cents.filter(|amount| *amount <= 0) {
            return PaymentResult::failed(
                codes::INVALID_ARGUMENT,
                format!("Refund amount must be positive, got {}", amount),
            )
            .with_transaction_id(transaction_id);
        }

        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => return auth_failed(transaction_id, e),
        };

        let mut body = json!({ "transaction_id": transaction_id });
        if let Some(amount) = amount_in_cents {
            body["amount_cents"] = Value::from(amount);
        }

        info!(
            transaction_id,
            amount_in_cents = ?amount_in_cents,
            reason = reason.unwrap_or(""),
            "Requesting Paymob refund"
        );

        let response = self
            .client
            .post_with_token("/api/acceptance/void_refund/refund", &token, body)
            .await;
        if !response.success {
            return PaymentResult::failed(
                codes::REFUND_FAILED,
                response.error_message("Refund request failed"),
            )
            .with_transaction_id(transaction_id)
            .with_raw(response.body());
        }

        let data = response.data;
        if data.get("success").and_then(Value::as_bool) != Some(true) {
            return declined(transaction_id, data)
                .with_localized_message(codes::localized_message(codes::REFUND_FAILED));
        }

        let refund_id = data.get("id").map(field_string).unwrap_or_default();
        let mut result = PaymentResult::success(refund_id)
            .with_metadata("parent_transaction_id", transaction_id)
            .with_metadata("full_refund", amount_in_cents.is_none())
            .with_metadata(
                "refunded_amount_cents",
                data.get("amount_cents").cloned().unwrap_or(Value::Null),
            );
        if let Some(reason) = reason {
            result = result.with_metadata("reason", reason);
        }
        result.with_raw(data)
    }

    /// Void a same-day transaction after re-checking eligibility
    pub async fn void(&self, transaction_id: &str) -> PaymentResult {
        if !self.can_void(transaction_id, None).await {
            return PaymentResult::failed(
                codes::VOID_NOT_ALLOWED,
                "Transaction cannot be voided (already voided/refunded or outside the void window)",
            )
            .with_transaction_id(transaction_id);
        }

        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => return auth_failed(transaction_id, e),
        };

        let response = self
            .client
            .post_with_token(
                "/api/acceptance/void_refund/void",
                &token,
                json!({ "transaction_id": transaction_id }),
            )
            .await;
        if !response.success {
            return PaymentResult::failed(codes::VOID_FAILED, response.error_message("Void request failed"))
                .with_transaction_id(transaction_id)
                .with_raw(response.body());
        }

        let data = response.data;
        if data.get("success").and_then(Value::as_bool) != Some(true) {
            return declined(transaction_id, data)
                .with_localized_message(codes::localized_message(codes::VOID_FAILED));
        }

        let void_id = data.get("id").map(field_string).unwrap_or_default();
        PaymentResult::success(void_id)
            .with_metadata("parent_transaction_id", transaction_id)
            .with_raw(data)
    }

    /// Whether the transaction is still voidable
    ///
    /// Uses `cached` when given; otherwise the transaction is fetched. Any
    /// lookup failure counts as not voidable.
    pub async fn can_void(&self, transaction_id: &str, cached: Option<&Value>) -> bool {
        let eligibility = match cached {
            Some(txn) => void_eligibility(txn, Utc::now(), void_window()),
            None if !is_path_id(transaction_id) => {
                warn!(transaction_id, "Paymob void check rejected an invalid transaction id");
                return false;
            }
            None => {
                let token = match self.client.auth_token().await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(transaction_id, "Paymob void check could not authenticate: {}", e);
                        return false;
                    }
                };
                let response = self.client.transaction(transaction_id, &token).await;
                if !response.success {
                    warn!(
                        transaction_id,
                        "Paymob void check could not fetch transaction: {}",
                        response.error_message("")
                    );
                    return false;
                }
                void_eligibility(&response.data, Utc::now(), void_window())
            }
        };

        if eligibility != VoidEligibility::Eligible {
            info!(transaction_id, ?eligibility, "Paymob transaction is not voidable");
        }
        eligibility == VoidEligibility::Eligible
    }

    /// Look a transaction up by the merchant order reference we sent
    pub async fn inquire_by_merchant_order(&self, merchant_order_id: &str) -> PaymentResult {
        let token = match self.client.auth_token().await {
            Ok(token) => token,
            Err(e) => return auth_failed("", e),
        };

        let response = self
            .client
            .read_with_token(
                "/api/ecommerce/orders/transaction_inquiry",
                &token,
                json!({ "merchant_order_id": merchant_order_id }),
            )
            .await;
        if !response.success {
            return PaymentResult::failed(codes::INQUIRY_FAILED, response.error_message("Inquiry failed"))
                .with_raw(response.body())
                .with_metadata("merchant_order_id", merchant_order_id);
        }

        let data = response.data;
        let transaction_id = data.get("id").map(field_string).unwrap_or_default();
        let order_id = lookup(&data, "order.id")
            .or_else(|| data.get("order"))
            .filter(|order| !order.is_object())
            .map(field_string)
            .unwrap_or_default();

        let is_pending = data.get("pending").and_then(Value::as_bool) == Some(true);
        let result = if data.get("success").and_then(Value::as_bool) == Some(true) {
            PaymentResult::success(transaction_id).with_raw(data)
        } else if is_pending {
            PaymentResult::pending(transaction_id).with_raw(data)
        } else {
            declined(&transaction_id, data)
        };
        result
            .with_gateway_order_id(order_id)
            .with_metadata("merchant_order_id", merchant_order_id)
    }
}

fn auth_failed(transaction_id: &str, error: crate::error::AppError) -> PaymentResult {
    PaymentResult::failed(
        codes::AUTH_FAILED,
        format!("Failed to authenticate with Paymob: {}", error),
    )
    .with_transaction_id(transaction_id)
}
