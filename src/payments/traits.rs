//! Payment gateway trait definitions
//!
//! `PaymentGateway` is the contract every provider adapter implements.
//! Optional behaviour (webhooks, refunds, voids, tokenization) lives in
//! separate capability traits that callers discover through the `as_*`
//! accessors instead of branching on the provider.

use crate::payments::types::{
    CardData, ChargeContext, FlowType, Metadata, PaymentIntent, PaymentResult, ProviderId,
    TokenizationOptions, TokenizationResult, WebhookPayload,
};
use crate::payments::webhook::WebhookRequest;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

/// Trait for payment gateway implementations
///
/// `create_payment_intent` and `verify_payment` never fail: every problem,
/// including missing configuration and transport errors, comes back as a
/// failed `PaymentResult`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Stable machine name (`paymob`, `easykash`, `tap`)
    fn name(&self) -> &'static str {
        self.id().as_str()
    }

    fn display_name(&self) -> &'static str;

    /// True when every required credential is present and non-empty
    fn is_configured(&self) -> bool;

    fn supported_methods(&self) -> &'static [&'static str];

    fn flow_type(&self) -> FlowType;

    /// Start a payment
    ///
    /// The result is pending with a redirect or iframe action, or final when
    /// the charge completed server-side (saved card token).
    async fn create_payment_intent(&self, intent: &PaymentIntent) -> PaymentResult;

    /// Ask the provider for the current state of a transaction
    ///
    /// `data` carries callback parameters (query string or body) that some
    /// providers use to locate the transaction.
    async fn verify_payment(&self, transaction_id: &str, data: &Metadata) -> PaymentResult;

    fn as_webhooks(&self) -> Option<&dyn SupportsWebhooks> {
        None
    }

    fn as_refunds(&self) -> Option<&dyn SupportsRefunds> {
        None
    }

    fn as_voids(&self) -> Option<&dyn SupportsVoids> {
        None
    }

    fn as_tokenization(&self) -> Option<&dyn SupportsTokenization> {
        None
    }
}

/// Inbound webhook handling
pub trait SupportsWebhooks: Send + Sync {
    /// Check the delivery's HMAC; false whenever the secret is missing
    fn verify_webhook_signature(&self, request: &WebhookRequest) -> bool;

    /// Normalize the delivery; succeeds whether or not the signature verified
    fn parse_webhook_payload(&self, request: &WebhookRequest) -> WebhookPayload;

    /// Effective signing secret, `None` when not configured
    fn webhook_secret(&self) -> Option<&str>;

    fn supported_webhook_events(&self) -> &'static [&'static str];
}

#[async_trait]
pub trait SupportsRefunds: Send + Sync {
    /// Refund a captured transaction; `None` refunds the full amount
    async fn refund(
        &self,
        transaction_id: &str,
        amount_in_cents: Option<i64>,
        reason: Option<&str>,
    ) -> PaymentResult;

    fn supports_partial_refunds(&self) -> bool;

    /// How long after capture a refund is still accepted
    fn refund_window(&self) -> Duration;
}

#[async_trait]
pub trait SupportsVoids: Send + Sync {
    async fn void(&self, transaction_id: &str) -> PaymentResult;

    /// Whether the transaction can still be voided
    ///
    /// A cached transaction body, when given, is used instead of fetching it.
    async fn can_void(&self, transaction_id: &str, cached: Option<&Value>) -> bool;

    fn void_window(&self) -> Duration;
}

/// Card storage and recurring charges
#[async_trait]
pub trait SupportsTokenization: Send + Sync {
    fn supports_tokenization(&self) -> bool;

    fn supports_recurring(&self) -> bool {
        self.supports_tokenization()
    }

    /// Shortest allowed gap between two recurring charges
    fn min_recurring_interval(&self) -> Duration;

    /// Start a hosted card-capture session; the result carries an iframe action
    async fn create_tokenization_session(
        &self,
        user_id: u64,
        options: &TokenizationOptions,
    ) -> PaymentResult;

    /// Tokenize raw card fields server-side
    async fn tokenize_card(&self, card: &CardData, user_id: u64) -> TokenizationResult;

    async fn charge_token(
        &self,
        token: &str,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult;

    /// Charge a stored method; fails fast when it is unusable and marks it
    /// used only after a successful charge
    async fn charge_saved_method(
        &self,
        method: &mut dyn SavedPaymentMethod,
        amount_in_cents: i64,
        currency: &str,
        context: &ChargeContext,
    ) -> PaymentResult;

    async fn delete_token(&self, token: &str) -> bool;
}

/// Stored payment method owned by the caller's persistence layer
pub trait SavedPaymentMethod: Send + Sync {
    fn token(&self) -> &str;

    fn holder_name(&self) -> Option<&str> {
        None
    }

    fn billing_address(&self) -> Metadata {
        Metadata::new()
    }

    /// Not expired, not revoked
    fn is_usable(&self) -> bool;

    fn touch_last_used(&mut self);
}
