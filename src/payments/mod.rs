//! Payment gateway integration module
//!
//! This module provides a unified interface for the academy payment providers
//! (Paymob, EasyKash, Tap) so callers create, verify, refund and reconcile
//! payments without provider-specific branching.

pub mod codes;
pub mod currency;
pub mod http;
pub mod providers;
pub mod reference;
pub mod registry;
pub mod signature;
pub mod traits;
pub mod types;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

pub use currency::{Conversion, ExchangeRates, StaticExchangeRates};
pub use http::{redact, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use reference::CorrelationReference;
pub use registry::GatewayRegistry;
pub use traits::{
    PaymentGateway, SavedPaymentMethod, SupportsRefunds, SupportsTokenization, SupportsVoids,
    SupportsWebhooks,
};
pub use types::{
    CardData, ChargeContext, FlowType, Metadata, PaymentAction, PaymentIntent, PaymentItem,
    PaymentResult, PaymentStatus, ProviderId, TokenizationOptions, TokenizationResult,
    WebhookPayload,
};
pub use webhook::WebhookRequest;
