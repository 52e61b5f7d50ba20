//! Shared gateway base: HTTP execution, credential checks and log redaction
//!
//! Every adapter talks to its provider through [`GatewayHttp`], which wraps an
//! [`HttpTransport`]. Calls never fail with an error: the outcome is always an
//! [`ApiResponse`] envelope the adapter inspects.

use crate::config::{GatewaySettings, HttpConfig};
use crate::error::{AppError, AppResult, ExternalError, InfrastructureError};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Field names (lower-case) whose values never reach the logs
const REDACTED_FIELDS: &[&str] = &[
    "api_key",
    "apikey",
    "secret_key",
    "secret",
    "webhook_secret",
    "hmac_secret",
    "password",
    "token",
    "auth_token",
    "payment_token",
    "card_token",
    "saved_card_token",
    "identifier",
    "client_secret",
    "authorization",
    "card_number",
    "number",
    "pan",
    "cvv",
    "cvc",
    "card_cvn",
    "expiry",
    "expiry_month",
    "expiry_year",
    "card_expiry_mm",
    "card_expiry_yy",
    "hmac",
    "signaturehash",
    "hashstring",
];

/// Recursively blank deny-listed fields (case-insensitive)
///
/// Applying it twice yields the same value as applying it once.
pub fn redact(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let lower = key.to_ascii_lowercase();
                    if REDACTED_FIELDS.contains(&lower.as_str()) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// True when every required key is present and non-blank
pub fn is_configured(settings: &dyn GatewaySettings, required_keys: &[&str]) -> bool {
    required_keys.iter().all(|key| {
        settings
            .value(key)
            .is_some_and(|value| !value.trim().is_empty())
    })
}

/// Production URL only when sandbox is explicitly disabled
pub fn resolve_base_url(settings: &dyn GatewaySettings) -> String {
    let url = match settings.sandbox() {
        Some(false) => settings.base_url(),
        _ => settings.sandbox_url(),
    };
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Wire-level seam between the gateways and the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request; transport failures (timeouts, DNS, TLS) are errors,
    /// HTTP error statuses are not
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse>;
}

/// `reqwest`-backed transport with a fixed per-request timeout
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Outcome of a provider call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub success: bool,
    /// `None` when no HTTP response was received
    pub status: Option<u16>,
    /// Parsed JSON body, `Null` when the body was empty or not JSON
    pub data: Value,
    pub raw: String,
    pub error: Option<String>,
}

impl ApiResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            data: Value::Null,
            raw: String::new(),
            error: Some(error.into()),
        }
    }

    fn from_http(response: HttpResponse) -> Self {
        let data = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let success = response.status.is_success();
        let error = (!success).then(|| {
            provider_message(&data)
                .unwrap_or_else(|| format!("HTTP {}", response.status.as_u16()))
        });
        Self {
            success,
            status: Some(response.status.as_u16()),
            data,
            raw: response.body,
            error,
        }
    }

    /// Best available error text, with `fallback` when the call succeeded at
    /// the HTTP level but the body said otherwise
    pub fn error_message(&self, fallback: &str) -> String {
        self.error
            .clone()
            .or_else(|| provider_message(&self.data))
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Deserialize the body; anything that does not fit `T` is a malformed
    /// response from `provider`
    pub fn decode<T: DeserializeOwned>(&self, provider: &str) -> AppResult<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| AppError::malformed(provider, e.to_string()))
    }

    /// Body to store on results: the parsed JSON or, failing that, the raw text
    pub fn body(&self) -> Value {
        if self.data.is_null() && !self.raw.is_empty() {
            Value::String(self.raw.clone())
        } else {
            self.data.clone()
        }
    }
}

fn provider_message(data: &Value) -> Option<String> {
    ["message", "detail", "error", "errors"]
        .iter()
        .find_map(|key| match data.get(key) {
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
}

/// Whether `id` is safe to interpolate into a URL path
///
/// Provider ids are alphanumeric with underscores; anything else is rejected
/// rather than escaped.
pub fn is_path_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Error for a non-success status; throttling and server errors are retryable
fn status_error(provider: &str, status: StatusCode) -> Option<AppError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(AppError::new(ExternalError::RateLimit {
            provider: provider.to_string(),
        }))
    } else {
        Some(AppError::new(ExternalError::PaymentProvider {
            provider: provider.to_string(),
            message: format!("HTTP {}", status.as_u16()),
            is_retryable: status.is_server_error(),
        }))
    }
}

/// HTTP executor bound to one provider's base URL and default headers
#[derive(Clone)]
pub struct GatewayHttp {
    provider: &'static str,
    base_url: String,
    default_headers: HeaderMap,
    transport: Arc<dyn HttpTransport>,
    max_read_attempts: u32,
    backoff: Duration,
}

impl GatewayHttp {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        config: &HttpConfig,
    ) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers,
            transport,
            max_read_attempts: config.max_read_attempts.max(1),
            backoff: config.backoff(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Absolute URL with percent-encoded query parameters
    pub fn url_with_query(&self, endpoint: &str, query: &[(&str, &str)]) -> String {
        let base = self.url(endpoint);
        match reqwest::Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(query.iter().copied());
                url.to_string()
            }
            Err(_) => base,
        }
    }

    /// Issue a call; only GET is retried
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> ApiResponse {
        let retryable = method == Method::GET;
        self.run(method, endpoint, data, headers, retryable).await
    }

    /// Issue a read-only call that the provider exposes as a POST; retried
    /// like a GET
    pub async fn execute_read(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> ApiResponse {
        self.run(method, endpoint, data, headers, true).await
    }

    async fn run(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        headers: &[(&str, &str)],
        retryable: bool,
    ) -> ApiResponse {
        let request = match self.build_request(method, endpoint, data, headers) {
            Ok(request) => request,
            Err(e) => {
                error!("{} request could not be built: {}", self.provider, e);
                return ApiResponse::failure(e.to_string());
            }
        };

        let logged_body = request.body.as_ref().map(redact).unwrap_or(Value::Null);
        debug!(
            provider = self.provider,
            method = %request.method,
            url = %request.url,
            body = %logged_body,
            "Sending gateway request"
        );

        let attempts = if retryable { self.max_read_attempts } else { 1 };
        let mut attempt = 1;
        loop {
            let outcome = self.transport.send(request.clone()).await;
            let failure = match &outcome {
                Ok(response) => status_error(self.provider, response.status),
                Err(e) => Some(e.clone()),
            };

            if let Some(e) = failure.filter(|e| retryable && e.is_retryable()) {
                if attempt < attempts {
                    warn!(
                        "{} call failed, retrying after {:?} (attempt {}): {}",
                        self.provider, self.backoff, attempt, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            }

            return match outcome {
                Ok(response) => {
                    let status = response.status;
                    let envelope = ApiResponse::from_http(response);
                    info!(
                        "{} {} {} -> {}",
                        self.provider,
                        request.method,
                        endpoint,
                        status.as_u16()
                    );
                    debug!(
                        provider = self.provider,
                        response = %redact(&envelope.data),
                        "Gateway response"
                    );
                    envelope
                }
                Err(e) => {
                    error!(
                        "{} {} {} failed after {} attempt(s): {}",
                        self.provider, request.method, endpoint, attempt, e
                    );
                    ApiResponse::failure(e.to_string())
                }
            };
        }
    }

    fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> AppResult<HttpRequest> {
        let mut merged = self.default_headers.clone();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                AppError::new(InfrastructureError::HttpClient {
                    message: format!("invalid header name '{}': {}", name, e),
                })
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                AppError::new(InfrastructureError::HttpClient {
                    message: format!("invalid value for header '{}': {}", name, e),
                })
            })?;
            merged.insert(name, value);
        }

        Ok(HttpRequest {
            method,
            url: self.url(endpoint),
            headers: merged,
            body: data.cloned(),
        })
    }
}
