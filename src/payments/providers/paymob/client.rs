//! Low-level Paymob API client
//!
//! Owns the HTTP executor and the legacy auth-token handshake. Tokens are
//! fetched per operation and never cached.

use crate::config::PaymobConfig;
use crate::error::{AppError, AppResult, ExternalError};
use crate::payments::http::{ApiResponse, GatewayHttp};
use http::Method;
use serde_json::{json, Value};
use tracing::error;

pub(crate) const PROVIDER: &str = "Paymob";

pub struct PaymobClient {
    http: GatewayHttp,
    api_key: String,
    secret_key: String,
}

impl PaymobClient {
    pub fn new(http: GatewayHttp, config: &PaymobConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    pub fn http(&self) -> &GatewayHttp {
        &self.http
    }

    /// Exchange the API key for a short-lived auth token
    pub async fn auth_token(&self) -> AppResult<String> {
        let response = self
            .http
            .execute(
                Method::POST,
                "/api/auth/tokens",
                Some(&json!({ "api_key": self.api_key })),
                &[],
            )
            .await;

        let token = response
            .data
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty());

        match token {
            Some(token) if response.success => Ok(token.to_string()),
            _ => {
                let message = response.error_message("no auth token returned");
                error!("Paymob authentication failed: {}", message);
                Err(AppError::new(ExternalError::PaymentProvider {
                    provider: PROVIDER.to_string(),
                    message,
                    is_retryable: response.status.map_or(true, |status| status >= 500),
                }))
            }
        }
    }

    /// Call an intention endpoint authenticated with the secret key
    pub async fn post_with_secret(&self, endpoint: &str, body: &Value) -> ApiResponse {
        let authorization = format!("Token {}", self.secret_key);
        self.http
            .execute(
                Method::POST,
                endpoint,
                Some(body),
                &[("Authorization", authorization.as_str())],
            )
            .await
    }

    /// Legacy acceptance call carrying the auth token in the body
    pub async fn post_with_token(&self, endpoint: &str, auth_token: &str, body: Value) -> ApiResponse {
        self.http
            .execute(Method::POST, endpoint, Some(&with_auth_token(body, auth_token)), &[])
            .await
    }

    /// Read-only POST (inquiry) carrying the auth token in the body
    pub async fn read_with_token(&self, endpoint: &str, auth_token: &str, body: Value) -> ApiResponse {
        self.http
            .execute_read(Method::POST, endpoint, Some(&with_auth_token(body, auth_token)), &[])
            .await
    }

    /// Fetch a transaction by id
    pub async fn transaction(&self, transaction_id: &str, auth_token: &str) -> ApiResponse {
        let authorization = format!("Bearer {}", auth_token);
        self.http
            .execute(
                Method::GET,
                &format!("/api/acceptance/transactions/{}", transaction_id),
                None,
                &[("Authorization", authorization.as_str())],
            )
            .await
    }

    /// Hosted checkout URL for an intention's client secret
    pub fn checkout_url(&self, public_key: &str, client_secret: &str) -> String {
        self.http.url_with_query(
            "/unifiedcheckout/",
            &[("publicKey", public_key), ("clientSecret", client_secret)],
        )
    }
}

fn with_auth_token(mut body: Value, auth_token: &str) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("auth_token".to_string(), Value::from(auth_token));
    }
    body
}
