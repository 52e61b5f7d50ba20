//! Error types for the payment gateway layer
//!
//! Internal helpers propagate `AppError` with `?`. Public gateway operations
//! never return it: adapters convert every error into a failed
//! `PaymentResult` at their boundary.

use thiserror::Error;

/// Result type used by internal gateway helpers
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    /// The provider answered, but with an error
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    /// The provider throttled the request
    #[error("{provider} rate limited the request")]
    RateLimit { provider: String },

    /// The provider answered with a body we could not interpret
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("http client error: {message}")]
    HttpClient { message: String },
}

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("no exchange rate from {from} to {to}")]
    UnsupportedConversion { from: String, to: String },
}

#[derive(Debug, Clone, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: impl Into<AppErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::new(InfrastructureError::Configuration {
            message: message.into(),
        })
    }

    pub fn malformed<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(ExternalError::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::External(ExternalError::PaymentProvider {
                is_retryable: true,
                ..
            }) | AppErrorKind::External(ExternalError::RateLimit { .. })
                | AppErrorKind::Infrastructure(InfrastructureError::HttpClient { .. })
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(InfrastructureError::HttpClient {
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = AppError::configuration("PAYMENTS__PAYMOB__API_KEY is empty")
            .with_context("building registry");
        assert_eq!(
            err.to_string(),
            "configuration error: PAYMENTS__PAYMOB__API_KEY is empty (building registry)"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let retryable = AppError::new(ExternalError::PaymentProvider {
            provider: "Paymob".to_string(),
            message: "HTTP 503".to_string(),
            is_retryable: true,
        });
        assert!(retryable.is_retryable());

        let malformed = AppError::malformed("Tap", "missing id");
        assert!(!malformed.is_retryable());

        let throttled = AppError::new(ExternalError::RateLimit {
            provider: "Tap".to_string(),
        });
        assert!(throttled.is_retryable());
        assert!(!AppError::configuration("bad url").is_retryable());
    }
}
