//! Scripted transport for offline gateway tests

use crate::error::{AppError, AppResult, InfrastructureError};
use crate::payments::http::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued responses in order and records every request
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<AppResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).unwrap();
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body.to_string())));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(AppError::new(InfrastructureError::HttpClient {
                message: message.to_string(),
            })));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_body(&self) -> Value {
        self.requests
            .lock()
            .unwrap()
            .last()
            .and_then(|request| request.body.clone())
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AppError::new(InfrastructureError::HttpClient {
                message: "no scripted response".to_string(),
            }))
        })
    }
}
