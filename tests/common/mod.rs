//! Offline transport shared by the integration tests

use academy_payments::error::{AppError, AppResult, InfrastructureError};
use academy_payments::payments::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answers requests from a queue and remembers what was sent
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<(u16, Value)>>,
    sent: Mutex<Vec<HttpRequest>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) -> &Self {
        self.responses.lock().unwrap().push_back((status, body));
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        self.sent.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some((status, body)) => Ok(HttpResponse::new(
                StatusCode::from_u16(status).unwrap(),
                body.to_string(),
            )),
            None => Err(AppError::new(InfrastructureError::HttpClient {
                message: "connection refused".to_string(),
            })),
        }
    }
}
