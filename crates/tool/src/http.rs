//! HTTP calculator backend.
//!
//! Talks to a calculator service exposing `GET /health` and
//! `POST /calculate` with a JSON `{"expression": ...}` body.

use crate::backend::{BoxFuture, CalculatorBackend, ToolError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Wire types ──

#[derive(Serialize)]
struct CalculateRequest<'a> {
    expression: &'a str,
}

#[derive(Deserialize)]
struct CalculateResponse {
    result: f64,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

// ── Backend ──

/// Calculator reached over HTTP.
pub struct HttpCalculator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalculator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check_health(&self) -> bool {
        let resp = match self.client.get(self.endpoint("health")).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "health check failed");
                return false;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            return false;
        }
        resp.json::<HealthResponse>()
            .await
            .map(|h| h.status == "healthy")
            .unwrap_or(false)
    }

    async fn calculate(&self, expression: &str, timeout: Duration) -> Result<f64, ToolError> {
        let resp = self
            .client
            .post(self.endpoint("calculate"))
            .timeout(timeout)
            .json(&CalculateRequest { expression })
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        let status = resp.status();
        if status.is_success() {
            let body: CalculateResponse = resp
                .json()
                .await
                .map_err(|e| ToolError::Malformed(e.to_string()))?;
            return Ok(body.result);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(check_error(status, &text))
    }
}

fn map_transport(e: reqwest::Error, timeout: Duration) -> ToolError {
    if e.is_timeout() {
        ToolError::Timeout(timeout)
    } else {
        ToolError::Connection(e.to_string())
    }
}

/// Map a non-2xx response to a tool error. 4xx is terminal, 5xx transient.
fn check_error(status: reqwest::StatusCode, body: &str) -> ToolError {
    if status.is_client_error() {
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.detail)
            .unwrap_or_else(|_| body.trim().to_owned());
        ToolError::Rejected(detail)
    } else if status.is_server_error() {
        ToolError::Server { status: status.as_u16() }
    } else {
        ToolError::Malformed(format!("{status}: {body}"))
    }
}

impl CalculatorBackend for HttpCalculator {
    fn name(&self) -> &str {
        "http"
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.check_health())
    }

    fn compute<'a>(
        &'a self,
        expression: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<f64, ToolError>> {
        Box::pin(self.calculate(expression, timeout))
    }
}
