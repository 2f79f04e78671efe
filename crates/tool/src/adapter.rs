use crate::backend::{CalculatorBackend, ToolError};
use std::sync::Arc;
use std::time::Duration;

/// Timeouts and retry budget for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    pub health_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            health_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Tool adapter: health check, bounded per-call timeout, retry on transient failure.
///
/// Terminal errors (rejected input, malformed replies) are returned on the
/// first occurrence. Transient ones are retried with a fixed delay until the
/// budget runs out, then the last error surfaces.
#[derive(Clone)]
pub struct ToolAdapter {
    backend: Arc<dyn CalculatorBackend>,
    policy: RetryPolicy,
}

impl ToolAdapter {
    pub fn new(backend: Arc<dyn CalculatorBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Ask the backend for health. A check that outlives `health_timeout` counts as unhealthy.
    pub async fn is_healthy(&self) -> bool {
        match tokio::time::timeout(self.policy.health_timeout, self.backend.health()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    timeout_ms = self.policy.health_timeout.as_millis() as u64,
                    "health check timed out"
                );
                false
            }
        }
    }

    /// Evaluate `expression` through the backend.
    pub async fn call(&self, expression: &str) -> Result<f64, ToolError> {
        if !self.is_healthy().await {
            tracing::warn!(backend = self.backend.name(), "calculator backend unavailable");
            return Err(ToolError::Unavailable);
        }

        let attempts = self.policy.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.policy.call_timeout,
                self.backend.compute(expression, self.policy.call_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout(self.policy.call_timeout)),
            };

            match result {
                Ok(value) => {
                    tracing::debug!(
                        backend = self.backend.name(),
                        attempt,
                        expression,
                        value,
                        "tool call succeeded"
                    );
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    tracing::info!(
                        backend = self.backend.name(),
                        attempt,
                        error = %e,
                        "tool call rejected"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= attempts => {
                    tracing::warn!(
                        backend = self.backend.name(),
                        attempts,
                        error = %e,
                        "tool call failed, retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        backend = self.backend.name(),
                        attempt,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        error = %e,
                        "tool call failed, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }
}
