use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Boxed future returned by backend calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type for calculator tool calls.
///
/// Variants split into terminal (bad input, retrying cannot help) and
/// transient (the upstream may recover). See [`ToolError::is_transient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Calculator service is not available. Please ensure the server is running.")]
    Unavailable,
    /// 4xx equivalent: malformed expression, division by zero, validation failure.
    #[error("Calculation error: {0}")]
    Rejected(String),
    #[error("Calculator request timed out after {}s. Please try again.", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("Cannot connect to calculator service: {0}")]
    Connection(String),
    /// 5xx equivalent.
    #[error("Calculator service is experiencing issues (status {status}). Please try again later.")]
    Server { status: u16 },
    #[error("Unexpected response from calculator service: {0}")]
    Malformed(String),
}

impl ToolError {
    /// True if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_) | Self::Server { .. })
    }
}

/// The network tool boundary: a health check and a compute call.
pub trait CalculatorBackend: Send + Sync {
    fn name(&self) -> &str;

    fn health(&self) -> BoxFuture<'_, bool>;

    fn compute<'a>(
        &'a self,
        expression: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<f64, ToolError>>;
}

/// Scripted backend for tests. Replays queued results in order.
///
/// Once the script is drained every further call returns `fallback`.
#[derive(Debug)]
pub struct ScriptedBackend {
    healthy: bool,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Result<f64, ToolError>>>,
    fallback: Result<f64, ToolError>,
    calls: AtomicUsize,
    health_checks: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<f64, ToolError>>) -> Self {
        Self {
            healthy: true,
            delay: None,
            script: Mutex::new(script.into()),
            fallback: Err(ToolError::Connection("script exhausted".into())),
            calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
        }
    }

    /// Backend that returns the same result on every call.
    pub fn always(result: Result<f64, ToolError>) -> Self {
        let mut backend = Self::new(Vec::new());
        backend.fallback = result;
        backend
    }

    /// Report unhealthy on every check.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Sleep before answering each compute call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of compute calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of health checks received.
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

impl CalculatorBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy;
        Box::pin(async move { healthy })
    }

    fn compute<'a>(
        &'a self,
        _expression: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<f64, ToolError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            next
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_not_transient() {
        assert!(!ToolError::Rejected("Division by zero is not allowed".into()).is_transient());
        assert!(!ToolError::Malformed("missing result".into()).is_transient());
        assert!(!ToolError::Unavailable.is_transient());
    }

    #[test]
    fn network_errors_are_transient() {
        assert!(ToolError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ToolError::Connection("connection refused".into()).is_transient());
        assert!(ToolError::Server { status: 503 }.is_transient());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let msg = ToolError::Rejected("Division by zero is not allowed".into()).to_string();
        assert_eq!(msg, "Calculation error: Division by zero is not allowed");
        let msg = ToolError::Timeout(Duration::from_secs(5)).to_string();
        assert!(msg.contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new(vec![
            Err(ToolError::Server { status: 500 }),
            Ok(8.0),
        ]);
        let timeout = Duration::from_secs(1);
        assert_eq!(
            backend.compute("5 + 3", timeout).await,
            Err(ToolError::Server { status: 500 })
        );
        assert_eq!(backend.compute("5 + 3", timeout).await, Ok(8.0));
        assert!(backend.compute("5 + 3", timeout).await.is_err());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn unhealthy_backend_reports_false() {
        let backend = ScriptedBackend::always(Ok(1.0)).unhealthy();
        assert!(!backend.health().await);
        assert_eq!(backend.health_checks(), 1);
    }
}
