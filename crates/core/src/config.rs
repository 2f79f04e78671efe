use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use wren_tool::RetryPolicy;

const ENV_PREFIX: &str = "WREN_";

/// Engine parameters. Defaults apply per key when a value is missing or unparsable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCfg {
    // pattern matching
    pub max_utterance_bytes: usize,

    // calculator tool
    pub health_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    /// Remote calculator base URL. `None` uses the in-process calculator.
    pub calculator_url: Option<String>,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            max_utterance_bytes: 16 * 1024,
            health_timeout_ms: 2000,
            call_timeout_ms: 5000,
            max_retries: 2,
            retry_delay_ms: 1000,
            calculator_url: None,
        }
    }
}

impl EngineCfg {
    /// Load from `WREN_*` environment variables (`WREN_MAX_RETRIES` → `max_retries`).
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            max_utterance_bytes: get_or(m, "max_utterance_bytes", d.max_utterance_bytes),
            health_timeout_ms: get_or(m, "health_timeout_ms", d.health_timeout_ms),
            call_timeout_ms: get_or(m, "call_timeout_ms", d.call_timeout_ms),
            max_retries: get_or(m, "max_retries", d.max_retries),
            retry_delay_ms: get_or(m, "retry_delay_ms", d.retry_delay_ms),
            calculator_url: m
                .get("calculator_url")
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("max_utterance_bytes", self.max_utterance_bytes.to_string(), "Longest utterance scanned for patterns"),
            ("health_timeout_ms", self.health_timeout_ms.to_string(), "Calculator health check timeout ms"),
            ("call_timeout_ms", self.call_timeout_ms.to_string(), "Calculator call timeout ms"),
            ("max_retries", self.max_retries.to_string(), "Retries after a transient calculator failure"),
            ("retry_delay_ms", self.retry_delay_ms.to_string(), "Delay between calculator attempts ms"),
            ("calculator_url", self.calculator_url.clone().unwrap_or_else(|| "(local)".into()), "Calculator service base URL"),
        ]
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
