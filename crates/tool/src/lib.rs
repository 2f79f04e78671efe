pub mod adapter;
pub mod backend;
pub mod http;

pub use adapter::{RetryPolicy, ToolAdapter};
pub use backend::{BoxFuture, CalculatorBackend, ScriptedBackend, ToolError};
pub use http::HttpCalculator;
