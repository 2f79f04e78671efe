pub mod catalog;
pub mod cognition;
pub mod config;
pub mod dialogue;
pub mod engine;
pub mod memory;
pub mod types;

pub use engine::{Engine, EngineError, Session};
