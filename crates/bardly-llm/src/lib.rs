//! Client for OpenAI-compatible chat completion endpoints.

pub mod client;
pub mod error;
pub mod types;

pub use client::{CompletionClient, OpenAiClient, DEFAULT_BASE_URL};
pub use error::LlmError;
pub use types::{ChatMessage, Completion, CompletionRequest, Role};
