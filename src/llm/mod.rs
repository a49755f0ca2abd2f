pub mod client;
pub mod normalizer;
pub mod prompts;
pub mod retry;

pub use client::{clean_json_output, GeminiClient, LlmClient, LlmRequest};
pub use normalizer::Normalizer;
pub use retry::with_retries;
