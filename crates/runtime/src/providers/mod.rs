//! LLM provider backends.

mod openai;

pub use openai::{DEFAULT_MAX_TOKENS, OpenAiBackend, OpenAiBackendBuilder};
