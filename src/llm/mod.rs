// LLM abstraction layer

pub mod anthropic;
pub mod ollama;
pub mod provider;

pub use provider::*;
