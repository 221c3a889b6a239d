//! Generator clients

pub mod openai;

pub use openai::{GeneratorConfig, OpenAiGenerator, Provider, DEFAULT_MODEL};
