//! Text generation behind a streaming, provider-agnostic interface.

pub mod generator;
pub mod ollama;

pub use generator::{GenerationFuture, TextGenerator, TextStream};
pub use ollama::OllamaGenerator;
