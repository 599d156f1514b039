//! Streaming text generation with Rig's Ollama provider.

use std::pin::Pin;

use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use rig::streaming::StreamedAssistantContent;
use tracing::debug;

use crate::chat::parts::{render_prompt, UserContent};
use crate::core::config::LlmConfig;
use crate::core::errors::{GenerationError, GenerationResult};
use crate::llm::generator::{GenerationFuture, TextGenerator, TextStream};

type OllamaCompletionModel = ollama::CompletionModel<ReqwestClient>;
type OllamaStreamingResponse = rig::streaming::StreamingCompletionResponse<
    <OllamaCompletionModel as CompletionModel>::StreamingResponse,
>;

/// [`TextGenerator`] backed by an Ollama completion model.
#[derive(Clone)]
pub struct OllamaGenerator {
    model: OllamaCompletionModel,
    model_name: String,
    temperature: f64,
}

impl OllamaGenerator {
    /// Build a generator from config.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &LlmConfig) -> GenerationResult<Self> {
        let mut builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url);
        }
        let client = builder.build()?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model,
            model_name: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Name of the configured model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl TextGenerator for OllamaGenerator {
    fn start(
        &self,
        parts: Vec<UserContent>,
    ) -> GenerationFuture<'_, GenerationResult<Box<dyn TextStream>>> {
        Box::pin(async move {
            let prompt = render_prompt(&parts);
            let request = self
                .model
                .completion_request(prompt)
                .temperature(self.temperature)
                .build();

            debug!(model = %self.model_name, parts = parts.len(), "Opening completion stream");
            let response = self.model.stream(request).await?;
            let stream: Box<dyn TextStream> = Box::new(OllamaTextStream {
                inner: Box::pin(response),
                received: String::new(),
            });
            Ok(stream)
        })
    }
}

struct OllamaTextStream {
    inner: Pin<Box<OllamaStreamingResponse>>,
    received: String,
}

impl TextStream for OllamaTextStream {
    fn next_delta(&mut self) -> GenerationFuture<'_, GenerationResult<Option<String>>> {
        Box::pin(async move {
            while let Some(item) = self.inner.next().await {
                // Tool calls, reasoning and the provider's final frame carry no reply text.
                if let StreamedAssistantContent::Text(text) = item.map_err(GenerationError::from)? {
                    self.received.push_str(&text.text);
                    return Ok(Some(text.text));
                }
            }
            Ok(None)
        })
    }

    fn final_text(&self) -> String {
        let aggregated = extract_text(&self.inner.choice);
        if aggregated.is_empty() {
            self.received.clone()
        } else {
            aggregated
        }
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}

