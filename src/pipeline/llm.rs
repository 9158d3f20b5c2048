//! Completion backends for note extraction.
//!
//! The extractor only needs "send a system and user turn, get text back",
//! so that is the whole [`CompletionBackend`] trait. [`LlmBackend`] adapts
//! any edgequake-llm provider to it; tests substitute scripted fakes.

use crate::config::PipelineConfig;
use crate::error::AdimeError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A source of chat completions.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Return the raw completion text for one system + user exchange.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AdimeError>;
}

/// [`CompletionBackend`] over an edgequake-llm provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AdimeError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| AdimeError::LlmApiError {
                message: format!("{}", e),
            })?;

        debug!(
            "Extraction call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Pick the completion backend for this configuration.
///
/// Returns `Ok(None)` when remote calls are disabled (no credential, or
/// placeholder mode). A pre-built `config.provider` wins. For "openai" the
/// provider is built from `config.api_key`, so the configured key is the one
/// that authenticates; other provider names go through the factory, which
/// reads that provider's own environment variables.
pub fn resolve_backend(
    config: &PipelineConfig,
) -> Result<Option<Arc<dyn CompletionBackend>>, AdimeError> {
    if !config.has_credentials() {
        debug!("No credentials or dev mode; remote extraction disabled");
        return Ok(None);
    }

    let provider: Arc<dyn LLMProvider> = match (config.provider.as_ref(), config.api_key()) {
        (Some(provider), _) => Arc::clone(provider),
        (None, Some(key)) if config.provider_name.eq_ignore_ascii_case("openai") => {
            Arc::new(OpenAIProvider::new(key).with_model(&config.model))
        }
        (None, _) => ProviderFactory::create_llm_provider(&config.provider_name, &config.model)
            .map_err(|e| AdimeError::ProviderNotConfigured {
                provider: config.provider_name.clone(),
                hint: format!("{e}"),
            })?,
    };
    debug!("Remote extraction via {} ({})", provider.name(), provider.model());

    Ok(Some(Arc::new(LlmBackend::new(provider, config))))
}
