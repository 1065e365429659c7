//! Summary model backends.
//!
//! `create_provider` turns the `LLM_BACKEND` and API-key settings into an
//! `LlmProvider` that `LlmSummarizer` sends its one-shot summary request to.
//! Both hosted backends go through rig-core, wrapped by `RigAdapter`.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Hosted model used for email summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
}

impl LlmBackend {
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Summary model settings, present only when `SUMMARY_MODE=llm`.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Build the provider the summarizer talks to.
///
/// Fails only if the rig client cannot be constructed; `create_enricher`
/// falls back to the basic summarizer in that case.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = match config.backend {
        LlmBackend::OpenAi => openai_summarizer_model(config)?,
        LlmBackend::Anthropic => anthropic_summarizer_model(config)?,
    };
    tracing::info!(
        backend = config.backend.name(),
        model = %config.model,
        "Email summaries will use LLM backend"
    );
    Ok(provider)
}

fn client_error(backend: LlmBackend, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.name().to_string(),
        reason: format!("could not build summary client: {e}"),
    }
}

fn openai_summarizer_model(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(config.backend, e))?;
    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn anthropic_summarizer_model(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(config.backend, e))?;
    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
