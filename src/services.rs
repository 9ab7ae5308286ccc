//! Capability interfaces for the external model calls.
//!
//! The pipeline never talks to a model SDK directly. It talks to
//! [`VisionCompletionService`] (prompt + image → text) and
//! [`TextCompletionService`] (prompt → text), so the parsing and validation
//! logic can be driven by canned responses in tests. [`LlmService`] is the
//! production implementation of both, backed by an `edgequake_llm`
//! provider; [`crate::pipeline::ocr::OllamaOcrService`] is an OCR-engine
//! alternative for the vision side.

use crate::config::AnalysisConfig;
use crate::error::Icd10Error;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default model when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";
/// Default model for the Gemini provider.
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// A model response plus whatever usage accounting the backend reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    /// A completion with no token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Failure reported by a completion backend.
///
/// The pipeline wraps this into [`Icd10Error::ServiceFailed`] with the stage
/// attached; timeouts are enforced by the pipeline, not here.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// Prompt + image → free text.
#[async_trait]
pub trait VisionCompletionService: Send + Sync {
    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<Completion, ServiceError>;
}

/// Prompt → free text.
#[async_trait]
pub trait TextCompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, ServiceError>;
}

/// Both services over one `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Completion, ServiceError> {
        let response = self
            .provider
            .chat(messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

#[async_trait]
impl VisionCompletionService for LlmService {
    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<Completion, ServiceError> {
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image.clone()])];
        self.chat(&messages).await
    }
}

#[async_trait]
impl TextCompletionService for LlmService {
    async fn complete(&self, prompt: &str) -> Result<Completion, ServiceError> {
        let messages = vec![ChatMessage::user(prompt)];
        self.chat(&messages).await
    }
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("gemini") {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_MODEL
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Icd10Error> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Icd10Error::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), built through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`GEMINI_API_KEY`**, which wins over other keys when present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Only [`crate::analyze::Icd10Analyzer::from_config`] calls this; the
/// pipeline components themselves never look at the environment.
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, Icd10Error> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Icd10Error::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = AnalysisConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn gemini_gets_its_own_default_model() {
        assert_eq!(default_model_for("Gemini"), "gemini-2.5-flash");
        assert_eq!(default_model_for("openai"), "gpt-4.1-nano");
    }

    #[test]
    fn completion_text_has_no_usage() {
        let c = Completion::text("CODE: L72.0");
        assert_eq!(c.text, "CODE: L72.0");
        assert_eq!(c.input_tokens, 0);
    }
}
