//! Configuration types for ICD-10 extraction.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Credentials never live here: the pipeline
//! components receive an explicit provider (or explicit service objects via
//! [`crate::analyze::Icd10Analyzer::new`]), so the core can be exercised in
//! tests without touching process environment.

use crate::error::Icd10Error;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions accepted by default (compared case-insensitively).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// NLM Clinical Tables ICD-10-CM search endpoint.
pub const DEFAULT_TERMINOLOGY_URL: &str =
    "https://clinicaltables.nlm.nih.gov/api/icd10cm/v3/search";

/// Upper bound accepted by the builder for `max_codes`.
const MAX_CODES_LIMIT: usize = 10;

/// Configuration for one ICD-10 analysis.
///
/// # Example
/// ```rust
/// use icd10_extract::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .provider_name("ollama")
///     .model("qwen2.5vl:7b")
///     .max_codes(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// LLM model identifier, e.g. "gemini-2.5-flash", "qwen2.5vl:7b".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both model calls. Default: 0.0.
    ///
    /// Zero keeps the resolver deterministic: identical findings yield
    /// identical code lists.
    pub temperature: f32,

    /// Maximum tokens each model call may generate. Default: 2048.
    pub max_tokens: usize,

    /// How many codes the resolver prompt asks for at most. Default: 3.
    ///
    /// This bounds the prompt only; the parser keeps every block the model
    /// actually returns.
    pub max_codes: usize,

    /// Largest accepted image in bytes. Default: 10 MiB. Inclusive.
    pub max_image_bytes: u64,

    /// Lower-case filename extensions accepted at ingress.
    pub allowed_extensions: Vec<String>,

    /// Findings longer than this many chars are cut before being embedded
    /// in the resolver prompt. Default: 4000.
    pub max_findings_chars: usize,

    /// Per-model-call timeout in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,

    /// Custom resolution prompt template containing `{findings}` and
    /// optionally `{max_codes}`. If None, uses the built-in template.
    pub resolution_prompt: Option<String>,

    /// Query the terminology service for each resolved diagnosis. Default: true.
    pub terminology_lookup: bool,

    /// Terminology search endpoint.
    pub terminology_url: String,

    /// Matches requested per terminology query. Default: 3.
    pub terminology_max_results: usize,

    /// Terminology HTTP timeout in seconds. Default: 10.
    pub terminology_timeout_secs: u64,

    /// Optional per-step progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_codes: 3,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_findings_chars: 4000,
            api_timeout_secs: 180,
            extraction_prompt: None,
            resolution_prompt: None,
            terminology_lookup: true,
            terminology_url: DEFAULT_TERMINOLOGY_URL.to_string(),
            terminology_max_results: 3,
            terminology_timeout_secs: 10,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_codes", &self.max_codes)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("max_findings_chars", &self.max_findings_chars)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("terminology_lookup", &self.terminology_lookup)
            .field("terminology_url", &self.terminology_url)
            .field("terminology_max_results", &self.terminology_max_results)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `ext` (without the dot) is on the allow-list, ignoring case.
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_codes(mut self, n: usize) -> Self {
        self.config.max_codes = n;
        self
    }

    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_findings_chars(mut self, n: usize) -> Self {
        self.config.max_findings_chars = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn resolution_prompt(mut self, template: impl Into<String>) -> Self {
        self.config.resolution_prompt = Some(template.into());
        self
    }

    pub fn terminology_lookup(mut self, enabled: bool) -> Self {
        self.config.terminology_lookup = enabled;
        self
    }

    pub fn terminology_url(mut self, url: impl Into<String>) -> Self {
        self.config.terminology_url = url.into();
        self
    }

    pub fn terminology_max_results(mut self, n: usize) -> Self {
        self.config.terminology_max_results = n.max(1);
        self
    }

    pub fn terminology_timeout_secs(mut self, secs: u64) -> Self {
        self.config.terminology_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, Icd10Error> {
        let c = &self.config;
        if c.max_image_bytes == 0 {
            return Err(Icd10Error::InvalidConfig(
                "max_image_bytes must be ≥ 1".into(),
            ));
        }
        if c.max_codes == 0 || c.max_codes > MAX_CODES_LIMIT {
            return Err(Icd10Error::InvalidConfig(format!(
                "max_codes must be 1–{}, got {}",
                MAX_CODES_LIMIT, c.max_codes
            )));
        }
        if c.allowed_extensions.iter().all(|e| e.is_empty()) {
            return Err(Icd10Error::InvalidConfig(
                "At least one allowed extension is required".into(),
            ));
        }
        if c.max_findings_chars == 0 {
            return Err(Icd10Error::InvalidConfig(
                "max_findings_chars must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Icd10Error::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref template) = c.resolution_prompt {
            if !template.contains("{findings}") {
                return Err(Icd10Error::InvalidConfig(
                    "Custom resolution prompt must contain a {findings} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upload_policy() {
        let c = AnalysisConfig::default();
        assert_eq!(c.max_image_bytes, 10_485_760);
        assert_eq!(c.temperature, 0.0);
        assert!(c.allows_extension("jpg"));
        assert!(c.allows_extension("JPEG"));
        assert!(c.allows_extension("Png"));
        assert!(!c.allows_extension("gif"));
    }

    #[test]
    fn builder_rejects_zero_max_codes() {
        let err = AnalysisConfig::builder().max_codes(0).build().unwrap_err();
        assert!(err.to_string().contains("max_codes"));
    }

    #[test]
    fn builder_rejects_template_without_placeholder() {
        let err = AnalysisConfig::builder()
            .resolution_prompt("List ICD-10 codes please")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("{findings}"));
    }

    #[test]
    fn builder_normalises_extensions() {
        let c = AnalysisConfig::builder()
            .allowed_extensions([".PNG", "Webp"])
            .build()
            .unwrap();
        assert_eq!(c.allowed_extensions, vec!["png", "webp"]);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = AnalysisConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }
}
