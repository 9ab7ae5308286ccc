//! Findings Extractor: one vision call, image → free-text findings.
//!
//! The returned text is not parsed. The prompt asks for labelled lines
//! (`Diagnosis 1: ...`) because that shape makes the resolver's job easier,
//! but nothing here depends on the model complying.

use crate::config::AnalysisConfig;
use crate::error::{Icd10Error, Stage};
use crate::pipeline::call_service;
use crate::pipeline::encode::encode_image;
use crate::pipeline::input::ValidatedImage;
use crate::prompts::EXTRACTION_PROMPT;
use crate::services::VisionCompletionService;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the extractor read off the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Send the image with the extraction prompt and return the model's text.
///
/// # Errors
/// [`Icd10Error::ServiceFailed`] or [`Icd10Error::ServiceTimeout`] with
/// `stage = Extraction`. One attempt only.
pub async fn extract_findings(
    service: &dyn VisionCompletionService,
    image: &ValidatedImage,
    config: &AnalysisConfig,
) -> Result<Findings, Icd10Error> {
    let start = Instant::now();
    let prompt = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(EXTRACTION_PROMPT);
    let image_data = encode_image(image);

    let completion = call_service(
        Stage::Extraction,
        config.api_timeout_secs,
        service.complete_with_image(prompt, &image_data),
    )
    .await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    if completion.text.trim().is_empty() {
        warn!("Extractor returned empty findings for '{}'", image.filename);
    }
    debug!("Findings: {} chars", completion.text.chars().count());
    info!("Extraction finished in {}ms", duration_ms);

    Ok(Findings {
        text: completion.text,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms,
    })
}
