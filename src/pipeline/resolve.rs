//! Code Resolver: one text call, findings → ordered code records.
//!
//! Model failures are fatal; malformed model output is not. Whatever the
//! parser can recover is returned, and every deviation is logged and kept
//! as a [`ParseWarning`].

use crate::config::AnalysisConfig;
use crate::error::{Icd10Error, ParseWarning, Stage};
use crate::output::CodeRecord;
use crate::pipeline::call_service;
use crate::pipeline::clean::clean_findings;
use crate::pipeline::parse::parse_code_records;
use crate::prompts::{resolution_prompt, truncate_findings};
use crate::services::TextCompletionService;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parsed resolver output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub records: Vec<CodeRecord>,
    pub warnings: Vec<ParseWarning>,
    /// The raw model response, kept for debugging degraded parses.
    pub raw_response: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Build the resolver prompt for `findings`: cleaned, then cut to
/// `max_findings_chars`.
pub fn build_prompt(findings: &str, config: &AnalysisConfig) -> String {
    let cleaned = clean_findings(findings);
    let total = cleaned.chars().count();
    let truncated = truncate_findings(&cleaned, config.max_findings_chars);
    if total > config.max_findings_chars {
        debug!(
            "Findings truncated from {} to {} chars for the resolver prompt",
            total, config.max_findings_chars
        );
    }
    resolution_prompt(
        config.resolution_prompt.as_deref(),
        truncated,
        config.max_codes,
    )
}

/// Ask the text model for ICD-10 codes and parse its answer.
///
/// # Errors
/// [`Icd10Error::ServiceFailed`] or [`Icd10Error::ServiceTimeout`] with
/// `stage = Resolution`. Never fails on the content of the response.
pub async fn resolve_codes(
    service: &dyn TextCompletionService,
    findings: &str,
    config: &AnalysisConfig,
) -> Result<Resolution, Icd10Error> {
    let start = Instant::now();
    let prompt = build_prompt(findings, config);

    let completion = call_service(
        Stage::Resolution,
        config.api_timeout_secs,
        service.complete(&prompt),
    )
    .await?;

    let outcome = parse_code_records(&completion.text);
    for warning in &outcome.warnings {
        warn!("Resolver output degraded: {}", warning);
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Resolution finished in {}ms: {} codes",
        duration_ms,
        outcome.records.len()
    );

    Ok(Resolution {
        records: outcome.records,
        warnings: outcome.warnings,
        raw_response: completion.text,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms,
    })
}
