//! Analysis entry points: image → findings → ICD-10 codes → cross-references.
//!
//! One analysis is strictly sequential. Each model stage is a single
//! attempt under a timeout; a failure there aborts the run with no partial
//! result. The terminology step never aborts. An [`Icd10Analyzer`] holds no
//! per-request state, so one instance can serve concurrent callers.

use crate::config::AnalysisConfig;
use crate::error::Icd10Error;
use crate::output::{AnalysisOutput, AnalysisStats, CrossReference, TerminologyMatch};
use crate::pipeline::extract::{extract_findings, Findings};
use crate::pipeline::input::{self, ImageUpload, ValidatedImage};
use crate::pipeline::resolve::{resolve_codes, Resolution};
use crate::progress::AnalysisStep;
use crate::services::{resolve_provider, LlmService, TextCompletionService, VisionCompletionService};
use crate::terminology::{ClinicalTablesClient, TerminologySearch};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The two-stage extraction-and-coding pipeline plus optional enrichment.
#[derive(Clone)]
pub struct Icd10Analyzer {
    vision: Arc<dyn VisionCompletionService>,
    text: Arc<dyn TextCompletionService>,
    terminology: Option<Arc<dyn TerminologySearch>>,
    config: AnalysisConfig,
}

impl Icd10Analyzer {
    /// Build an analyzer from explicit services. No terminology lookup until
    /// [`Icd10Analyzer::with_terminology`] is called.
    pub fn new(
        vision: Arc<dyn VisionCompletionService>,
        text: Arc<dyn TextCompletionService>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            vision,
            text,
            terminology: None,
            config,
        }
    }

    /// Build an analyzer whose model calls go through one `edgequake_llm`
    /// provider (see [`resolve_provider`] for the lookup order) and, when
    /// `terminology_lookup` is on, the Clinical Tables client.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, Icd10Error> {
        let provider = resolve_provider(config)?;
        let llm = Arc::new(LlmService::new(provider, config));
        let mut analyzer = Self::new(llm.clone(), llm, config.clone());
        if config.terminology_lookup {
            analyzer.terminology = Some(Arc::new(ClinicalTablesClient::from_config(config)?));
        }
        Ok(analyzer)
    }

    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologySearch>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    /// Replace the vision backend, e.g. with [`crate::pipeline::ocr::OllamaOcrService`].
    pub fn with_vision(mut self, vision: Arc<dyn VisionCompletionService>) -> Self {
        self.vision = vision;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every ingress check on `upload`. No external call is made.
    pub async fn validate(&self, upload: ImageUpload) -> Result<ValidatedImage, Icd10Error> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || input::validate_image(upload, &config))
            .await
            .map_err(|e| Icd10Error::Internal(format!("validation task failed: {e}")))?
    }

    /// Findings Extractor: validate `upload`, then read it with the vision model.
    pub async fn extract(&self, upload: ImageUpload) -> Result<Findings, Icd10Error> {
        let image = self.validate(upload).await?;
        self.extract_validated(&image).await
    }

    async fn extract_validated(&self, image: &ValidatedImage) -> Result<Findings, Icd10Error> {
        self.step_start(AnalysisStep::Extract);
        let result = extract_findings(self.vision.as_ref(), image, &self.config).await;
        match &result {
            Ok(f) => self.step_complete(AnalysisStep::Extract, f.text.chars().count(), f.duration_ms),
            Err(e) => self.step_error(AnalysisStep::Extract, e),
        }
        result
    }

    /// Code Resolver: turn findings text into ordered code records.
    pub async fn resolve(&self, findings: &str) -> Result<Resolution, Icd10Error> {
        self.step_start(AnalysisStep::Resolve);
        let result = resolve_codes(self.text.as_ref(), findings, &self.config).await;
        match &result {
            Ok(r) => self.step_complete(AnalysisStep::Resolve, r.records.len(), r.duration_ms),
            Err(e) => self.step_error(AnalysisStep::Resolve, e),
        }
        result
    }

    /// Terminology Cross-Reference for one diagnosis label.
    ///
    /// Empty when no terminology backend is configured or the lookup fails.
    pub async fn lookup(&self, query: &str) -> Vec<TerminologyMatch> {
        match self.terminology {
            Some(ref t) => t.search(query, self.config.terminology_max_results).await,
            None => Vec::new(),
        }
    }

    /// Analyse an in-memory upload end to end.
    ///
    /// # Errors
    /// Input errors are returned before any model call. Service errors are
    /// returned after the single failed attempt of that stage.
    pub async fn analyze(&self, upload: ImageUpload) -> Result<AnalysisOutput, Icd10Error> {
        let total_start = Instant::now();
        info!("Analysing image: {} ({} bytes)", upload.filename, upload.size());

        // ── Step 1: Validate ─────────────────────────────────────────────────
        let image = self.validate(upload).await?;
        let image_bytes = image.bytes.len() as u64;

        // ── Step 2: Extract findings ─────────────────────────────────────────
        let findings = self.extract_validated(&image).await?;
        // The image is not needed past extraction.
        drop(image);

        // ── Step 3: Resolve codes ────────────────────────────────────────────
        let resolution = self.resolve(&findings.text).await?;

        // ── Step 4: Cross-reference (soft) ───────────────────────────────────
        let lookup_start = Instant::now();
        let cross_references = self.cross_reference(&resolution).await;
        let lookup_ms = lookup_start.elapsed().as_millis() as u64;

        let stats = AnalysisStats {
            image_bytes,
            extraction_ms: findings.duration_ms,
            resolution_ms: resolution.duration_ms,
            lookup_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            total_input_tokens: (findings.input_tokens + resolution.input_tokens) as u64,
            total_output_tokens: (findings.output_tokens + resolution.output_tokens) as u64,
        };

        info!(
            "Analysis complete: {} codes found, {}ms total",
            resolution.records.len(),
            stats.total_duration_ms
        );

        Ok(AnalysisOutput {
            success: true,
            findings: findings.text,
            icd_codes: resolution.records,
            cross_references,
            parse_warnings: resolution.warnings,
            stats,
        })
    }

    /// Analyse an image file on disk.
    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<AnalysisOutput, Icd10Error> {
        let upload = input::load_image_file(path, &self.config).await?;
        self.analyze(upload).await
    }

    /// Analyse an image file and write the JSON result to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn analyze_to_file(
        &self,
        path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<AnalysisOutput, Icd10Error> {
        let output = self.analyze_file(path).await?;
        write_json_atomic(output_path.as_ref(), &output).await?;
        Ok(output)
    }

    async fn cross_reference(&self, resolution: &Resolution) -> Vec<CrossReference> {
        let Some(ref terminology) = self.terminology else {
            return Vec::new();
        };

        self.step_start(AnalysisStep::CrossReference);
        let start = Instant::now();
        let mut refs = Vec::new();
        for record in &resolution.records {
            let Some(diagnosis) = record.diagnosis.as_deref().filter(|d| !d.trim().is_empty())
            else {
                continue;
            };
            let matches = terminology
                .search(diagnosis, self.config.terminology_max_results)
                .await;
            refs.push(CrossReference {
                ai_code: record.code.clone(),
                diagnosis: diagnosis.to_string(),
                matches,
            });
        }

        let total: usize = refs.iter().map(|r| r.matches.len()).sum();
        self.step_complete(
            AnalysisStep::CrossReference,
            total,
            start.elapsed().as_millis() as u64,
        );
        refs
    }

    fn step_start(&self, step: AnalysisStep) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_step_start(step);
        }
    }

    fn step_complete(&self, step: AnalysisStep, items: usize, elapsed_ms: u64) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_step_complete(step, items, elapsed_ms);
        }
    }

    fn step_error(&self, step: AnalysisStep, error: &Icd10Error) {
        warn!("{} failed: {}", step, error);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_step_error(step, &error.to_string());
        }
    }
}

/// Analyse an image file with a provider resolved from `config`.
///
/// This is the primary entry point for the library.
pub async fn analyze_image(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Icd10Error> {
    Icd10Analyzer::from_config(config)?.analyze_file(path).await
}

/// Analyse an image file and write the JSON result next to the caller's
/// chosen output path.
pub async fn analyze_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Icd10Error> {
    Icd10Analyzer::from_config(config)?
        .analyze_to_file(path, output_path)
        .await
}

/// Synchronous wrapper around [`analyze_image`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn analyze_sync(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Icd10Error> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Icd10Error::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_image(path, config))
}

/// Default result path for an image: `<stem>_result.json` in the current
/// directory.
pub fn default_result_path(image_path: &Path) -> std::path::PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    std::path::PathBuf::from(format!("{stem}_result.json"))
}

async fn write_json_atomic(path: &Path, output: &AnalysisOutput) -> Result<(), Icd10Error> {
    let json = serde_json::to_vec_pretty(output)
        .map_err(|e| Icd10Error::Internal(format!("Failed to serialise result: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Icd10Error::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| Icd10Error::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Icd10Error::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_path_uses_image_stem() {
        assert_eq!(
            default_result_path(Path::new("/tmp/S__29212816.jpg")),
            std::path::PathBuf::from("S__29212816_result.json")
        );
    }
}
