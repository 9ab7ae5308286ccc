//! OCR-engine backend for the extractor: a local model run through `ollama`.
//!
//! `ollama run <model> <image-path>` needs a file path, so the image is
//! written to a [`NamedTempFile`] for the duration of the call. The file is
//! deleted when the guard drops: on success, on a failed exit status, on a
//! timeout, and on panic.
//!
//! OCR models such as `scb10x/typhoon-ocr-3b` answer with a JSON object
//! whose `"natural language"` field holds the transcription. When stdout
//! carries such an object that field becomes the findings; otherwise the raw
//! stdout is used.
//!
//! The extraction prompt is not forwarded: OCR engines transcribe, they do
//! not follow instructions.

use crate::services::{Completion, ServiceError, VisionCompletionService};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Default OCR model pulled into the local ollama install.
pub const DEFAULT_OCR_MODEL: &str = "scb10x/typhoon-ocr-3b";

/// Runs a local OCR model through the `ollama` CLI.
#[derive(Debug, Clone)]
pub struct OllamaOcrService {
    program: String,
    model: String,
    timeout_secs: u64,
}

impl Default for OllamaOcrService {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_MODEL)
    }
}

impl OllamaOcrService {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            program: "ollama".to_string(),
            model: model.into(),
            timeout_secs: 120,
        }
    }

    /// Use a different executable (a wrapper script, a full path).
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn write_temp_image(&self, image: &ImageData) -> Result<NamedTempFile, ServiceError> {
        let bytes = STANDARD
            .decode(&image.data)
            .map_err(|e| ServiceError(format!("image payload is not base64: {e}")))?;
        let suffix = if image.mime_type == "image/png" {
            ".png"
        } else {
            ".jpg"
        };

        let mut tmp = tempfile::Builder::new()
            .prefix("icd10-ocr-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| ServiceError(format!("tempfile: {e}")))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| ServiceError(format!("tempfile write: {e}")))?;
        Ok(tmp)
    }
}

#[async_trait]
impl VisionCompletionService for OllamaOcrService {
    async fn complete_with_image(
        &self,
        _prompt: &str,
        image: &ImageData,
    ) -> Result<Completion, ServiceError> {
        // Dropped at the end of this scope on every path, deleting the file.
        let tmp = self.write_temp_image(image)?;
        info!("Running OCR model {} on {}", self.model, tmp.path().display());

        let child = Command::new(&self.program)
            .arg("run")
            .arg(&self.model)
            .arg(tmp.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_secs(self.timeout_secs), child)
            .await
            .map_err(|_| ServiceError(format!("OCR timed out after {}s", self.timeout_secs)))?
            .map_err(|e| ServiceError(format!("failed to run '{}': {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError(format!(
                "'{} run {}' exited with {}: {}",
                self.program,
                self.model,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("OCR stdout: {} bytes", stdout.len());
        Ok(Completion::text(natural_language_text(&stdout)))
    }
}

static RE_JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Pull the `"natural language"` field out of OCR stdout, falling back to
/// the trimmed stdout when there is no such JSON object.
pub fn natural_language_text(stdout: &str) -> String {
    RE_JSON_OBJECT
        .find(stdout)
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m.as_str()).ok())
        .and_then(|v| {
            v.get("natural language")
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_natural_language_field_is_extracted() {
        let stdout = "thinking...\n{\"natural language\": \"Dx: epidermal cyst\", \"figures\": []}\n";
        assert_eq!(natural_language_text(stdout), "Dx: epidermal cyst");
    }

    #[test]
    fn plain_stdout_passes_through() {
        assert_eq!(natural_language_text("  Dx: COPD \n"), "Dx: COPD");
    }

    #[test]
    fn malformed_json_falls_back_to_stdout() {
        let stdout = "{not json}";
        assert_eq!(natural_language_text(stdout), "{not json}");
    }

    fn jpeg_payload() -> ImageData {
        ImageData::new(STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn temp_file_removed_after_successful_run() {
        // `echo run <model> <path>` prints the temp path back to us.
        let svc = OllamaOcrService::new("typhoon").program("echo");
        let out = svc
            .complete_with_image("ignored", &jpeg_payload())
            .await
            .expect("echo succeeds");
        let path = out.text.split_whitespace().last().expect("path printed");
        assert!(path.contains("icd10-ocr-"), "got: {}", out.text);
        assert!(path.ends_with(".jpg"));
        assert!(!std::path::Path::new(path).exists(), "temp file leaked");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_exit_status_is_service_error() {
        let svc = OllamaOcrService::new("typhoon").program("false");
        let err = svc
            .complete_with_image("ignored", &jpeg_payload())
            .await
            .unwrap_err();
        assert!(err.0.contains("exited with"), "got: {err}");
    }

    #[tokio::test]
    async fn missing_program_is_service_error() {
        let svc = OllamaOcrService::new("typhoon").program("definitely-not-a-real-binary-xyz");
        let err = svc
            .complete_with_image("ignored", &jpeg_payload())
            .await
            .unwrap_err();
        assert!(err.0.contains("failed to run"), "got: {err}");
    }
}
