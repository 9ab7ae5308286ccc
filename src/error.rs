//! Error types for the icd10-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Icd10Error`] — **Fatal**: the analysis cannot proceed at all
//!   (rejected upload, model call failed or timed out, provider not
//!   configured). Returned as `Err(Icd10Error)` from the `analyze*` functions.
//!
//! * [`ParseWarning`] — **Non-fatal**: the resolver model ignored part of the
//!   `CODE:/DIAGNOSIS:/REASON:` format. The affected lines are dropped and the
//!   warning is stored in [`crate::output::AnalysisOutput::parse_warnings`].
//!
//! A failed terminology lookup has no error value at all: it is logged and
//! becomes an empty match list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The two stages that make an external model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Image → findings text.
    Extraction,
    /// Findings text → code records.
    Resolution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => f.write_str("extraction"),
            Stage::Resolution => f.write_str("resolution"),
        }
    }
}

/// Coarse classification of an [`Icd10Error`].
///
/// Serving wrappers map these onto transport status codes: client input
/// errors are reported before any model call, service errors after exactly
/// one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, oversized or wrong-type image, or a missing required field.
    InvalidInput,
    /// A model call failed, timed out, or no provider is available.
    ExternalService,
    /// Configuration or local I/O problem.
    Internal,
}

/// All fatal errors returned by the icd10-extract library.
#[derive(Debug, Error)]
pub enum Icd10Error {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload carried no filename.
    #[error("No file selected: the upload has an empty filename")]
    MissingFilename,

    /// The upload contained zero bytes.
    #[error("Image '{filename}' is empty")]
    EmptyImage { filename: String },

    /// The filename extension is not on the allow-list.
    #[error("Invalid file type '{filename}'. Use one of: {allowed}")]
    UnsupportedExtension { filename: String, allowed: String },

    /// The upload is larger than `max_image_bytes`.
    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    /// The bytes could not be decoded as an image.
    #[error("Invalid image file '{filename}': {detail}")]
    UndecodableImage { filename: String, detail: String },

    /// The bytes decode, but as an encoding other than PNG or JPEG.
    #[error("Image '{filename}' is encoded as {format}, expected PNG or JPEG")]
    UnsupportedEncoding { filename: String, format: String },

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── External service errors ───────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call for a stage returned an error.
    #[error("AI service unavailable during {stage}: {detail}")]
    ServiceFailed { stage: Stage, detail: String },

    /// The model call for a stage exceeded `api_timeout_secs`.
    #[error("AI service timed out after {secs}s during {stage}")]
    ServiceTimeout { stage: Stage, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the JSON result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Icd10Error {
    /// Classify this error for callers that only care about who is at fault.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Icd10Error::MissingFilename
            | Icd10Error::EmptyImage { .. }
            | Icd10Error::UnsupportedExtension { .. }
            | Icd10Error::FileTooLarge { .. }
            | Icd10Error::UndecodableImage { .. }
            | Icd10Error::UnsupportedEncoding { .. }
            | Icd10Error::FileNotFound { .. }
            | Icd10Error::PermissionDenied { .. } => ErrorKind::InvalidInput,
            Icd10Error::ProviderNotConfigured { .. }
            | Icd10Error::ServiceFailed { .. }
            | Icd10Error::ServiceTimeout { .. } => ErrorKind::ExternalService,
            Icd10Error::OutputWriteFailed { .. }
            | Icd10Error::InvalidConfig(_)
            | Icd10Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }

    pub fn is_service_error(&self) -> bool {
        self.kind() == ErrorKind::ExternalService
    }
}

/// A non-fatal deviation from the resolver's response format.
///
/// Produced by [`crate::pipeline::parse::parse_code_records`]; the record
/// sequence is still returned, just with the offending lines left out.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// A `DIAGNOSIS:` or `REASON:` line appeared before any `CODE:` line.
    #[error("line {line}: {field} line before any CODE: line was dropped")]
    OrphanField { line: usize, field: String },

    /// A `CODE:` line had nothing after the prefix.
    #[error("record {index}: CODE: line has an empty code")]
    EmptyCode { index: usize },

    /// The response was non-empty but contained no `CODE:` line.
    #[error("response contained no CODE: lines")]
    NoCodes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_display() {
        let e = Icd10Error::FileTooLarge {
            size: 10_485_761,
            max: 10_485_760,
        };
        let msg = e.to_string();
        assert!(msg.contains("10485761"), "got: {msg}");
        assert!(msg.contains("10485760"), "got: {msg}");
    }

    #[test]
    fn service_timeout_display_names_stage() {
        let e = Icd10Error::ServiceTimeout {
            stage: Stage::Resolution,
            secs: 180,
        };
        assert!(e.to_string().contains("180s"));
        assert!(e.to_string().contains("resolution"));
    }

    #[test]
    fn input_errors_classify_as_invalid_input() {
        let errors = [
            Icd10Error::MissingFilename,
            Icd10Error::UnsupportedExtension {
                filename: "scan.GIF".into(),
                allowed: "jpg, jpeg, png".into(),
            },
            Icd10Error::FileNotFound {
                path: PathBuf::from("/nope.jpg"),
            },
        ];
        for e in &errors {
            assert!(e.is_invalid_input(), "{e} should be an input error");
            assert!(!e.is_service_error());
        }
    }

    #[test]
    fn service_errors_classify_as_external() {
        let e = Icd10Error::ServiceFailed {
            stage: Stage::Extraction,
            detail: "503".into(),
        };
        assert_eq!(e.kind(), ErrorKind::ExternalService);
        let e = Icd10Error::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "set GEMINI_API_KEY".into(),
        };
        assert!(e.is_service_error());
    }

    #[test]
    fn config_error_is_internal() {
        assert_eq!(
            Icd10Error::InvalidConfig("x".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn parse_warning_serialises_with_kind_tag() {
        let w = ParseWarning::OrphanField {
            line: 1,
            field: "DIAGNOSIS".into(),
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "orphan_field");
        assert_eq!(json["line"], 1);
    }
}
