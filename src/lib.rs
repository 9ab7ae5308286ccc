//! # icd10-extract
//!
//! Extract ICD-10 diagnosis codes from photographs of handwritten medical
//! documents using Vision Language Models (VLMs).
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (JPEG / PNG, ≤ 10 MiB)
//!  │
//!  ├─ 1. Validate  extension, size, decode; no model call yet
//!  ├─ 2. Extract   one vision call → free-text findings
//!  ├─ 3. Resolve   one text call → CODE:/DIAGNOSIS:/REASON: blocks → records
//!  ├─ 4. Lookup    optional ICD-10-CM terminology search per diagnosis
//!  └─ 5. Output    findings + ordered code records (+ database matches)
//! ```
//!
//! Steps 2 and 3 fail hard (one attempt, bounded by a timeout). Step 4 and
//! malformed model output degrade instead: fewer records, empty match
//! lists, and a logged warning.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use icd10_extract::{analyze_image, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = AnalysisConfig::default();
//!     let output = analyze_image("discharge_note.jpg", &config).await?;
//!     for code in &output.icd_codes {
//!         println!("{} {:?}", code.code, code.diagnosis);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! The model calls sit behind [`VisionCompletionService`] and
//! [`TextCompletionService`]; [`Icd10Analyzer::new`] accepts any
//! implementation, so canned responses exercise the whole pipeline.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `icd10-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod services;
pub mod terminology;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_image, analyze_sync, analyze_to_file, default_result_path, Icd10Analyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::{ErrorKind, Icd10Error, ParseWarning, Stage};
pub use output::{AnalysisOutput, AnalysisStats, CodeRecord, CrossReference, TerminologyMatch};
pub use pipeline::input::{ImageUpload, ValidatedImage};
pub use pipeline::ocr::OllamaOcrService;
pub use pipeline::parse::{parse_code_records, ParseOutcome};
pub use progress::{AnalysisProgressCallback, AnalysisStep, NoopProgressCallback, ProgressCallback};
pub use services::{
    Completion, LlmService, ServiceError, TextCompletionService, VisionCompletionService,
};
pub use terminology::{ClinicalTablesClient, TerminologySearch};
