//! Output types returned by the analysis pipeline.
//!
//! Everything here is plain data with `serde` derives so a caller can hand
//! an [`AnalysisOutput`] straight to `serde_json` (the CLI's `--json` mode
//! and [`crate::analyze::analyze_to_file`] do exactly that).

use crate::error::ParseWarning;
use serde::{Deserialize, Serialize};

/// One candidate ICD-10 code suggested by the resolver model.
///
/// Fields absent from the model's response stay `None`; nothing is inferred.
/// `code` is stored verbatim (trimmed only) and may be empty when the model
/// wrote a bare `CODE:` line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CodeRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            diagnosis: None,
            reason: None,
        }
    }

    pub fn with_diagnosis(mut self, diagnosis: impl Into<String>) -> Self {
        self.diagnosis = Some(diagnosis.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A `[code, description]` pair returned by the terminology service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminologyMatch {
    pub code: String,
    pub description: String,
}

/// Terminology matches for one AI-suggested record, side by side.
///
/// No attempt is made to decide which code is right; that is the
/// reviewer's call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// The code the resolver model suggested.
    pub ai_code: String,
    /// The diagnosis label that was sent as the search query.
    pub diagnosis: String,
    /// Database matches, best first. Empty when the lookup failed.
    pub matches: Vec<TerminologyMatch>,
}

impl CrossReference {
    /// Whether any database match carries exactly the AI-suggested code.
    pub fn agrees(&self) -> bool {
        self.matches
            .iter()
            .any(|m| m.code.eq_ignore_ascii_case(&self.ai_code))
    }
}

/// Timing and token statistics for one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub image_bytes: u64,
    pub extraction_ms: u64,
    pub resolution_ms: u64,
    pub lookup_ms: u64,
    pub total_duration_ms: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// The full result of analysing one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Always `true` on the `Ok` path; kept for wire compatibility with
    /// consumers that check it.
    pub success: bool,
    /// Free-text findings read off the document (untruncated).
    pub findings: String,
    /// Code records in the order the model listed them.
    pub icd_codes: Vec<CodeRecord>,
    /// Terminology matches per record; empty when lookup is disabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cross_references: Vec<CrossReference>,
    /// Format deviations found while parsing the resolver response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_warnings: Vec<ParseWarning>,
    pub stats: AnalysisStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_omitted_from_json() {
        let rec = CodeRecord::new("L72.0");
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"code":"L72.0"}"#);
    }

    #[test]
    fn record_deserialises_without_optional_fields() {
        let rec: CodeRecord = serde_json::from_str(r#"{"code":"J44.9"}"#).unwrap();
        assert_eq!(rec, CodeRecord::new("J44.9"));
    }

    #[test]
    fn cross_reference_agreement() {
        let xref = CrossReference {
            ai_code: "j44.9".into(),
            diagnosis: "COPD".into(),
            matches: vec![TerminologyMatch {
                code: "J44.9".into(),
                description: "Chronic obstructive pulmonary disease, unspecified".into(),
            }],
        };
        assert!(xref.agrees());

        let none = CrossReference {
            matches: vec![],
            ..xref
        };
        assert!(!none.agrees());
    }
}
