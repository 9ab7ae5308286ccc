//! Prompts for the two model calls.
//!
//! Both prompts ask for labelled, line-oriented output. The extractor's
//! answer is kept as free text, but the resolver's answer is parsed with a
//! strict line-prefix grammar ([`crate::pipeline::parse`]), so the
//! `CODE:/DIAGNOSIS:/REASON:` block in [`DEFAULT_RESOLUTION_TEMPLATE`] is a
//! contract, not a suggestion. Change it and the parser stops finding records.
//!
//! Callers can override either prompt via [`crate::config::AnalysisConfig`].

/// Default instruction sent with the document image.
pub const EXTRACTION_PROMPT: &str = r#"Read this medical document carefully, paying particular attention to handwriting.

Extract ONLY:
1. Primary diagnosis (read the handwriting precisely)
2. Secondary diagnosis (if any)
3. Treatment (if any)
4. Surgery or procedure performed (if any)

Answer briefly, one item per line, in exactly this form:
Diagnosis 1: <text>
Diagnosis 2: <text or none>
Treatment: <text or none>
Surgery: <text or none>"#;

/// Default resolver template. `{findings}` and `{max_codes}` are substituted
/// by [`resolution_prompt`].
pub const DEFAULT_RESOLUTION_TEMPLATE: &str = r#"Medical findings:
{findings}

Task: Provide ONLY the most relevant ICD-10 codes (max {max_codes} codes).

For EACH code, respond EXACTLY as:
CODE: <ICD-10 code>
DIAGNOSIS: <condition name in English>
REASON: <one sentence why this code applies>

Rules:
- Use valid ICD-10 codes (e.g. L72.0 for Epidermal cyst)
- List the primary diagnosis first
- Codes must match what was actually diagnosed

Example:
CODE: J43.9
DIAGNOSIS: Emphysema, unspecified
REASON: Patient diagnosed with alveolar emphysema

Your response:"#;

/// Build the resolver prompt from a template and the (already truncated)
/// findings text.
pub fn resolution_prompt(template: Option<&str>, findings: &str, max_codes: usize) -> String {
    template
        .unwrap_or(DEFAULT_RESOLUTION_TEMPLATE)
        .replace("{max_codes}", &max_codes.to_string())
        .replace("{findings}", findings)
}

/// Cut `text` to at most `max_chars` characters, never splitting a char.
///
/// Handwritten-document findings are often Thai/English mixed, so this counts
/// chars rather than bytes.
pub fn truncate_findings(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_requests_labelled_lines() {
        for label in ["Diagnosis 1:", "Diagnosis 2:", "Treatment:", "Surgery:"] {
            assert!(EXTRACTION_PROMPT.contains(label), "missing {label}");
        }
    }

    #[test]
    fn resolution_prompt_embeds_findings_and_limit() {
        let p = resolution_prompt(None, "Diagnosis 1: epidermal cyst", 3);
        assert!(p.contains("Diagnosis 1: epidermal cyst"));
        assert!(p.contains("max 3 codes"));
        assert!(p.contains("CODE: <ICD-10 code>"));
        assert!(p.contains("DIAGNOSIS:"));
        assert!(p.contains("REASON:"));
        assert!(!p.contains("{findings}"));
    }

    #[test]
    fn custom_template_is_used() {
        let p = resolution_prompt(Some("F={findings}"), "x", 5);
        assert_eq!(p, "F=x");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let thai = "วินิจฉัย cyst";
        let cut = truncate_findings(thai, 3);
        assert_eq!(cut.chars().count(), 3);
        assert_eq!(truncate_findings("short", 100), "short");
        assert_eq!(truncate_findings("abcdef", 3), "abc");
    }
}
