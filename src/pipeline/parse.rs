//! Line parser for the resolver's `CODE:/DIAGNOSIS:/REASON:` blocks.
//!
//! The grammar is deliberately forgiving. Each line is trimmed and classified
//! by prefix; anything that is not one of the three labelled lines is model
//! commentary and is skipped. The parser is a two-state machine:
//!
//! ```text
//!            CODE:                        CODE: (flush current, start new)
//!   Idle ───────────▶ Accumulating ◀──────────┐
//!    │                  │   │                 │
//!    │ DIAGNOSIS:/      │   └─────────────────┘
//!    │ REASON:          │ DIAGNOSIS:/REASON: set field
//!    ▼                  ▼
//!  dropped           end of input: flush
//! ```
//!
//! Prefixes are case-sensitive and values are kept verbatim apart from
//! surrounding whitespace. Incomplete records are still emitted, records
//! with an empty code are kept, and duplicates are not merged.

use crate::error::ParseWarning;
use crate::output::CodeRecord;

const CODE_PREFIX: &str = "CODE:";
const DIAGNOSIS_PREFIX: &str = "DIAGNOSIS:";
const REASON_PREFIX: &str = "REASON:";

/// Records in source order plus any format deviations encountered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub records: Vec<CodeRecord>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// One trimmed input line, classified by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Code(&'a str),
    Diagnosis(&'a str),
    Reason(&'a str),
    Other,
}

impl<'a> Line<'a> {
    fn classify(raw: &'a str) -> Self {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix(CODE_PREFIX) {
            Line::Code(rest.trim())
        } else if let Some(rest) = line.strip_prefix(DIAGNOSIS_PREFIX) {
            Line::Diagnosis(rest.trim())
        } else if let Some(rest) = line.strip_prefix(REASON_PREFIX) {
            Line::Reason(rest.trim())
        } else {
            Line::Other
        }
    }
}

enum State {
    Idle,
    Accumulating(CodeRecord),
}

struct Parser {
    state: State,
    outcome: ParseOutcome,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::Idle,
            outcome: ParseOutcome::default(),
        }
    }

    fn feed(&mut self, line_no: usize, line: Line<'_>) {
        match line {
            Line::Code(code) => {
                self.flush();
                if code.is_empty() {
                    self.outcome.warnings.push(ParseWarning::EmptyCode {
                        index: self.outcome.records.len(),
                    });
                }
                self.state = State::Accumulating(CodeRecord::new(code));
            }
            Line::Diagnosis(value) => match self.state {
                State::Accumulating(ref mut record) => record.diagnosis = Some(value.to_string()),
                State::Idle => self.orphan(line_no, "DIAGNOSIS"),
            },
            Line::Reason(value) => match self.state {
                State::Accumulating(ref mut record) => record.reason = Some(value.to_string()),
                State::Idle => self.orphan(line_no, "REASON"),
            },
            Line::Other => {}
        }
    }

    fn orphan(&mut self, line_no: usize, field: &str) {
        self.outcome.warnings.push(ParseWarning::OrphanField {
            line: line_no,
            field: field.to_string(),
        });
    }

    fn flush(&mut self) {
        if let State::Accumulating(record) = std::mem::replace(&mut self.state, State::Idle) {
            self.outcome.records.push(record);
        }
    }

    fn finish(mut self, response: &str) -> ParseOutcome {
        self.flush();
        if self.outcome.records.is_empty() && !response.trim().is_empty() {
            self.outcome.warnings.push(ParseWarning::NoCodes);
        }
        self.outcome
    }
}

/// Parse a resolver response into code records.
///
/// Never fails: a response without any `CODE:` line yields no records and a
/// [`ParseWarning::NoCodes`] warning. Line numbers in warnings are 1-based.
pub fn parse_code_records(response: &str) -> ParseOutcome {
    let mut parser = Parser::new();
    for (idx, raw) in response.lines().enumerate() {
        parser.feed(idx + 1, Line::classify(raw));
    }
    parser.finish(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(code: &str, diagnosis: Option<&str>, reason: Option<&str>) -> CodeRecord {
        CodeRecord {
            code: code.into(),
            diagnosis: diagnosis.map(Into::into),
            reason: reason.map(Into::into),
        }
    }

    #[test]
    fn two_complete_blocks() {
        let response = "CODE: L72.0\n\
                        DIAGNOSIS: Epidermal cyst\n\
                        REASON: Matches described subcutaneous mass\n\
                        CODE: J44.9\n\
                        DIAGNOSIS: COPD, unspecified\n\
                        REASON: Chronic cough noted";
        let out = parse_code_records(response);
        assert_eq!(
            out.records,
            vec![
                rec(
                    "L72.0",
                    Some("Epidermal cyst"),
                    Some("Matches described subcutaneous mass")
                ),
                rec("J44.9", Some("COPD, unspecified"), Some("Chronic cough noted")),
            ]
        );
        assert!(!out.is_degraded());
    }

    #[test]
    fn no_code_lines_yields_empty() {
        let out = parse_code_records("I could not read this document.");
        assert!(out.records.is_empty());
        assert_eq!(out.warnings, vec![ParseWarning::NoCodes]);
    }

    #[test]
    fn empty_response_yields_empty_without_warning() {
        let out = parse_code_records("   \n  ");
        assert!(out.records.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn orphan_fields_before_first_code_are_dropped() {
        let response = "DIAGNOSIS: Stray\nREASON: Also stray\nCODE: E11.9\nDIAGNOSIS: Type 2 diabetes";
        let out = parse_code_records(response);
        assert_eq!(out.records, vec![rec("E11.9", Some("Type 2 diabetes"), None)]);
        assert_eq!(
            out.warnings,
            vec![
                ParseWarning::OrphanField {
                    line: 1,
                    field: "DIAGNOSIS".into()
                },
                ParseWarning::OrphanField {
                    line: 2,
                    field: "REASON".into()
                },
            ]
        );
    }

    #[test]
    fn code_without_fields_is_kept_incomplete() {
        let out = parse_code_records("CODE: I10\nCODE: E78.5\nDIAGNOSIS: Hyperlipidemia");
        assert_eq!(
            out.records,
            vec![rec("I10", None, None), rec("E78.5", Some("Hyperlipidemia"), None)]
        );
    }

    #[test]
    fn empty_code_is_not_filtered() {
        let out = parse_code_records("CODE:\nDIAGNOSIS: Unknown");
        assert_eq!(out.records, vec![rec("", Some("Unknown"), None)]);
        assert_eq!(out.warnings, vec![ParseWarning::EmptyCode { index: 0 }]);
    }

    #[test]
    fn commentary_and_indentation_tolerated() {
        let response = "Here are the codes:\r\n\
                        \r\n   CODE:   l72.0  \r\n\
                        \tDIAGNOSIS: epidermal cyst\r\n\
                        Note: please verify.\r\n\
                        REASON:  lump on back ";
        let out = parse_code_records(response);
        assert_eq!(
            out.records,
            vec![rec("l72.0", Some("epidermal cyst"), Some("lump on back"))]
        );
    }

    #[test]
    fn prefixes_are_case_sensitive() {
        let out = parse_code_records("code: L72.0\nCode: L72.1");
        assert!(out.records.is_empty());
    }

    #[test]
    fn duplicates_are_preserved_in_order() {
        let out = parse_code_records("CODE: J44.9\nCODE: J44.9\nCODE: A00");
        let codes: Vec<_> = out.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["J44.9", "J44.9", "A00"]);
    }

    #[test]
    fn later_field_line_overwrites_earlier() {
        let out = parse_code_records("CODE: R05\nREASON: first\nREASON: second");
        assert_eq!(out.records[0].reason.as_deref(), Some("second"));
    }

    #[test]
    fn markdown_bold_labels_are_not_recognised() {
        let out = parse_code_records("**CODE:** L72.0");
        assert!(out.records.is_empty());
    }

    #[test]
    fn parsing_is_deterministic() {
        let response = "CODE: K35.80\nDIAGNOSIS: Acute appendicitis\nREASON: RLQ pain";
        assert_eq!(parse_code_records(response), parse_code_records(response));
    }
}
