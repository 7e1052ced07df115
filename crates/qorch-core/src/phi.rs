//! PHI (protected health information) detection results.

use serde::{Deserialize, Serialize};

/// Detection mode for the PHI classifier (C1). `Off` is rejected at config
/// load time when the deployment's HIPAA-mode flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiMode {
    Strict,
    Lenient,
    Off,
}

/// Kind of protected entity recognized by a `PHIDetector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiEntityKind {
    PersonName,
    Date,
    MedicalRecordNumber,
    NationalId,
    PhoneNumber,
    Address,
}

impl PhiEntityKind {
    /// Placeholder used in audit records in place of the raw surface text.
    pub fn placeholder(&self) -> &'static str {
        match self {
            PhiEntityKind::PersonName => "[PERSON_NAME]",
            PhiEntityKind::Date => "[DATE]",
            PhiEntityKind::MedicalRecordNumber => "[MRN]",
            PhiEntityKind::NationalId => "[NATIONAL_ID]",
            PhiEntityKind::PhoneNumber => "[PHONE]",
            PhiEntityKind::Address => "[ADDRESS]",
        }
    }
}

/// A single detected PHI span within a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiSpan {
    pub kind: PhiEntityKind,
    pub start: usize,
    pub end: usize,
    pub surface: String,
}

/// Verdict produced by the PHI Classifier (C1). Read-only after production;
/// drives model routing (C6) and audit redaction (C13).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhiVerdict {
    pub has_phi: bool,
    pub spans: Vec<PhiSpan>,
}

impl PhiVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_spans(spans: Vec<PhiSpan>) -> Self {
        Self {
            has_phi: !spans.is_empty(),
            spans,
        }
    }

    /// Conservative verdict adopted when the underlying detector could not be
    /// reached (see `PHIDetector::detect` contract in spec.md §4.1).
    pub fn conservative() -> Self {
        Self {
            has_phi: true,
            spans: Vec::new(),
        }
    }

    /// Replace every detected span's surface text with its kind placeholder.
    /// Used by the audit logger before persisting any payload containing PHI.
    pub fn redact(&self, text: &str) -> String {
        if self.spans.is_empty() {
            return text.to_string();
        }
        let mut spans = self.spans.clone();
        spans.sort_by_key(|s| s.start);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for span in &spans {
            if span.start < cursor || span.end > text.len() || span.start > span.end {
                continue;
            }
            out.push_str(&text[cursor..span.start]);
            out.push_str(span.kind.placeholder());
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_replaces_spans_with_kind_markers() {
        let verdict = PhiVerdict::with_spans(vec![PhiSpan {
            kind: PhiEntityKind::MedicalRecordNumber,
            start: 5,
            end: 10,
            surface: "12345".to_string(),
        }]);
        assert_eq!(verdict.redact("MRN: 12345 today"), "MRN: [MRN] today");
    }

    #[test]
    fn clean_verdict_has_no_phi() {
        assert!(!PhiVerdict::clean().has_phi);
        assert!(PhiVerdict::conservative().has_phi);
    }
}
