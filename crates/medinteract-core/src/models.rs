//! Core data models used throughout MedInteract.
//!
//! Two families of types live here: the reference-corpus side
//! ([`Document`], [`Chunk`], [`Passage`]) that flows through ingestion and
//! retrieval, and the request side ([`PatientCase`], [`AnalysisResult`])
//! that a client builds per analysis and receives back.

use serde::{Deserialize, Serialize};

/// One page of extracted text from a reference document.
///
/// PDFs produce one `Document` per page; plain-text and Office files
/// produce a single `Document` with page `0`. Page numbers are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Source identifier, the file path the text was read from.
    pub source: String,
    /// Zero-based page number within the source.
    pub page: u32,
    /// Extracted page text.
    pub text: String,
}

/// A bounded span of a [`Document`]'s text, the unit stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic UUID derived from [`Chunk::hash`].
    pub id: String,
    /// Source identifier inherited from the parent document.
    pub source: String,
    /// Page number inherited from the parent document.
    pub page: u32,
    /// Position of this chunk within its page, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 over source, page and text. Used to deduplicate index inserts.
    pub hash: String,
}

/// A retrieved chunk handed to the generation service and echoed back as a
/// citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub source: String,
    pub page: u32,
    pub text: String,
    /// Cosine similarity to the query that retrieved it.
    pub score: f64,
}

/// A medication entry (current or newly prescribed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
}

impl Medication {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
        }
    }
}

/// A known allergy. `reaction` may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allergy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reaction: String,
}

impl Allergy {
    pub fn new(name: impl Into<String>, reaction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reaction: reaction.into(),
        }
    }
}

/// Basic patient attributes. Each field is independently optional; an
/// empty string is treated the same as an absent value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "bp")]
    pub blood_pressure: Option<String>,
}

impl PatientInfo {
    pub fn age(&self) -> Option<&str> {
        non_empty(self.age.as_deref())
    }

    pub fn gender(&self) -> Option<&str> {
        non_empty(self.gender.as_deref())
    }

    pub fn blood_pressure(&self) -> Option<&str> {
        non_empty(self.blood_pressure.as_deref())
    }

    /// True if at least one attribute carries a value.
    pub fn has_any(&self) -> bool {
        self.age().is_some() || self.gender().is_some() || self.blood_pressure().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Everything a client supplies for one analysis request.
///
/// Owned by the caller and passed by value into the engine; the engine
/// never keeps it after the result is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCase {
    #[serde(default)]
    pub current_medications: Vec<Medication>,
    #[serde(default)]
    pub allergies: Vec<Allergy>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub new_medications: Vec<Medication>,
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub additional_info: String,
}

impl PatientCase {
    /// Drop entries whose name is empty.
    ///
    /// This is the clean-up a form client performs before submitting a
    /// case; the formatter itself tolerates unsanitized input.
    pub fn sanitized(mut self) -> Self {
        self.current_medications.retain(|m| !m.name.is_empty());
        self.allergies.retain(|a| !a.name.is_empty());
        self.conditions.retain(|c| !c.is_empty());
        self.new_medications.retain(|m| !m.name.is_empty());
        self
    }

    /// The caller-side precondition for running an analysis: at least one
    /// new medication with a non-empty name.
    pub fn has_new_medication(&self) -> bool {
        self.new_medications.iter().any(|m| !m.name.is_empty())
    }
}

/// A source reference attached to an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: u32,
    /// Leading excerpt of the passage, truncated to the preview length.
    pub excerpt: String,
}

impl Citation {
    /// Build a citation from a passage, truncating its text to
    /// `preview_chars` characters plus [`TRUNCATION_MARKER`].
    pub fn from_passage(passage: &Passage, preview_chars: usize) -> Self {
        Self {
            source: passage.source.clone(),
            page: passage.page,
            excerpt: truncate_excerpt(&passage.text, preview_chars),
        }
    }
}

/// Appended to excerpts that were cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Truncate `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Outcome of one analysis request: either the generated analysis with its
/// sources, or an error message. Never both.
///
/// Serializes as `{"analysis": ..., "sources": [...]}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Analysis {
        analysis: String,
        sources: Vec<Citation>,
    },
    Error {
        error: String,
    },
}

impl AnalysisResult {
    pub fn error(message: impl Into<String>) -> Self {
        AnalysisResult::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisResult::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AnalysisResult::Error { error } => Some(error),
            AnalysisResult::Analysis { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> Passage {
        Passage {
            source: "data/ref.pdf".to_string(),
            page: 3,
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_excerpt("short", 150), "short");
        let exact = "x".repeat(150);
        assert_eq!(truncate_excerpt(&exact, 150), exact);
    }

    #[test]
    fn test_truncate_long_text_gets_marker() {
        let long = "y".repeat(151);
        let out = truncate_excerpt(&long, 150);
        assert_eq!(out.chars().count(), 153);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(truncate_excerpt(&text, 4), "éééé...");
    }

    #[test]
    fn test_citation_from_passage() {
        let c = Citation::from_passage(&passage(&"z".repeat(200)), 150);
        assert_eq!(c.source, "data/ref.pdf");
        assert_eq!(c.page, 3);
        assert!(c.excerpt.ends_with("..."));
    }

    #[test]
    fn test_sanitized_drops_empty_names() {
        let case = PatientCase {
            current_medications: vec![Medication::new("", "5mg"), Medication::new("Aspirin", "")],
            allergies: vec![Allergy::new("", "Hives")],
            conditions: vec![String::new(), "Asthma".to_string()],
            new_medications: vec![Medication::new("", "")],
            ..Default::default()
        }
        .sanitized();
        assert_eq!(case.current_medications.len(), 1);
        assert!(case.allergies.is_empty());
        assert_eq!(case.conditions, vec!["Asthma".to_string()]);
        assert!(!case.has_new_medication());
    }

    #[test]
    fn test_patient_info_accepts_bp_alias() {
        let info: PatientInfo =
            serde_json::from_str(r#"{"age": "45", "bp": "120/80", "gender": ""}"#).unwrap();
        assert_eq!(info.blood_pressure(), Some("120/80"));
        assert_eq!(info.gender(), None);
        assert!(info.has_any());
        assert!(!PatientInfo::default().has_any());
    }

    #[test]
    fn test_analysis_result_serialization_shapes() {
        let err = serde_json::to_value(AnalysisResult::error("boom")).unwrap();
        assert_eq!(err, serde_json::json!({"error": "boom"}));

        let ok = serde_json::to_value(AnalysisResult::Analysis {
            analysis: "fine".to_string(),
            sources: vec![],
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({"analysis": "fine", "sources": []}));
    }
}
