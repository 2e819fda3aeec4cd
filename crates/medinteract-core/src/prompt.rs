//! The prompt contract between MedInteract and the generation service.
//!
//! Two pieces of fixed text shape every answer:
//!
//! - [`ANALYSIS_INSTRUCTIONS`], appended to every formatted patient case by
//!   [`format_query`];
//! - [`QA_TEMPLATE`], which wraps the formatted case together with the
//!   retrieved reference passages ([`render_qa_prompt`]).
//!
//! Both are versioned by [`PROMPT_VERSION`]. Any edit to either text must
//! bump it: the generated output's tone and structure depend on them.

use std::fmt::Write;

use crate::models::{PatientCase, Passage};

/// Version of the instruction and template text below.
pub const PROMPT_VERSION: &str = "2";

/// Opening line of every formatted query.
pub const QUERY_PREAMBLE: &str = "You are a friendly medical assistant. Please analyze the following \
patient information and identify any potential negative interactions or concerns in a \
conversational, easy-to-understand way.";

/// Instructions appended to every formatted query.
pub const ANALYSIS_INSTRUCTIONS: &str = "\
Please analyze for potential interactions and concerns, considering:
1. Drug-drug interactions between current and new medications
2. Allergy concerns with any medications
3. Drug-condition interactions
4. Age, gender, or blood pressure related concerns

Do not suggest treatments, prescriptions, or next steps.
Be conversational and educational in your response. Organize your answer in clear sections \
but don't use numbering or bullet points unless necessary. Explain any medical terms you use.

End with a disclaimer that you are NOT a doctor and this analysis is for informational purposes only.
";

/// Retrieval-QA wrapper. `{context}` receives the retrieved passages and
/// `{question}` the formatted query.
pub const QA_TEMPLATE: &str = "\
You are a friendly medical assistant focusing on drug interactions and safety concerns.

Context information from medical literature:
{context}

Based on the context information and your knowledge, answer the following query:
{question}

Focus on identifying potential negative interactions, side effects, or concerns.
Don't provide treatment suggestions or next steps.
Be conversational and explain in simple terms, but be comprehensive.
Include a disclaimer that you are NOT a doctor and this is for informational purposes only.
";

/// Format a patient case into the natural-language query.
///
/// Pure and deterministic: identical input yields byte-identical output.
/// Entries are filtered as follows:
///
/// - Basic Information appears only if age, gender, or blood pressure is set.
/// - Medications (current and new) need both a name and a dosage.
/// - Allergies need a name; the reaction is shown only when present.
/// - Empty condition names are skipped.
///
/// The "at least one new medication" rule is the caller's to enforce;
/// this function formats whatever it is given.
pub fn format_query(case: &PatientCase) -> String {
    let mut query = String::new();
    query.push_str(QUERY_PREAMBLE);
    query.push_str("\n\nPatient Information:\n");

    let info = &case.patient_info;
    if info.has_any() {
        query.push_str("\nBasic Information:\n");
        if let Some(age) = info.age() {
            let _ = writeln!(query, "- Age: {}", age);
        }
        if let Some(gender) = info.gender() {
            let _ = writeln!(query, "- Gender: {}", gender);
        }
        if let Some(bp) = info.blood_pressure() {
            let _ = writeln!(query, "- Blood Pressure: {}", bp);
        }
    }

    if !case.current_medications.is_empty() {
        query.push_str("\nCurrent Medications:\n");
        for med in &case.current_medications {
            if !med.name.is_empty() && !med.dosage.is_empty() {
                let _ = writeln!(query, "- {} ({})", med.name, med.dosage);
            }
        }
    }

    if !case.allergies.is_empty() {
        query.push_str("\nAllergies:\n");
        for allergy in &case.allergies {
            if allergy.name.is_empty() {
                continue;
            }
            if allergy.reaction.is_empty() {
                let _ = writeln!(query, "- {}", allergy.name);
            } else {
                let _ = writeln!(query, "- {} (Reaction: {})", allergy.name, allergy.reaction);
            }
        }
    }

    if !case.conditions.is_empty() {
        query.push_str("\nMedical Conditions:\n");
        for condition in case.conditions.iter().filter(|c| !c.is_empty()) {
            let _ = writeln!(query, "- {}", condition);
        }
    }

    if !case.new_medications.is_empty() {
        query.push_str("\nNewly Prescribed Medications:\n");
        for med in &case.new_medications {
            if !med.name.is_empty() && !med.dosage.is_empty() {
                let _ = writeln!(query, "- {} ({})", med.name, med.dosage);
            }
        }
    }

    if !case.additional_info.is_empty() {
        let _ = writeln!(query, "\nAdditional Information:\n{}", case.additional_info);
    }

    query.push('\n');
    query.push_str(ANALYSIS_INSTRUCTIONS);
    query
}

/// Join passage texts into the context block, separated by blank lines.
pub fn render_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill [`QA_TEMPLATE`] with the retrieved passages and the question.
///
/// Only the template text is scanned for placeholders; substituted values
/// are copied verbatim even if they contain `{context}` or `{question}`.
pub fn render_qa_prompt(question: &str, passages: &[Passage]) -> String {
    let context = render_context(passages);
    let mut out = String::with_capacity(QA_TEMPLATE.len() + context.len() + question.len());
    let mut rest = QA_TEMPLATE;
    loop {
        let next = [("{context}", context.as_str()), ("{question}", question)]
            .into_iter()
            .filter_map(|(slot, value)| rest.find(slot).map(|at| (at, slot, value)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, slot, value)) = next else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + slot.len()..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Allergy, Medication, PatientInfo};

    fn reference_case() -> PatientCase {
        PatientCase {
            current_medications: vec![Medication::new("Lisinopril", "10mg daily")],
            allergies: vec![Allergy::new("Penicillin", "Rash"), Allergy::new("", "Hives")],
            conditions: vec!["Diabetes".to_string(), String::new()],
            new_medications: vec![Medication::new("Metoprolol", "25mg twice daily")],
            patient_info: PatientInfo {
                age: Some("45".to_string()),
                gender: Some("Male".to_string()),
                blood_pressure: Some("120/80".to_string()),
            },
            additional_info: String::new(),
        }
    }

    #[test]
    fn test_contains_all_reference_values() {
        let q = format_query(&reference_case());
        for needle in [
            "Lisinopril",
            "10mg daily",
            "Penicillin",
            "Rash",
            "Diabetes",
            "Metoprolol",
            "25mg twice daily",
            "- Age: 45",
            "- Gender: Male",
            "- Blood Pressure: 120/80",
        ] {
            assert!(q.contains(needle), "missing {:?} in prompt", needle);
        }
        assert!(q.contains("- Penicillin (Reaction: Rash)"));
    }

    #[test]
    fn test_omits_entries_with_empty_names() {
        let q = format_query(&reference_case());
        assert!(!q.contains("Hives"));
        assert!(!q.contains("- \n"));
        assert!(!q.contains("- ("));
    }

    #[test]
    fn test_is_pure() {
        let case = reference_case();
        assert_eq!(format_query(&case), format_query(&case));
    }

    #[test]
    fn test_basic_information_only_when_present() {
        let mut case = reference_case();
        case.patient_info = PatientInfo::default();
        assert!(!format_query(&case).contains("Basic Information"));

        case.patient_info.blood_pressure = Some("140/90".to_string());
        let q = format_query(&case);
        assert!(q.contains("Basic Information"));
        assert!(q.contains("- Blood Pressure: 140/90"));
        assert!(!q.contains("- Age:"));
    }

    #[test]
    fn test_medication_requires_dosage() {
        let mut case = reference_case();
        case.current_medications.push(Medication::new("Ibuprofen", ""));
        assert!(!format_query(&case).contains("Ibuprofen"));
    }

    #[test]
    fn test_allergy_without_reaction() {
        let mut case = reference_case();
        case.allergies = vec![Allergy::new("Sulfa", "")];
        let q = format_query(&case);
        assert!(q.contains("- Sulfa\n"));
        assert!(!q.contains("Reaction"));
    }

    #[test]
    fn test_empty_new_medications_still_well_formed() {
        let mut case = reference_case();
        case.new_medications.clear();
        let q = format_query(&case);
        assert!(!q.contains("Newly Prescribed Medications"));
        assert!(q.contains("Lisinopril"));
        assert!(q.ends_with(ANALYSIS_INSTRUCTIONS));
    }

    #[test]
    fn test_instructions_cover_contract() {
        let q = format_query(&PatientCase::default());
        assert!(q.starts_with(QUERY_PREAMBLE));
        assert!(q.contains("Drug-drug interactions"));
        assert!(q.contains("Allergy concerns"));
        assert!(q.contains("Drug-condition interactions"));
        assert!(q.contains("blood pressure related concerns"));
        assert!(q.contains("Do not suggest treatments"));
        assert!(q.contains("Explain any medical terms"));
        assert!(q.contains("NOT a doctor"));
    }

    #[test]
    fn test_additional_info_section() {
        let mut case = reference_case();
        case.additional_info = "Drinks grapefruit juice daily".to_string();
        let q = format_query(&case);
        assert!(q.contains("Additional Information:\nDrinks grapefruit juice daily\n"));
    }

    #[test]
    fn test_render_qa_prompt_places_context_and_question() {
        let passages = vec![
            Passage {
                source: "a.pdf".to_string(),
                page: 0,
                text: "Beta blockers may mask hypoglycemia.".to_string(),
                score: 0.9,
            },
            Passage {
                source: "b.pdf".to_string(),
                page: 2,
                text: "ACE inhibitors can raise potassium.".to_string(),
                score: 0.8,
            },
        ];
        let prompt = render_qa_prompt("QUESTION", &passages);
        assert!(prompt.contains(
            "Context information from medical literature:\nBeta blockers may mask hypoglycemia.\n\nACE inhibitors can raise potassium.\n"
        ));
        assert!(prompt.contains("answer the following query:\nQUESTION\n"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_placeholders_inside_passages_are_left_alone() {
        let passages = vec![Passage {
            source: "forms.pdf".to_string(),
            page: 0,
            text: "Use the form {question} here, see {context}.".to_string(),
            score: 0.9,
        }];
        let prompt = render_qa_prompt("REALQ", &passages);
        assert!(prompt.contains("Use the form {question} here, see {context}."));
        assert!(prompt.contains("answer the following query:\nREALQ\n"));
        assert_eq!(prompt.matches("REALQ").count(), 1);
    }
}
