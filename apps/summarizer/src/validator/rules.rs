//! Deterministic structural checks — the cheap first tier of validation.
//!
//! FAIL conditions (each reported once, with every offending word/phrase listed):
//! - a required field is empty
//! - overview shorter or longer than the guideline bounds
//! - a list field holds more items than allowed
//! - a forbidden phrase appears anywhere (case-insensitive)
//! - first- or second-person words appear where the guideline forbids them

use crate::models::JobSummary;
use crate::validator::guidelines::GuidelineSpec;
use crate::validator::{RuleViolation, ValidationVerdict};

pub const RULE_REQUIRED_FIELD: &str = "required_field";
pub const RULE_OVERVIEW_LENGTH: &str = "overview_length";
pub const RULE_LIST_LENGTH: &str = "list_length";
pub const RULE_FORBIDDEN_PHRASE: &str = "forbidden_phrase";
pub const RULE_FIRST_PERSON: &str = "first_person";
pub const RULE_SECOND_PERSON: &str = "second_person";

const FIRST_PERSON_WORDS: &[&str] = &[
    "i", "i'm", "i've", "i'd", "i'll", "me", "my", "mine", "myself", "we", "we're", "we've",
    "we'd", "we'll", "us", "our", "ours", "ourselves",
];

const SECOND_PERSON_WORDS: &[&str] = &[
    "you", "you're", "you've", "you'd", "you'll", "your", "yours", "yourself", "yourselves",
];

pub fn check_structure(draft: &JobSummary, guideline: &GuidelineSpec) -> ValidationVerdict {
    let mut violations = Vec::new();

    check_required_fields(draft, guideline, &mut violations);
    check_lengths(draft, guideline, &mut violations);
    check_forbidden_phrases(draft, guideline, &mut violations);

    if guideline.forbid_first_person {
        check_person(draft, FIRST_PERSON_WORDS, RULE_FIRST_PERSON, "first-person", &mut violations);
    }
    if guideline.forbid_second_person {
        check_person(draft, SECOND_PERSON_WORDS, RULE_SECOND_PERSON, "second-person", &mut violations);
    }

    ValidationVerdict::from_violations(violations)
}

fn check_required_fields(
    draft: &JobSummary,
    guideline: &GuidelineSpec,
    violations: &mut Vec<RuleViolation>,
) {
    for field in &guideline.required_fields {
        let present = match field.as_str() {
            "title" => !draft.title.trim().is_empty(),
            "overview" => !draft.overview.trim().is_empty(),
            "company" => draft.company.as_deref().is_some_and(|c| !c.trim().is_empty()),
            "responsibilities" => has_items(&draft.responsibilities),
            "requirements" => has_items(&draft.requirements),
            "tech_stack" => has_items(&draft.tech_stack),
            // Unknown names come from newer guideline files; nothing to check against.
            _ => true,
        };
        if !present {
            violations.push(RuleViolation::new(
                RULE_REQUIRED_FIELD,
                format!("Required field '{field}' is missing or empty"),
            ));
        }
    }
}

fn has_items(items: &[String]) -> bool {
    items.iter().any(|s| !s.trim().is_empty())
}

fn check_lengths(
    draft: &JobSummary,
    guideline: &GuidelineSpec,
    violations: &mut Vec<RuleViolation>,
) {
    let overview_chars = draft.overview.trim().chars().count();
    if overview_chars > 0 && overview_chars < guideline.overview_min_chars {
        violations.push(RuleViolation::new(
            RULE_OVERVIEW_LENGTH,
            format!(
                "Overview is {overview_chars} characters; minimum is {}",
                guideline.overview_min_chars
            ),
        ));
    } else if overview_chars > guideline.overview_max_chars {
        violations.push(RuleViolation::new(
            RULE_OVERVIEW_LENGTH,
            format!(
                "Overview is {overview_chars} characters; maximum is {}",
                guideline.overview_max_chars
            ),
        ));
    }

    for (field, items) in [
        ("responsibilities", &draft.responsibilities),
        ("requirements", &draft.requirements),
        ("tech_stack", &draft.tech_stack),
    ] {
        if items.len() > guideline.max_list_items {
            violations.push(RuleViolation::new(
                RULE_LIST_LENGTH,
                format!(
                    "'{field}' has {} items; maximum is {}",
                    items.len(),
                    guideline.max_list_items
                ),
            ));
        }
    }
}

fn check_forbidden_phrases(
    draft: &JobSummary,
    guideline: &GuidelineSpec,
    violations: &mut Vec<RuleViolation>,
) {
    let fields = draft.text_fields();
    let mut found: Vec<&str> = Vec::new();

    for phrase in &guideline.forbidden_phrases {
        let needle = phrase.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if fields
            .iter()
            .any(|(_, text)| contains_phrase(&text.to_lowercase(), &needle))
        {
            found.push(phrase.as_str());
        }
    }

    if !found.is_empty() {
        violations.push(RuleViolation::new(
            RULE_FORBIDDEN_PHRASE,
            format!("Forbidden phrases used: {}", quote_list(&found)),
        ));
    }
}

/// Substring match bounded by non-alphanumerics, so "family" never hits "unfamiliar".
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn check_person(
    draft: &JobSummary,
    words: &[&str],
    rule_id: &str,
    label: &str,
    violations: &mut Vec<RuleViolation>,
) {
    let mut found: Vec<String> = Vec::new();
    let mut fields: Vec<&str> = Vec::new();

    for (field, text) in draft.text_fields() {
        for token in tokenize(text) {
            // "US" in capitals is the country, not the pronoun.
            if token == "US" {
                continue;
            }
            let lower = token.to_lowercase().replace('’', "'");
            if words.contains(&lower.as_str()) {
                if !found.contains(&lower) {
                    found.push(lower);
                }
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
    }

    if !found.is_empty() {
        let words: Vec<&str> = found.iter().map(String::as_str).collect();
        violations.push(RuleViolation::new(
            rule_id,
            format!(
                "Uses {label} language ({}) in {}; rewrite in third person",
                quote_list(&words),
                fields.join(", ")
            ),
        ));
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '’'))
        .filter(|t| !t.is_empty())
}

fn quote_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
