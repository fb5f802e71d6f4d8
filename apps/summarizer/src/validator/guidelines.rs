//! Guideline specs — the versioned brand/style configuration a summary is validated against.
//!
//! Specs are opaque configuration: the pipeline never hardcodes rule content beyond the
//! built-in default used when no guideline file is supplied.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GUIDELINE_VERSION: &str = "default-v1";

const DEFAULT_VOICE: &str = "\
Write in a confident, plain, third-person voice. Describe the role and the company, never \
address the reader. Prefer concrete facts from the posting over adjectives. No hype, no \
emoji, no exclamation marks. Keep the overview to two or three sentences.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineSpec {
    pub version: String,
    /// Free-text brand voice guidance handed verbatim to the drafter and the critic.
    pub voice: String,
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
    #[serde(default = "default_overview_min")]
    pub overview_min_chars: usize,
    #[serde(default = "default_overview_max")]
    pub overview_max_chars: usize,
    #[serde(default = "default_max_list_items")]
    pub max_list_items: usize,
    #[serde(default)]
    pub forbidden_phrases: Vec<String>,
    #[serde(default)]
    pub forbid_first_person: bool,
    #[serde(default = "default_true")]
    pub forbid_second_person: bool,
}

fn default_required_fields() -> Vec<String> {
    ["title", "overview", "responsibilities", "requirements"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_overview_min() -> usize {
    80
}

fn default_overview_max() -> usize {
    600
}

fn default_max_list_items() -> usize {
    8
}

fn default_true() -> bool {
    true
}

impl Default for GuidelineSpec {
    fn default() -> Self {
        Self {
            version: DEFAULT_GUIDELINE_VERSION.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            required_fields: default_required_fields(),
            overview_min_chars: default_overview_min(),
            overview_max_chars: default_overview_max(),
            max_list_items: default_max_list_items(),
            forbidden_phrases: [
                "rockstar",
                "ninja",
                "guru",
                "work hard, play hard",
                "fast-paced environment",
                "wear many hats",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            forbid_first_person: true,
            forbid_second_person: true,
        }
    }
}

impl GuidelineSpec {
    fn check(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            bail!("guideline version must not be empty");
        }
        if self.overview_min_chars > self.overview_max_chars {
            bail!(
                "guideline '{}': overview_min_chars ({}) exceeds overview_max_chars ({})",
                self.version,
                self.overview_min_chars,
                self.overview_max_chars
            );
        }
        if self.max_list_items == 0 {
            bail!("guideline '{}': max_list_items must be at least 1", self.version);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GuidelineFile {
    Many(Vec<GuidelineSpec>),
    One(GuidelineSpec),
}

/// Version tag → spec. Built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct GuidelineRegistry {
    specs: HashMap<String, Arc<GuidelineSpec>>,
}

impl GuidelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in default guideline.
    pub fn with_default() -> Self {
        let mut registry = Self::new();
        registry.insert(GuidelineSpec::default());
        registry
    }

    /// Loads one spec or an array of specs from a JSON file, on top of the built-in default.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read guideline file '{}'", path.display()))?;
        let parsed: GuidelineFile = serde_json::from_str(&raw)
            .with_context(|| format!("Guideline file '{}' is not valid", path.display()))?;

        let specs = match parsed {
            GuidelineFile::Many(specs) => specs,
            GuidelineFile::One(spec) => vec![spec],
        };

        let mut registry = Self::with_default();
        for spec in specs {
            spec.check()?;
            registry.insert(spec);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, spec: GuidelineSpec) {
        self.specs.insert(spec.version.clone(), Arc::new(spec));
    }

    pub fn get(&self, version: &str) -> Option<Arc<GuidelineSpec>> {
        self.specs.get(version.trim()).cloned()
    }

    pub fn versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        versions.sort_unstable();
        versions
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_registry_has_default_version() {
        let registry = GuidelineRegistry::with_default();
        let spec = registry.get(DEFAULT_GUIDELINE_VERSION).unwrap();
        assert!(spec.forbid_second_person);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_load_single_spec_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "brand-2024", "voice": "Third person only.", "forbidden_phrases": ["synergy"]}}"#
        )
        .unwrap();

        let registry = GuidelineRegistry::from_json_file(file.path()).unwrap();
        let spec = registry.get("brand-2024").unwrap();

        assert_eq!(spec.forbidden_phrases, vec!["synergy".to_string()]);
        assert_eq!(spec.max_list_items, 8);
        assert!(spec.forbid_second_person);
        assert!(!spec.forbid_first_person);
        assert_eq!(registry.versions(), vec!["brand-2024", DEFAULT_GUIDELINE_VERSION]);
    }

    #[test]
    fn test_load_array_of_specs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"version": "a", "voice": "x"}}, {{"version": "b", "voice": "y"}}]"#
        )
        .unwrap();

        let registry = GuidelineRegistry::from_json_file(file.path()).unwrap();
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn test_inverted_length_bounds_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "bad", "voice": "x", "overview_min_chars": 500, "overview_max_chars": 100}}"#
        )
        .unwrap();

        let err = GuidelineRegistry::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("overview_min_chars"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = GuidelineRegistry::from_json_file(Path::new("/nonexistent/guidelines.json"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/guidelines.json"));
    }
}
