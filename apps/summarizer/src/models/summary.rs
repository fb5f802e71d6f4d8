//! The structured, brand-compliant summary produced for a job posting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationType {
    Remote,
    Hybrid,
    Onsite,
    #[default]
    Unknown,
}

/// Final output of a pipeline run. Also the schema the drafting model must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location_type: LocationType,
    pub overview: String,
    pub responsibilities: Vec<String>,
    pub requirements: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

impl JobSummary {
    /// Every piece of prose in the summary, tagged with the field it came from.
    /// Rule checks walk this instead of matching on fields individually.
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("title", self.title.as_str()), ("overview", self.overview.as_str())];
        if let Some(company) = &self.company {
            fields.push(("company", company.as_str()));
        }
        fields.extend(self.responsibilities.iter().map(|s| ("responsibilities", s.as_str())));
        fields.extend(self.requirements.iter().map(|s| ("requirements", s.as_str())));
        fields.extend(self.tech_stack.iter().map(|s| ("tech_stack", s.as_str())));
        fields
    }
}
