//! Job postings as returned by the portal.

use serde::{Deserialize, Serialize};

/// A single job posting. Immutable during a run. The portal may send fields
/// we do not model; they are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, alias = "is_remote")]
    pub remote: Option<bool>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub salary: Option<String>,
}

impl JobPosting {
    pub fn is_remote(&self) -> bool {
        self.remote.unwrap_or(false)
    }

    /// Flat text rendering of the posting used for semantic matching.
    pub fn description_text(&self) -> String {
        let mut parts = vec![format!("Job: {} at {}", self.title, self.company)];
        if !self.description.is_empty() {
            parts.push(format!("Description: {}", self.description));
        }
        if !self.requirements.is_empty() {
            parts.push(format!("Requirements: {}", self.requirements.join(", ")));
        }
        if !self.location.is_empty() {
            let mut location = format!("Location: {}", self.location);
            if self.is_remote() {
                location.push_str(" (Remote available)");
            }
            parts.push(location);
        }
        parts.join(" ")
    }
}
