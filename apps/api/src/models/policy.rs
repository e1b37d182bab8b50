//! The apply policy — the user's standing instructions on where the agent
//! may and may not apply. Treated as an immutable snapshot taken at run start.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_per_day")]
    pub max_applications_per_day: u32,
    /// 0–100, compared against the ranker's match score.
    #[serde(default = "default_min_match_threshold")]
    pub min_match_threshold: f32,
    #[serde(default)]
    pub blocked_companies: Vec<String>,
    #[serde(default)]
    pub blocked_role_types: Vec<String>,
    #[serde(default)]
    pub required_location: Option<String>,
    #[serde(default)]
    pub require_remote: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_per_day() -> u32 {
    50
}

fn default_min_match_threshold() -> f32 {
    30.0
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_applications_per_day: default_max_per_day(),
            min_match_threshold: default_min_match_threshold(),
            blocked_companies: Vec::new(),
            blocked_role_types: Vec::new(),
            required_location: None,
            require_remote: false,
        }
    }
}

impl ApplyPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.min_match_threshold) {
            return Err("policy.min_match_threshold must be within 0..=100".to_string());
        }
        Ok(())
    }

    pub fn is_company_blocked(&self, company: &str) -> bool {
        let company = company.to_lowercase();
        self.blocked_companies
            .iter()
            .any(|blocked| blocked.to_lowercase() == company)
    }

    /// Whole-word, case-insensitive match of any blocked role entry against
    /// the job title. Multi-word entries must appear as a contiguous word
    /// sequence ("sales rep" does not match "presales representative").
    pub fn blocked_role_hit(&self, title: &str) -> Option<&str> {
        let title_words = words_of(title);
        for blocked in &self.blocked_role_types {
            let blocked_words = words_of(blocked);
            if blocked_words.is_empty() {
                continue;
            }
            if title_words
                .windows(blocked_words.len())
                .any(|window| window == blocked_words.as_slice())
            {
                return Some(blocked.as_str());
            }
        }
        None
    }
}

fn words_of(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
