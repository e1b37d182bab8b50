//! Personalization — per-job cover letter and requirement→evidence map.
//!
//! The text generator is an external collaborator behind the `Personalizer`
//! trait. The engine never interprets rationales; it only validates that
//! every cited evidence id exists in the profile (see `grounding`).

pub mod grounding;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm::LlmClient;
use crate::models::job::JobPosting;
use crate::models::profile::Profile;
use self::prompts::{PERSONALIZE_PROMPT_TEMPLATE, PERSONALIZE_SYSTEM};

#[derive(Debug, Error)]
pub enum PersonalizeError {
    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("generator returned unusable output: {0}")]
    InvalidOutput(String),
}

/// One requirement→evidence mapping claimed by the generator. `grounded` is
/// false until the grounding pass verifies the id against the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceClaim {
    pub requirement: String,
    pub evidence_id: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub grounded: bool,
}

/// The personalized artifacts for a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personalization {
    pub job_id: String,
    pub cover_letter: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub evidence_map: Vec<EvidenceClaim>,
}

#[async_trait]
pub trait Personalizer: Send + Sync {
    async fn personalize(
        &self,
        profile: &Profile,
        job: &JobPosting,
    ) -> Result<Personalization, PersonalizeError>;
}

/// Wire shape returned by the generation LLM call.
#[derive(Debug, Deserialize)]
struct GeneratedPackage {
    #[serde(default)]
    summary: Option<String>,
    cover_letter: String,
    #[serde(default)]
    requirement_evidence_map: Vec<GeneratedClaim>,
}

#[derive(Debug, Deserialize)]
struct GeneratedClaim {
    requirement: String,
    evidence_id: String,
    #[serde(default)]
    rationale: Option<String>,
}

/// Default personalizer backed by the LLM client.
pub struct LlmPersonalizer {
    llm: LlmClient,
}

impl LlmPersonalizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Personalizer for LlmPersonalizer {
    async fn personalize(
        &self,
        profile: &Profile,
        job: &JobPosting,
    ) -> Result<Personalization, PersonalizeError> {
        let prompt = build_personalize_prompt(profile, job);

        let package: GeneratedPackage = self
            .llm
            .call_json(&prompt, PERSONALIZE_SYSTEM)
            .await
            .map_err(|e| PersonalizeError::Llm(e.to_string()))?;

        if package.cover_letter.trim().is_empty() {
            return Err(PersonalizeError::InvalidOutput(
                "empty cover letter".to_string(),
            ));
        }

        debug!(
            job_id = %job.id,
            claims = package.requirement_evidence_map.len(),
            "personalization generated"
        );

        Ok(Personalization {
            job_id: job.id.clone(),
            cover_letter: package.cover_letter,
            summary: package.summary,
            evidence_map: package
                .requirement_evidence_map
                .into_iter()
                .map(|claim| EvidenceClaim {
                    requirement: claim.requirement,
                    evidence_id: claim.evidence_id,
                    rationale: claim.rationale,
                    grounded: false,
                })
                .collect(),
        })
    }
}

fn build_personalize_prompt(profile: &Profile, job: &JobPosting) -> String {
    let bullet_bank = profile
        .bullets
        .iter()
        .map(|b| {
            format!(
                "- [{}] {} (from: {}, skills: {})",
                b.id,
                b.text,
                b.source,
                b.skills.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let proof_pack = profile
        .proofs
        .iter()
        .map(|p| format!("- [{}] {}: {}", p.id, p.title, p.url))
        .collect::<Vec<_>>()
        .join("\n");

    PERSONALIZE_PROMPT_TEMPLATE
        .replace("{job_title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{job_description}", &job.description)
        .replace("{requirements}", &job.requirements.join("; "))
        .replace("{candidate_name}", &profile.full_name)
        .replace("{candidate_summary}", profile.summary.as_deref().unwrap_or(""))
        .replace("{candidate_skills}", &profile.skills.join(", "))
        .replace("{bullet_bank}", &bullet_bank)
        .replace("{proof_pack}", &proof_pack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::Bullet;

    fn profile() -> Profile {
        Profile {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            summary: None,
            skills: vec!["Go".to_string()],
            bullets: vec![Bullet {
                id: "b1".to_string(),
                text: "Built X in Go".to_string(),
                source: "Initech".to_string(),
                skills: vec![],
            }],
            proofs: vec![],
        }
    }

    fn job() -> JobPosting {
        JobPosting {
            id: "J1".to_string(),
            title: "Go Engineer".to_string(),
            company: "OtherCo".to_string(),
            location: String::new(),
            remote: Some(true),
            description: "Backend Go work".to_string(),
            requirements: vec!["Go".to_string()],
            salary: None,
        }
    }

    #[test]
    fn test_prompt_carries_bullet_ids_and_job_fields() {
        let prompt = build_personalize_prompt(&profile(), &job());
        assert!(prompt.contains("[b1]"));
        assert!(prompt.contains("Go Engineer"));
        assert!(prompt.contains("OtherCo"));
    }

    #[test]
    fn test_generated_package_deserializes_from_llm_shape() {
        let json = r#"{
            "summary": "Tailored summary",
            "cover_letter": "Dear team, ...",
            "requirement_evidence_map": [
                {"requirement": "Go", "evidence_id": "b1", "rationale": "Built X in Go"}
            ]
        }"#;
        let package: GeneratedPackage = serde_json::from_str(json).unwrap();
        assert_eq!(package.requirement_evidence_map.len(), 1);
        assert_eq!(package.requirement_evidence_map[0].evidence_id, "b1");
    }

    #[test]
    fn test_missing_evidence_map_defaults_empty() {
        let json = r#"{"cover_letter": "Dear team"}"#;
        let package: GeneratedPackage = serde_json::from_str(json).unwrap();
        assert!(package.requirement_evidence_map.is_empty());
    }
}
