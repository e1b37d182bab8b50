//! The candidate artifact pack — profile, bullet bank, and proof pack.
//!
//! This is the source of truth for everything the agent may claim about the
//! candidate. Personalization output may only cite bullet and proof ids that
//! exist here; `evidence_index` is the lookup the grounding pass runs against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An atomic achievement statement tied to a specific experience or project.
/// Bullets are the grounding unit for evidence claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    pub id: String,
    pub text: String,
    /// e.g. "Internship at Google", "Project: ChatBot"
    pub source: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// An external link (portfolio, repository) backing a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofItem {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Which experience/project this proves.
    #[serde(default)]
    pub related_to: String,
}

/// One resolvable piece of evidence: a bullet or a proof item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence<'a> {
    Bullet(&'a Bullet),
    Proof(&'a ProofItem),
}

impl Evidence<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::Bullet(_) => "bullet",
            Evidence::Proof(_) => "proof",
        }
    }
}

/// The complete candidate profile, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub bullets: Vec<Bullet>,
    #[serde(default)]
    pub proofs: Vec<ProofItem>,
}

impl Profile {
    /// Rejects profiles the engine cannot act on. Returns the first problem
    /// found as a human-readable message (surfaced as `input_invalid`).
    pub fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("profile.full_name cannot be empty".to_string());
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err("profile.email must be a valid email address".to_string());
        }
        let mut seen = HashMap::new();
        for bullet in &self.bullets {
            if bullet.id.trim().is_empty() {
                return Err("profile.bullets entries must carry a non-empty id".to_string());
            }
            if seen.insert(bullet.id.as_str(), ()).is_some() {
                return Err(format!("duplicate bullet id '{}'", bullet.id));
            }
        }
        for proof in &self.proofs {
            if proof.id.trim().is_empty() {
                return Err("profile.proofs entries must carry a non-empty id".to_string());
            }
            if seen.insert(proof.id.as_str(), ()).is_some() {
                return Err(format!("duplicate evidence id '{}'", proof.id));
            }
        }
        Ok(())
    }

    /// id → evidence lookup across both the bullet bank and the proof pack.
    pub fn evidence_index(&self) -> HashMap<&str, Evidence<'_>> {
        let mut index = HashMap::with_capacity(self.bullets.len() + self.proofs.len());
        for bullet in &self.bullets {
            index.insert(bullet.id.as_str(), Evidence::Bullet(bullet));
        }
        for proof in &self.proofs {
            index.insert(proof.id.as_str(), Evidence::Proof(proof));
        }
        index
    }

    /// Flat text rendering of the profile used for semantic matching.
    pub fn summary_text(&self) -> String {
        let mut parts = vec![format!("Candidate: {}", self.full_name)];
        if let Some(summary) = &self.summary {
            parts.push(summary.clone());
        }
        if !self.skills.is_empty() {
            parts.push(format!("Technical skills: {}", self.skills.join(", ")));
        }
        for bullet in &self.bullets {
            parts.push(format!("{} ({})", bullet.text, bullet.source));
        }
        parts.join(" ")
    }

    /// Plain-text resume body sent to the portal alongside the cover letter.
    pub fn resume_text(&self) -> String {
        let mut lines = vec![self.full_name.clone(), self.email.clone()];
        if let Some(phone) = &self.phone {
            lines.push(phone.clone());
        }
        lines.push(String::new());
        if let Some(summary) = &self.summary {
            lines.extend(["SUMMARY".to_string(), summary.clone(), String::new()]);
        }
        if !self.skills.is_empty() {
            lines.extend([
                "SKILLS".to_string(),
                self.skills.join(", "),
                String::new(),
            ]);
        }
        if !self.bullets.is_empty() {
            lines.push("EXPERIENCE".to_string());
            for bullet in &self.bullets {
                lines.push(format!("  - {} ({})", bullet.text, bullet.source));
            }
            lines.push(String::new());
        }
        if !self.proofs.is_empty() {
            lines.push("LINKS".to_string());
            for proof in &self.proofs {
                lines.push(format!("  {}: {}", proof.title, proof.url));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            summary: Some("Systems engineer".to_string()),
            skills: vec!["Rust".to_string(), "Go".to_string()],
            bullets: vec![Bullet {
                id: "b1".to_string(),
                text: "Built a trading engine in Go".to_string(),
                source: "Internship at Initech".to_string(),
                skills: vec!["Go".to_string()],
            }],
            proofs: vec![ProofItem {
                id: "p1".to_string(),
                title: "Engine repo".to_string(),
                url: "https://example.com/repo".to_string(),
                related_to: "Internship at Initech".to_string(),
            }],
        }
    }

    #[test]
    fn test_valid_profile_passes() {
        assert!(sample_profile().validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut profile = sample_profile();
        profile.full_name = "  ".to_string();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_duplicate_evidence_id_rejected() {
        let mut profile = sample_profile();
        profile.proofs[0].id = "b1".to_string();
        let err = profile.validate().unwrap_err();
        assert!(err.contains("duplicate"), "got: {err}");
    }

    #[test]
    fn test_evidence_index_covers_bullets_and_proofs() {
        let profile = sample_profile();
        let index = profile.evidence_index();
        assert_eq!(index.get("b1").map(|e| e.kind()), Some("bullet"));
        assert_eq!(index.get("p1").map(|e| e.kind()), Some("proof"));
        assert!(!index.contains_key("b_unknown"));
    }

    #[test]
    fn test_resume_text_contains_contact_and_bullets() {
        let text = sample_profile().resume_text();
        assert!(text.contains("Ada Lovelace"));
        assert!(text.contains("ada@example.com"));
        assert!(text.contains("trading engine"));
    }
}
