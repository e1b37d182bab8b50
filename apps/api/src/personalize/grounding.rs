//! Evidence grounding — verifies that every claim cites real evidence.
//!
//! Safety invariant: a personalization with any ungrounded claim is never
//! submitted. Validation is by `evidence_id` lookup alone; the rationale
//! text rides along for reviewers and is never consulted, so a hallucinated
//! id cannot be rescued by a plausible-looking quote.

use tracing::debug;

use crate::models::profile::Profile;
use crate::personalize::EvidenceClaim;

/// Outcome of grounding a personalization's evidence map.
#[derive(Debug, Clone)]
pub struct GroundingReport {
    /// The claims with `grounded` resolved.
    pub claims: Vec<EvidenceClaim>,
    pub grounded_count: usize,
    pub total: usize,
    /// Requirements whose claims could not be grounded.
    pub ungrounded: Vec<String>,
}

impl GroundingReport {
    pub fn is_fully_grounded(&self) -> bool {
        self.ungrounded.is_empty()
    }

    /// "3/4" style label for stage events.
    pub fn ratio_label(&self) -> String {
        format!("{}/{}", self.grounded_count, self.total)
    }
}

/// Checks each claim's `evidence_id` against the profile's bullet and proof
/// sets. An id absent from the profile marks the claim ungrounded, full stop.
pub fn ground_claims(profile: &Profile, claims: Vec<EvidenceClaim>) -> GroundingReport {
    let index = profile.evidence_index();
    let total = claims.len();

    let mut resolved = Vec::with_capacity(total);
    let mut ungrounded = Vec::new();

    for mut claim in claims {
        match index.get(claim.evidence_id.as_str()) {
            Some(evidence) => {
                debug!(
                    requirement = %claim.requirement,
                    evidence_id = %claim.evidence_id,
                    kind = evidence.kind(),
                    "claim grounded"
                );
                claim.grounded = true;
            }
            None => {
                claim.grounded = false;
                ungrounded.push(claim.requirement.clone());
            }
        }
        resolved.push(claim);
    }

    let grounded_count = total - ungrounded.len();
    GroundingReport {
        claims: resolved,
        grounded_count,
        total,
        ungrounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{Bullet, ProofItem};

    fn profile() -> Profile {
        Profile {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            summary: None,
            skills: vec![],
            bullets: vec![Bullet {
                id: "b1".to_string(),
                text: "Built a payments service in Go".to_string(),
                source: "Initech".to_string(),
                skills: vec![],
            }],
            proofs: vec![ProofItem {
                id: "p1".to_string(),
                title: "Repo".to_string(),
                url: "https://example.com".to_string(),
                related_to: String::new(),
            }],
        }
    }

    fn claim(requirement: &str, evidence_id: &str, rationale: Option<&str>) -> EvidenceClaim {
        EvidenceClaim {
            requirement: requirement.to_string(),
            evidence_id: evidence_id.to_string(),
            rationale: rationale.map(|r| r.to_string()),
            grounded: false,
        }
    }

    #[test]
    fn test_known_bullet_and_proof_ids_ground() {
        let report = ground_claims(
            &profile(),
            vec![claim("Go", "b1", None), claim("Open source", "p1", None)],
        );
        assert!(report.is_fully_grounded());
        assert_eq!(report.ratio_label(), "2/2");
    }

    #[test]
    fn test_unknown_id_is_ungrounded() {
        let report = ground_claims(&profile(), vec![claim("Python", "b_unknown", None)]);
        assert!(!report.is_fully_grounded());
        assert_eq!(report.ungrounded, vec!["Python".to_string()]);
        assert!(!report.claims[0].grounded);
    }

    #[test]
    fn test_rationale_quoting_a_real_bullet_does_not_rescue_bad_id() {
        // The rationale is never interpreted: even a verbatim bullet quote
        // cannot ground a claim whose id is absent from the profile.
        let report = ground_claims(
            &profile(),
            vec![claim("Go", "wrong_id", Some("Built a payments service in Go"))],
        );
        assert!(!report.is_fully_grounded());
        assert!(!report.claims[0].grounded);
        assert_eq!(report.claims[0].evidence_id, "wrong_id");
        assert_eq!(report.ungrounded, vec!["Go".to_string()]);
    }

    #[test]
    fn test_mixed_map_reports_only_bad_requirements() {
        let report = ground_claims(
            &profile(),
            vec![
                claim("Go", "b1", None),
                claim("Kubernetes", "b_missing", Some("ran a k8s cluster")),
            ],
        );
        assert!(!report.is_fully_grounded());
        assert_eq!(report.ratio_label(), "1/2");
        assert_eq!(report.ungrounded, vec!["Kubernetes".to_string()]);
    }

    #[test]
    fn test_empty_map_is_trivially_grounded() {
        let report = ground_claims(&profile(), vec![]);
        assert!(report.is_fully_grounded());
        assert_eq!(report.ratio_label(), "0/0");
    }
}
