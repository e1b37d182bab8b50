//! Policy gates — the checks between ranking and submission.
//!
//! Two gates guard the pipeline: a cheap pre-personalization gate (policy
//! and kill checks) and a post-grounding gate (the safety invariant that an
//! ungrounded personalization is never submitted). Both return a decision,
//! never panic, and leave event emission to the engine.

use crate::models::job::JobPosting;
use crate::models::policy::ApplyPolicy;
use crate::personalize::grounding::GroundingReport;

/// Why a job was skipped. The code string is what events and records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PolicyDisabled,
    BlockedCompany,
    BlockedRole,
    NotRemote,
    LocationMismatch,
    BelowThreshold,
    UngroundedClaim,
    Duplicate,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::PolicyDisabled => "policy_disabled",
            SkipReason::BlockedCompany => "blocked_company",
            SkipReason::BlockedRole => "blocked_role",
            SkipReason::NotRemote => "not_remote",
            SkipReason::LocationMismatch => "location_mismatch",
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::UngroundedClaim => "ungrounded_claim",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Why the whole run must stop, not just this job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    KillRequested,
    DailyCapReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Skip(SkipReason),
    Stop(StopReason),
}

/// Cheap checks run before any personalization cost is spent on the job.
/// `submitted_today` must already include this run's submissions;
/// `in_flight` is the count of concurrent submissions not yet recorded.
pub fn pre_personalize_gate(
    policy: &ApplyPolicy,
    job: &JobPosting,
    match_score: f32,
    kill_requested: bool,
    submitted_today: u32,
    in_flight: u32,
) -> GateDecision {
    if kill_requested {
        return GateDecision::Stop(StopReason::KillRequested);
    }
    if !policy.enabled {
        return GateDecision::Skip(SkipReason::PolicyDisabled);
    }
    if policy.is_company_blocked(&job.company) {
        return GateDecision::Skip(SkipReason::BlockedCompany);
    }
    if policy.blocked_role_hit(&job.title).is_some() {
        return GateDecision::Skip(SkipReason::BlockedRole);
    }
    if policy.require_remote && !job.is_remote() {
        return GateDecision::Skip(SkipReason::NotRemote);
    }
    if let Some(required) = &policy.required_location {
        if !job
            .location
            .to_lowercase()
            .contains(&required.to_lowercase())
        {
            return GateDecision::Skip(SkipReason::LocationMismatch);
        }
    }
    if match_score < policy.min_match_threshold {
        return GateDecision::Skip(SkipReason::BelowThreshold);
    }
    if submitted_today + in_flight >= policy.max_applications_per_day {
        return GateDecision::Stop(StopReason::DailyCapReached);
    }
    GateDecision::Allow
}

/// The hard safety invariant: any ungrounded claim blocks submission.
pub fn post_ground_gate(report: &GroundingReport) -> GateDecision {
    if report.is_fully_grounded() {
        GateDecision::Allow
    } else {
        GateDecision::Skip(SkipReason::UngroundedClaim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalize::grounding::ground_claims;
    use crate::personalize::EvidenceClaim;
    use crate::models::profile::{Bullet, Profile};

    fn job(title: &str, company: &str, location: &str, remote: bool) -> JobPosting {
        JobPosting {
            id: "J1".to_string(),
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            remote: Some(remote),
            description: String::new(),
            requirements: vec![],
            salary: None,
        }
    }

    fn gate(policy: &ApplyPolicy, job: &JobPosting, score: f32) -> GateDecision {
        pre_personalize_gate(policy, job, score, false, 0, 0)
    }

    #[test]
    fn test_kill_wins_over_everything() {
        let decision = pre_personalize_gate(
            &ApplyPolicy::default(),
            &job("Engineer", "Co", "Berlin", true),
            90.0,
            true,
            0,
            0,
        );
        assert_eq!(decision, GateDecision::Stop(StopReason::KillRequested));
    }

    #[test]
    fn test_disabled_policy_skips() {
        let policy = ApplyPolicy {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(
            gate(&policy, &job("Engineer", "Co", "Berlin", true), 90.0),
            GateDecision::Skip(SkipReason::PolicyDisabled)
        );
    }

    #[test]
    fn test_blocked_company_skips() {
        let policy = ApplyPolicy {
            blocked_companies: vec!["AcmeCorp".to_string()],
            ..Default::default()
        };
        assert_eq!(
            gate(&policy, &job("Engineer", "acmecorp", "Berlin", true), 90.0),
            GateDecision::Skip(SkipReason::BlockedCompany)
        );
    }

    #[test]
    fn test_blocked_role_skips() {
        let policy = ApplyPolicy {
            blocked_role_types: vec!["sales".to_string()],
            ..Default::default()
        };
        assert_eq!(
            gate(&policy, &job("Sales Engineer", "Co", "Berlin", true), 90.0),
            GateDecision::Skip(SkipReason::BlockedRole)
        );
    }

    #[test]
    fn test_remote_requirement_skips_onsite() {
        let policy = ApplyPolicy {
            require_remote: true,
            ..Default::default()
        };
        assert_eq!(
            gate(&policy, &job("Engineer", "Co", "Berlin", false), 90.0),
            GateDecision::Skip(SkipReason::NotRemote)
        );
    }

    #[test]
    fn test_required_location_is_substring_match() {
        let policy = ApplyPolicy {
            required_location: Some("berlin".to_string()),
            ..Default::default()
        };
        assert_eq!(
            gate(&policy, &job("Engineer", "Co", "Berlin, Germany", false), 90.0),
            GateDecision::Allow
        );
        assert_eq!(
            gate(&policy, &job("Engineer", "Co", "Munich", false), 90.0),
            GateDecision::Skip(SkipReason::LocationMismatch)
        );
    }

    #[test]
    fn test_below_threshold_skips() {
        assert_eq!(
            gate(
                &ApplyPolicy::default(),
                &job("Engineer", "Co", "Berlin", true),
                10.0
            ),
            GateDecision::Skip(SkipReason::BelowThreshold)
        );
    }

    #[test]
    fn test_daily_cap_counts_in_flight() {
        let policy = ApplyPolicy {
            max_applications_per_day: 5,
            ..Default::default()
        };
        let posting = job("Engineer", "Co", "Berlin", true);
        assert_eq!(
            pre_personalize_gate(&policy, &posting, 90.0, false, 4, 1),
            GateDecision::Stop(StopReason::DailyCapReached)
        );
        assert_eq!(
            pre_personalize_gate(&policy, &posting, 90.0, false, 4, 0),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_post_ground_gate_blocks_ungrounded() {
        let profile = Profile {
            full_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            summary: None,
            skills: vec![],
            bullets: vec![Bullet {
                id: "b1".to_string(),
                text: "Built X".to_string(),
                source: "Initech".to_string(),
                skills: vec![],
            }],
            proofs: vec![],
        };
        let grounded = ground_claims(
            &profile,
            vec![EvidenceClaim {
                requirement: "X".to_string(),
                evidence_id: "b1".to_string(),
                rationale: None,
                grounded: false,
            }],
        );
        assert_eq!(post_ground_gate(&grounded), GateDecision::Allow);

        let ungrounded = ground_claims(
            &profile,
            vec![EvidenceClaim {
                requirement: "Python".to_string(),
                evidence_id: "b_unknown".to_string(),
                rationale: None,
                grounded: false,
            }],
        );
        assert_eq!(
            post_ground_gate(&ungrounded),
            GateDecision::Skip(SkipReason::UngroundedClaim)
        );
    }
}
