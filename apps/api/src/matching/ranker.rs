//! Ranker — orders the apply queue by a hybrid of semantic similarity and
//! requirement coverage.
//!
//! Hard filters (blocked company, remote requirement) remove jobs from the
//! queue but report them so the engine can emit skip events for each.
//! `min_match_threshold` is deliberately NOT applied here: low-score jobs
//! stay in the queue so the event stream can show the skip with its reason.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::gate::SkipReason;
use crate::matching::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::models::job::JobPosting;
use crate::models::policy::ApplyPolicy;
use crate::models::profile::Profile;

/// Weighting of the two score components.
const SEMANTIC_WEIGHT: f32 = 0.7;
const COVERAGE_WEIGHT: f32 = 0.3;
/// Cap on human-readable match reasons per job.
const MAX_REASONS: usize = 3;

/// Tokens too generic to count as requirement coverage evidence.
const STOPWORDS: &[&str] = &[
    "the", "and", "with", "for", "our", "your", "you", "will", "have", "has", "are", "who",
    "that", "this", "from", "years", "year", "experience", "required", "preferred", "plus",
    "strong", "knowledge", "ability", "skills", "work", "working", "team",
];

/// A job admitted to the apply queue, with its score and reasons.
#[derive(Debug, Clone)]
pub struct JobMatch {
    pub job: JobPosting,
    /// 0–100.
    pub score: f32,
    pub reasons: Vec<String>,
}

impl JobMatch {
    pub fn reasoning(&self) -> String {
        if self.reasons.is_empty() {
            "Basic match".to_string()
        } else {
            self.reasons.join(" | ")
        }
    }
}

/// Result of ranking: the ordered queue plus the jobs removed by hard
/// filters, each with the reason the engine should surface.
#[derive(Debug, Default)]
pub struct RankOutcome {
    pub queue: Vec<JobMatch>,
    pub filtered: Vec<(JobPosting, SkipReason)>,
}

pub struct Ranker {
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl Ranker {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embeddings }
    }

    /// Scores and orders `jobs` for `profile`. Ordering is by descending
    /// score with a stable tie-break on job id.
    pub async fn rank(
        &self,
        profile: &Profile,
        jobs: Vec<JobPosting>,
        policy: &ApplyPolicy,
    ) -> RankOutcome {
        let profile_tokens = profile_token_set(profile);
        let profile_embedding = match self.embeddings.embed(&profile.summary_text()).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "profile embedding failed, scoring on coverage only");
                None
            }
        };

        let mut outcome = RankOutcome::default();

        for job in jobs {
            if policy.is_company_blocked(&job.company) {
                outcome.filtered.push((job, SkipReason::BlockedCompany));
                continue;
            }
            if policy.require_remote && !job.is_remote() {
                outcome.filtered.push((job, SkipReason::NotRemote));
                continue;
            }

            let semantic = match &profile_embedding {
                Some(profile_vec) => match self.embeddings.embed(&job.description_text()).await {
                    Ok(job_vec) => rescale_similarity(cosine_similarity(profile_vec, &job_vec)),
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "job embedding failed");
                        0.0
                    }
                },
                None => 0.0,
            };

            let (coverage, mut reasons) = requirement_coverage(&job, &profile_tokens);
            let score =
                (SEMANTIC_WEIGHT * semantic + COVERAGE_WEIGHT * coverage * 100.0).clamp(0.0, 100.0);

            reasons.truncate(MAX_REASONS);
            outcome.queue.push(JobMatch {
                job,
                score,
                reasons,
            });
        }

        outcome.queue.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.job.id.cmp(&b.job.id))
        });

        info!(
            queued = outcome.queue.len(),
            filtered = outcome.filtered.len(),
            "apply queue ranked"
        );
        outcome
    }
}

/// Maps raw cosine similarity to a 0–100 score. Related texts typically land
/// around 0.3–0.9 similarity, so that band is stretched over 20–100.
fn rescale_similarity(similarity: f32) -> f32 {
    ((similarity - 0.3) * (80.0 / 0.6) + 20.0).clamp(0.0, 100.0)
}

/// Fraction of requirements sharing at least one significant token with the
/// profile, plus a reason string per covered requirement.
fn requirement_coverage(job: &JobPosting, profile_tokens: &HashSet<String>) -> (f32, Vec<String>) {
    if job.requirements.is_empty() {
        return (0.0, Vec::new());
    }

    let mut covered = 0usize;
    let mut reasons = Vec::new();
    for requirement in &job.requirements {
        let overlap = significant_tokens(requirement)
            .into_iter()
            .any(|t| profile_tokens.contains(&t));
        if overlap {
            covered += 1;
            reasons.push(format!("Matches requirement: {requirement}"));
        }
    }

    (covered as f32 / job.requirements.len() as f32, reasons)
}

fn profile_token_set(profile: &Profile) -> HashSet<String> {
    let mut tokens = HashSet::new();
    for skill in &profile.skills {
        tokens.extend(significant_tokens(skill));
    }
    for bullet in &profile.bullets {
        tokens.extend(significant_tokens(&bullet.text));
        for skill in &bullet.skills {
            tokens.extend(significant_tokens(skill));
        }
    }
    tokens
}

fn significant_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::embeddings::EmbeddingError;
    use async_trait::async_trait;

    /// Returns a canned vector for any text containing the key, zero otherwise.
    struct KeyedEmbedder {
        entries: Vec<(&'static str, Vec<f32>)>,
    }

    #[async_trait]
    impl EmbeddingProvider for KeyedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            for (key, vector) in &self.entries {
                if text.contains(key) {
                    return Ok(vector.clone());
                }
            }
            Ok(vec![0.0, 0.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Empty)
        }
    }

    fn profile() -> Profile {
        Profile {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            summary: Some("Backend engineer".to_string()),
            skills: vec!["Go".to_string(), "Rust".to_string()],
            bullets: vec![crate::models::profile::Bullet {
                id: "b1".to_string(),
                text: "Built a payments service in Go".to_string(),
                source: "Initech".to_string(),
                skills: vec!["Go".to_string()],
            }],
            proofs: vec![],
        }
    }

    fn job(id: &str, title: &str, company: &str, requirements: &[&str]) -> JobPosting {
        JobPosting {
            id: id.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            location: "Berlin".to_string(),
            remote: Some(true),
            description: format!("{title} role"),
            requirements: requirements.iter().map(|r| r.to_string()).collect(),
            salary: None,
        }
    }

    fn ranker_with_uniform_embeddings() -> Ranker {
        // Every text embeds to the same vector: semantic score is constant,
        // so ordering is decided by coverage.
        Ranker::new(Arc::new(KeyedEmbedder {
            entries: vec![("", vec![1.0, 0.0])],
        }))
    }

    #[tokio::test]
    async fn test_orders_by_descending_score() {
        let ranker = ranker_with_uniform_embeddings();
        let jobs = vec![
            job("J2", "PM Senior", "OtherCo", &["management"]),
            job("J1", "Go Engineer", "OtherCo", &["Go"]),
        ];
        let outcome = ranker.rank(&profile(), jobs, &ApplyPolicy::default()).await;
        assert_eq!(outcome.queue[0].job.id, "J1");
        assert!(outcome.queue[0].score > outcome.queue[1].score);
    }

    #[tokio::test]
    async fn test_ties_break_by_job_id() {
        let ranker = ranker_with_uniform_embeddings();
        let jobs = vec![
            job("JB", "Go Engineer", "OtherCo", &["Go"]),
            job("JA", "Go Engineer", "OtherCo", &["Go"]),
        ];
        let outcome = ranker.rank(&profile(), jobs, &ApplyPolicy::default()).await;
        let ids: Vec<&str> = outcome.queue.iter().map(|m| m.job.id.as_str()).collect();
        assert_eq!(ids, vec!["JA", "JB"]);
    }

    #[tokio::test]
    async fn test_blocked_company_reported_not_queued() {
        let ranker = ranker_with_uniform_embeddings();
        let policy = ApplyPolicy {
            blocked_companies: vec!["AcmeCorp".to_string()],
            ..Default::default()
        };
        let jobs = vec![
            job("J1", "Go Engineer", "AcmeCorp", &["Go"]),
            job("J2", "Go Engineer", "OtherCo", &["Go"]),
        ];
        let outcome = ranker.rank(&profile(), jobs, &policy).await;
        assert_eq!(outcome.queue.len(), 1);
        assert_eq!(outcome.queue[0].job.id, "J2");
        assert_eq!(outcome.filtered.len(), 1);
        assert_eq!(outcome.filtered[0].0.id, "J1");
        assert_eq!(outcome.filtered[0].1, SkipReason::BlockedCompany);
    }

    #[tokio::test]
    async fn test_require_remote_filters_onsite_jobs() {
        let ranker = ranker_with_uniform_embeddings();
        let policy = ApplyPolicy {
            require_remote: true,
            ..Default::default()
        };
        let mut onsite = job("J1", "Go Engineer", "OtherCo", &["Go"]);
        onsite.remote = Some(false);
        let outcome = ranker.rank(&profile(), vec![onsite], &policy).await;
        assert!(outcome.queue.is_empty());
        assert_eq!(outcome.filtered[0].1, SkipReason::NotRemote);
    }

    #[tokio::test]
    async fn test_threshold_not_applied_here() {
        let ranker = ranker_with_uniform_embeddings();
        let policy = ApplyPolicy {
            min_match_threshold: 99.0,
            ..Default::default()
        };
        let jobs = vec![job("J1", "PM Senior", "OtherCo", &["management"])];
        let outcome = ranker.rank(&profile(), jobs, &policy).await;
        // Low-score jobs stay queued; the policy gate skips them with a reason.
        assert_eq!(outcome.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_coverage() {
        let ranker = Ranker::new(Arc::new(FailingEmbedder));
        let jobs = vec![job("J1", "Go Engineer", "OtherCo", &["Go"])];
        let outcome = ranker.rank(&profile(), jobs, &ApplyPolicy::default()).await;
        let m = &outcome.queue[0];
        // Full coverage of the single requirement: 0.3 * 100.
        assert!((m.score - 30.0).abs() < 0.01, "score was {}", m.score);
        assert!(m.reasons[0].contains("Go"));
    }

    #[test]
    fn test_rescale_similarity_band() {
        assert!((rescale_similarity(0.3) - 20.0).abs() < 0.01);
        assert!((rescale_similarity(0.9) - 100.0).abs() < 0.01);
        assert_eq!(rescale_similarity(1.0), 100.0);
        assert_eq!(rescale_similarity(0.0), 0.0);
    }

    #[test]
    fn test_stopwords_do_not_count_as_coverage() {
        let tokens = significant_tokens("strong experience with the team");
        assert!(!tokens.contains("experience"));
        assert!(!tokens.contains("the"));
    }
}
