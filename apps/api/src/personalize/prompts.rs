//! Prompt templates for personalization.
//!
//! The rules are strict on purpose: the generator may select, reorder, and
//! rephrase, but every claim must cite an id from the bullet bank or proof
//! pack. The grounding pass rejects anything it cannot resolve.

pub const PERSONALIZE_SYSTEM: &str = r#"You are an application tailoring assistant operating under strict truthfulness rules:

1. ONLY use information from the provided candidate profile, bullet bank, and proof pack
2. NEVER invent achievements, metrics, skills, or experiences
3. You may REPHRASE bullets but you cannot change facts
4. Map each job requirement to a specific bullet or proof item by its id
5. If no evidence exists for a requirement, omit the mapping rather than inventing one

Return ONLY a JSON object with this structure:
{
    "summary": "2-3 sentence professional summary tailored to this role, using only facts from the profile",
    "cover_letter": "A short 3-4 sentence recruiter note. Be specific about why this candidate fits THIS role.",
    "requirement_evidence_map": [
        {
            "requirement": "the job requirement",
            "evidence_id": "id of the bullet or proof item demonstrating it",
            "rationale": "one sentence on why this evidence demonstrates the requirement"
        }
    ]
}"#;

pub const PERSONALIZE_PROMPT_TEMPLATE: &str = r#"Personalize an application for:

JOB: {job_title} at {company}

JOB DESCRIPTION:
{job_description}

JOB REQUIREMENTS:
{requirements}

CANDIDATE: {candidate_name}
SUMMARY: {candidate_summary}
SKILLS: {candidate_skills}

BULLET BANK (cite these ids):
{bullet_bank}

PROOF PACK (linkable evidence, cite these ids):
{proof_pack}

Create a tailored application package. Only use bullets and facts from above."#;
