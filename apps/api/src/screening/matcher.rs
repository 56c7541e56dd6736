//! Phase 2 and the batch workflow around it.
//!
//! A batch resolves the job's requirements once (Phase 1, cached), fans the
//! candidates out with a bounded number of in-flight model calls, verifies
//! every result locally and returns them ranked.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::llm_client::LlmClient;
use crate::screening::models::{
    BatchReport, CandidateOutcome, Job, JobRequirements, MatchPhase, MatchResult,
    ResumeExtraction, MAX_EDUCATION_POINTS, MAX_EXPERIENCE_POINTS, MAX_SKILLS_POINTS,
    NOT_MENTIONED,
};
use crate::screening::prompts::{build_prompt, PromptKind, PromptValues};
use crate::screening::requirements::RequirementsCache;
use crate::screening::schema::{clean_list, validate_confidence, validate_points};
use crate::screening::ScreeningError;
use crate::store::JsonStore;

const MATCH_CONFIDENCE_FIELDS: &[&str] = &["skills", "experience", "education"];

#[derive(Debug, Deserialize)]
struct RawMatch {
    total_required_skills: usize,
    match_score: f64,
    #[serde(default)]
    matched_skills: Vec<String>,
    #[serde(default)]
    missing_skills: Vec<String>,
    experience_match: String,
    education_match: String,
    overall_explanation: String,
    score_breakdown: RawBreakdown,
    confidence: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct RawBreakdown {
    skills_points: f64,
    experience_points: f64,
    education_points: f64,
    #[serde(default)]
    calculation: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    /// Upper bound on concurrent Phase 2 calls.
    pub max_concurrent: usize,
    /// Confidence values at or below this flag a result for review.
    pub review_threshold: u8,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            review_threshold: 60,
        }
    }
}

/// Recomputes the total from its components. On disagreement the total and
/// calculation text are replaced and `math_corrected` is set.
/// Returns whether a correction was made.
pub fn verify_math(result: &mut MatchResult) -> bool {
    let sum = result.component_sum();
    if result.total_score == sum {
        return false;
    }

    warn!(
        "Math correction for resume {}: reported {}, components sum to {}",
        result.resume_id, result.total_score, sum
    );
    result.total_score = sum;
    result.calculation = format!(
        "{} + {} + {} = {}",
        result.skills_points, result.experience_points, result.education_points, sum
    );
    result.math_corrected = true;
    true
}

/// Flags the result for review when any confidence value is at or below `threshold`.
/// Advisory only.
pub fn gate_confidence(result: &mut MatchResult, threshold: u8) {
    result.low_confidence_fields = result
        .confidence
        .iter()
        .filter(|(_, &value)| value <= threshold)
        .map(|(field, _)| field.clone())
        .collect();
    result.needs_review = !result.low_confidence_fields.is_empty();

    if result.needs_review {
        warn!(
            "Low confidence for resume {} ({}); flagged for review",
            result.resume_id,
            result.low_confidence_fields.join(", ")
        );
    }
}

/// Descending total score, ties broken by resume id.
pub fn compare_results(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| a.resume_id.cmp(&b.resume_id))
}

/// Ranks successes by `compare_results`; failures follow, by resume id.
pub fn rank_outcomes(outcomes: &mut [CandidateOutcome]) {
    outcomes.sort_by(|a, b| match (a.result(), b.result()) {
        (Some(a), Some(b)) => compare_results(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.resume_id().cmp(&b.resume_id()),
    });
}

/// Values shared by every candidate of a job. Rendered deterministically from
/// the cached requirements so the section is byte-identical across candidates.
fn requirement_values(requirements: &JobRequirements) -> PromptValues {
    PromptValues::from([
        (
            "required_skills",
            json!(requirements.required_skills).to_string(),
        ),
        (
            "total_skills",
            requirements.required_skills.len().to_string(),
        ),
        (
            "experience_requirement",
            requirements.experience_requirement.clone(),
        ),
        (
            "education_requirement",
            requirements.education_requirement.clone(),
        ),
    ])
}

/// Candidate data sent to the model. Name and contact details are left out.
fn candidate_profile(resume: &ResumeExtraction) -> String {
    let profile = json!({
        "skills": resume.skills,
        "experience": resume.experience.as_deref().unwrap_or(NOT_MENTIONED),
        "education": resume.education.as_deref().unwrap_or(NOT_MENTIONED),
        "summary": resume.summary.as_deref().unwrap_or(NOT_MENTIONED),
    });
    format!("{profile:#}")
}

#[derive(Clone)]
pub struct TwoPhaseMatcher {
    llm: LlmClient,
    store: JsonStore,
    cache: Arc<RequirementsCache>,
    settings: MatchSettings,
}

impl TwoPhaseMatcher {
    pub fn new(llm: LlmClient, store: JsonStore, settings: MatchSettings) -> Self {
        Self {
            llm,
            store,
            cache: Arc::new(RequirementsCache::new()),
            settings,
        }
    }

    /// Phase 1, cached.
    pub async fn requirements(&self, job: &Job) -> Result<Arc<JobRequirements>, ScreeningError> {
        self.cache.get_or_extract(job, &self.llm, &self.store).await
    }

    pub async fn refresh_requirements(
        &self,
        job: &Job,
    ) -> Result<Arc<JobRequirements>, ScreeningError> {
        self.cache.refresh(job, &self.llm, &self.store).await
    }

    /// Drops the in-memory requirements of a deleted job.
    pub fn forget_job(&self, job_id: Uuid) {
        self.cache.invalidate(job_id);
    }

    /// Drops the in-memory requirements of every job.
    pub fn forget_all_jobs(&self) {
        self.cache.clear();
    }

    /// Phase 2 for one candidate, followed by math verification and
    /// confidence gating.
    pub async fn match_candidate(
        &self,
        requirements: &JobRequirements,
        resume: &ResumeExtraction,
    ) -> Result<MatchResult, ScreeningError> {
        info!(
            "Job {} / resume {}: {}",
            requirements.job_id,
            resume.resume_id,
            MatchPhase::MatchingCandidate
        );

        let mut values = requirement_values(requirements);
        values.insert("resume_json", candidate_profile(resume));
        let prompt = build_prompt(PromptKind::Match, &values)?;
        let raw: RawMatch = self
            .llm
            .call_json(&prompt, PromptKind::Match.system())
            .await?;

        let required = requirements.required_skills.len();
        if raw.total_required_skills != required {
            warn!(
                "Resume {}: model counted {} required skills, cached requirements list {}",
                resume.resume_id, raw.total_required_skills, required
            );
        }

        let skills_points = validate_points(
            raw.score_breakdown.skills_points,
            MAX_SKILLS_POINTS,
            "skills_points",
        )?;
        let experience_points = validate_points(
            raw.score_breakdown.experience_points,
            MAX_EXPERIENCE_POINTS,
            "experience_points",
        )?;
        let education_points = validate_points(
            raw.score_breakdown.education_points,
            MAX_EDUCATION_POINTS,
            "education_points",
        )?;
        let mut reported_total = validate_points(raw.match_score, 100, "match_score")?;
        let mut calculation = raw.score_breakdown.calculation;

        // Rounding fractional components can shift their sum by a point. A total
        // that agrees with the unrounded components is taken as consistent.
        let unrounded_sum = raw.score_breakdown.skills_points
            + raw.score_breakdown.experience_points
            + raw.score_breakdown.education_points;
        let rounded_sum = skills_points + experience_points + education_points;
        if (unrounded_sum - raw.match_score).abs() < 0.5 && reported_total != rounded_sum {
            reported_total = rounded_sum;
            calculation = format!(
                "{skills_points} + {experience_points} + {education_points} = {rounded_sum}"
            );
        }

        let confidence = validate_confidence(&raw.confidence, MATCH_CONFIDENCE_FIELDS)?;

        let matched_skills = clean_list(raw.matched_skills);
        let missing_skills = clean_list(raw.missing_skills);

        let reasoning = BTreeMap::from([
            (
                "skills".to_string(),
                format!(
                    "Matched {} of {} required skills",
                    matched_skills.len(),
                    required
                ),
            ),
            ("experience".to_string(), raw.experience_match),
            ("education".to_string(), raw.education_match),
            ("overall".to_string(), raw.overall_explanation),
        ]);

        let mut result = MatchResult {
            job_id: requirements.job_id,
            resume_id: resume.resume_id,
            candidate_name: resume.display_name().to_string(),
            skills_points,
            experience_points,
            education_points,
            total_score: reported_total,
            total_required_skills: required,
            matched_skills,
            missing_skills,
            reasoning,
            calculation,
            confidence,
            math_corrected: false,
            needs_review: false,
            low_confidence_fields: Vec::new(),
            matched_at: Utc::now(),
        };

        verify_math(&mut result);
        gate_confidence(&mut result, self.settings.review_threshold);

        info!(
            "Job {} / resume {}: {} (score {})",
            result.job_id,
            result.resume_id,
            MatchPhase::ResultReady,
            result.total_score
        );

        Ok(result)
    }

    async fn score_and_store(
        &self,
        requirements: &JobRequirements,
        resume: ResumeExtraction,
    ) -> CandidateOutcome {
        let err = match self.match_candidate(requirements, &resume).await {
            Ok(result) => match self.store.save_match(&result).await {
                Ok(()) => return CandidateOutcome::Ready(result),
                Err(e) => ScreeningError::Storage(e),
            },
            Err(e) => e,
        };

        warn!(
            "Job {} / resume {}: {} ({err})",
            requirements.job_id,
            resume.resume_id,
            MatchPhase::Failed
        );
        CandidateOutcome::Failed {
            resume_id: resume.resume_id,
            candidate_name: resume.display_name().to_string(),
            kind: err.failure_kind(),
            reason: err.to_string(),
        }
    }

    /// Runs the full two-phase workflow for `resumes` against `job`.
    ///
    /// A Phase 1 failure aborts the batch. Phase 2 failures are recorded per
    /// candidate and never affect the others.
    pub async fn run(
        &self,
        job: &Job,
        resumes: Vec<ResumeExtraction>,
    ) -> Result<BatchReport, ScreeningError> {
        info!(
            "Matching {} candidates against job {} ({})",
            resumes.len(),
            job.job_id,
            MatchPhase::Idle
        );

        let requirements = self.requirements(job).await.map_err(|e| {
            error!("Job {}: {} during requirement extraction: {e}", job.job_id, MatchPhase::Failed);
            e
        })?;

        let mut outcomes: Vec<CandidateOutcome> = stream::iter(resumes)
            .map(|resume| self.score_and_store(&requirements, resume))
            .buffer_unordered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        rank_outcomes(&mut outcomes);

        let matched = outcomes.iter().filter(|o| o.result().is_some()).count();
        let failed = outcomes.len() - matched;
        info!(
            "Job {}: {} matched, {} failed",
            job.job_id, matched, failed
        );

        Ok(BatchReport {
            job_id: job.job_id,
            phase: MatchPhase::ResultReady,
            requirements: requirements.as_ref().clone(),
            outcomes,
            matched,
            failed,
        })
    }
}
