use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rendered in place of any field the source document does not mention.
pub const NOT_MENTIONED: &str = "Not mentioned";
/// Rendered in place of any requirement the job description does not state.
pub const NOT_SPECIFIED: &str = "Not specified";

pub const MAX_SKILLS_POINTS: u32 = 40;
pub const MAX_EXPERIENCE_POINTS: u32 = 35;
pub const MAX_EDUCATION_POINTS: u32 = 25;

/// Field → self-reported model certainty, always within 0..=100.
pub type ConfidenceMap = BTreeMap<String, u8>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Phase 1 output. Extracted once per job, then shared read-only by every
/// candidate match for that job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub job_id: Uuid,
    pub required_skills: Vec<String>,
    pub experience_requirement: String,
    pub education_requirement: String,
    pub confidence: ConfidenceMap,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLanguage {
    #[default]
    English,
    Arabic,
}

impl OutputLanguage {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "ar" | "arabic" => Some(Self::Arabic),
            _ => None,
        }
    }
}

/// How the resume text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextQuality {
    /// Text layer extracted directly from the document.
    Digital,
    /// Very little text came out; likely a scanned document.
    Sparse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeExtraction {
    pub resume_id: Uuid,
    pub file_name: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub skills: BTreeSet<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub summary: Option<String>,
    pub confidence: ConfidenceMap,
    pub output_language: OutputLanguage,
    pub text_quality: TextQuality,
    pub parsed_at: DateTime<Utc>,
}

impl ResumeExtraction {
    /// Display name, falling back to the uploaded file name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file_name)
    }
}

/// Phase 2 output for one (job, candidate) pair, after local verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub job_id: Uuid,
    pub resume_id: Uuid,
    pub candidate_name: String,
    pub skills_points: u32,
    pub experience_points: u32,
    pub education_points: u32,
    pub total_score: u32,
    pub total_required_skills: usize,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    /// "skills" | "experience" | "education" | "overall" → explanation.
    pub reasoning: BTreeMap<String, String>,
    pub calculation: String,
    pub confidence: ConfidenceMap,
    /// The upstream total disagreed with its own components and was replaced.
    pub math_corrected: bool,
    /// Advisory only: some confidence value was at or below the review threshold.
    pub needs_review: bool,
    pub low_confidence_fields: Vec<String>,
    pub matched_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn component_sum(&self) -> u32 {
        self.skills_points + self.experience_points + self.education_points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limiting or transport errors outlasted the retry policy.
    TransientExhausted,
    /// The model answered with unparseable or out-of-schema output.
    Content,
    /// The model API rejected the request outright.
    Upstream,
    /// A prompt could not be built.
    Configuration,
    Storage,
    /// The document did not pass the resume keyword check.
    Rejected,
}

/// Per-candidate outcome of a batch. Failures never abort sibling candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Ready(MatchResult),
    Failed {
        resume_id: Uuid,
        candidate_name: String,
        kind: FailureKind,
        reason: String,
    },
}

impl CandidateOutcome {
    pub fn result(&self) -> Option<&MatchResult> {
        match self {
            CandidateOutcome::Ready(result) => Some(result),
            CandidateOutcome::Failed { .. } => None,
        }
    }

    pub fn resume_id(&self) -> Uuid {
        match self {
            CandidateOutcome::Ready(result) => result.resume_id,
            CandidateOutcome::Failed { resume_id, .. } => *resume_id,
        }
    }
}

/// States of the two-phase workflow, reported in logs and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Idle,
    RequirementsPending,
    RequirementsCached,
    MatchingCandidate,
    ResultReady,
    Failed,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchPhase::Idle => "idle",
            MatchPhase::RequirementsPending => "requirements_pending",
            MatchPhase::RequirementsCached => "requirements_cached",
            MatchPhase::MatchingCandidate => "matching_candidate",
            MatchPhase::ResultReady => "result_ready",
            MatchPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub job_id: Uuid,
    pub phase: MatchPhase,
    pub requirements: JobRequirements,
    /// Successes by descending total_score, then failures.
    pub outcomes: Vec<CandidateOutcome>,
    pub matched: usize,
    pub failed: usize,
}

impl BatchReport {
    /// Top `n` successful results (the outcome list is already ranked).
    pub fn shortlist(&self, n: usize) -> Vec<MatchResult> {
        self.outcomes
            .iter()
            .filter_map(CandidateOutcome::result)
            .take(n)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_language_codes() {
        assert_eq!(OutputLanguage::from_code("ar"), Some(OutputLanguage::Arabic));
        assert_eq!(OutputLanguage::from_code(" EN "), Some(OutputLanguage::English));
        assert_eq!(OutputLanguage::from_code("fr"), None);
        assert_eq!(OutputLanguage::default(), OutputLanguage::English);
    }

    #[test]
    fn test_failed_outcome_serializes_with_status_tag() {
        let outcome = CandidateOutcome::Failed {
            resume_id: Uuid::nil(),
            candidate_name: "cv.pdf".to_string(),
            kind: FailureKind::Content,
            reason: "invalid model output".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "content");
    }

    #[test]
    fn test_match_phase_display() {
        assert_eq!(MatchPhase::RequirementsCached.to_string(), "requirements_cached");
        assert_eq!(MatchPhase::ResultReady.to_string(), "result_ready");
    }
}
