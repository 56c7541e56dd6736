//! Phase 1: extract a job's requirements once and share them with every
//! candidate matched against that job.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm_client::LlmClient;
use crate::screening::models::{Job, JobRequirements, MatchPhase, NOT_SPECIFIED};
use crate::screening::prompts::{build_prompt, PromptKind, PromptValues};
use crate::screening::schema::{clean_list, present, validate_confidence};
use crate::screening::ScreeningError;
use crate::store::JsonStore;

const REQUIREMENTS_CONFIDENCE_FIELDS: &[&str] =
    &["required_skills", "experience_requirement", "education_requirement"];

/// Raw Phase 1 model output before validation.
#[derive(Debug, Deserialize)]
struct RawRequirements {
    required_skills: Vec<String>,
    experience_requirement: Option<String>,
    education_requirement: Option<String>,
    confidence: BTreeMap<String, f64>,
}

/// Builds the requirements prompt, calls the model and validates the answer.
/// Always issues a model call; use `RequirementsCache` for the cached path.
pub async fn extract_requirements(
    job: &Job,
    llm: &LlmClient,
) -> Result<JobRequirements, ScreeningError> {
    let prompt = build_prompt(
        PromptKind::JobRequirements,
        &PromptValues::from([("job_description", job.description.clone())]),
    )?;

    let raw: RawRequirements = llm
        .call_json(&prompt, PromptKind::JobRequirements.system())
        .await?;

    let requirements = JobRequirements {
        job_id: job.job_id,
        required_skills: clean_list(raw.required_skills),
        experience_requirement: present(raw.experience_requirement)
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        education_requirement: present(raw.education_requirement)
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        confidence: validate_confidence(&raw.confidence, REQUIREMENTS_CONFIDENCE_FIELDS)?,
        extracted_at: Utc::now(),
    };

    if requirements.required_skills.is_empty() {
        warn!("Job {} yielded no required skills", job.job_id);
    }

    info!(
        "Extracted {} required skills for job {} (experience: {}, education: {})",
        requirements.required_skills.len(),
        job.job_id,
        requirements.experience_requirement,
        requirements.education_requirement
    );

    Ok(requirements)
}

async fn load_or_extract(
    job: &Job,
    llm: &LlmClient,
    store: &JsonStore,
) -> Result<Arc<JobRequirements>, ScreeningError> {
    if let Some(stored) = store.load_requirements(job.job_id).await? {
        info!(
            "Loaded cached requirements for job {} ({})",
            job.job_id,
            MatchPhase::RequirementsCached
        );
        return Ok(Arc::new(stored));
    }

    info!("Job {}: {}", job.job_id, MatchPhase::RequirementsPending);
    let extracted = extract_requirements(job, llm).await?;
    store.save_requirements(&extracted).await?;
    info!("Job {}: {}", job.job_id, MatchPhase::RequirementsCached);
    Ok(Arc::new(extracted))
}

/// Keyed, single-flight cache of Phase 1 results.
///
/// Lookup order: memory, then the record store, then the model. Concurrent
/// callers for the same job share one in-flight extraction, so the model is
/// called at most once per job until `invalidate` drops the entry.
#[derive(Default)]
pub struct RequirementsCache {
    cells: Mutex<HashMap<Uuid, Arc<OnceCell<Arc<JobRequirements>>>>>,
}

impl RequirementsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, job_id: Uuid) -> Arc<OnceCell<Arc<JobRequirements>>> {
        let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.entry(job_id).or_default().clone()
    }

    /// Returns the cached requirements without extracting.
    pub fn get(&self, job_id: Uuid) -> Option<Arc<JobRequirements>> {
        let cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.get(&job_id).and_then(|cell| cell.get().cloned())
    }

    /// Drops the in-memory entry. Returns whether a value was cached.
    pub fn invalidate(&self, job_id: Uuid) -> bool {
        let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells
            .remove(&job_id)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Drops every in-memory entry.
    pub fn clear(&self) {
        let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.clear();
    }

    pub async fn get_or_extract(
        &self,
        job: &Job,
        llm: &LlmClient,
        store: &JsonStore,
    ) -> Result<Arc<JobRequirements>, ScreeningError> {
        let cell = self.cell(job.job_id);

        let requirements = cell
            .get_or_try_init(|| load_or_extract(job, llm, store))
            .await?;

        Ok(requirements.clone())
    }

    /// Explicit re-extraction: forgets memory and disk copies, then extracts anew.
    pub async fn refresh(
        &self,
        job: &Job,
        llm: &LlmClient,
        store: &JsonStore,
    ) -> Result<Arc<JobRequirements>, ScreeningError> {
        self.invalidate(job.job_id);
        store.delete_requirements(job.job_id).await?;
        info!("Requirements for job {} invalidated", job.job_id);
        self.get_or_extract(job, llm, store).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm_client::testing::ScriptedTransport;
    use crate::llm_client::{LlmError, RetryPolicy};

    const REQUIREMENTS_JSON: &str = r#"{
        "required_skills": ["Python", "SQL", " python "],
        "experience_requirement": "3+ years",
        "education_requirement": "Bachelor's",
        "confidence": {"required_skills": 95, "experience_requirement": 90, "education_requirement": 88}
    }"#;

    fn llm(transport: Arc<ScriptedTransport>) -> LlmClient {
        LlmClient::new(
            transport,
            RetryPolicy {
                jitter: Duration::ZERO,
                ..RetryPolicy::default()
            },
            Duration::from_secs(30),
        )
    }

    fn job() -> Job {
        Job {
            job_id: Uuid::new_v4(),
            title: "Data Engineer".to_string(),
            description: "Requires Python and SQL, 3+ years, Bachelor's degree".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_extract_requirements_cleans_and_validates() {
        let transport = Arc::new(ScriptedTransport::queue(vec![Ok(REQUIREMENTS_JSON.into())]));
        let requirements = extract_requirements(&job(), &llm(transport)).await.unwrap();

        assert_eq!(requirements.required_skills, vec!["Python", "SQL"]);
        assert_eq!(requirements.experience_requirement, "3+ years");
        assert_eq!(requirements.confidence["required_skills"], 95);
    }

    #[tokio::test]
    async fn test_missing_requirements_become_not_specified() {
        let transport = Arc::new(ScriptedTransport::queue(vec![Ok(r#"{
            "required_skills": ["Rust"],
            "experience_requirement": null,
            "education_requirement": "",
            "confidence": {"required_skills": 90, "experience_requirement": 20, "education_requirement": 10}
        }"#
        .into())]));
        let requirements = extract_requirements(&job(), &llm(transport)).await.unwrap();

        assert_eq!(requirements.experience_requirement, NOT_SPECIFIED);
        assert_eq!(requirements.education_requirement, NOT_SPECIFIED);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_content_failure() {
        let transport = Arc::new(ScriptedTransport::queue(vec![Ok(r#"{
            "required_skills": ["Rust"],
            "experience_requirement": "2 years",
            "education_requirement": "none",
            "confidence": {"required_skills": 140, "experience_requirement": 90, "education_requirement": 90}
        }"#
        .into())]));
        let err = extract_requirements(&job(), &llm(transport)).await.unwrap_err();
        assert!(matches!(err, ScreeningError::Schema(_)));
    }

    #[tokio::test]
    async fn test_second_call_is_a_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::queue(vec![Ok(REQUIREMENTS_JSON.into())]));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let job = job();
        store.save_job(&job).await.unwrap();

        let first = cache.get_or_extract(&job, &llm, &store).await.unwrap();
        let second = cache.get_or_extract(&job, &llm, &store).await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(REQUIREMENTS_JSON.to_string())));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let job = job();
        store.save_job(&job).await.unwrap();

        let (a, b) = tokio::join!(
            cache.get_or_extract(&job, &llm, &store),
            cache.get_or_extract(&job, &llm, &store)
        );

        assert_eq!(transport.calls(), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_disk_copy_survives_a_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(REQUIREMENTS_JSON.to_string())));
        let llm = llm(transport.clone());
        let job = job();
        store.save_job(&job).await.unwrap();

        let first = RequirementsCache::new()
            .get_or_extract(&job, &llm, &store)
            .await
            .unwrap();
        let restarted = RequirementsCache::new()
            .get_or_extract(&job, &llm, &store)
            .await
            .unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(first, restarted);
    }

    #[tokio::test]
    async fn test_refresh_re_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(REQUIREMENTS_JSON.to_string())));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let job = job();
        store.save_job(&job).await.unwrap();

        cache.get_or_extract(&job, &llm, &store).await.unwrap();
        cache.refresh(&job, &llm, &store).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(cache.get(job.job_id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_extraction_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::queue(vec![
            Err(LlmError::Api {
                status: 400,
                message: "context length exceeded".to_string(),
            }),
            Ok(REQUIREMENTS_JSON.into()),
        ]));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let job = job();
        store.save_job(&job).await.unwrap();

        assert!(cache.get_or_extract(&job, &llm, &store).await.is_err());
        assert!(cache.get(job.job_id).is_none());
        assert!(cache.get_or_extract(&job, &llm, &store).await.is_ok());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_drops_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(REQUIREMENTS_JSON.to_string())));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let (first, second) = (job(), job());
        store.save_job(&first).await.unwrap();
        store.save_job(&second).await.unwrap();

        cache.get_or_extract(&first, &llm, &store).await.unwrap();
        cache.get_or_extract(&second, &llm, &store).await.unwrap();
        cache.clear();

        assert!(cache.get(first.job_id).is_none());
        assert!(cache.get(second.job_id).is_none());
    }

    #[tokio::test]
    async fn test_deleted_job_requirements_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(REQUIREMENTS_JSON.to_string())));
        let llm = llm(transport.clone());
        let cache = RequirementsCache::new();
        let job = job();
        store.save_job(&job).await.unwrap();
        store.delete_job(job.job_id).await.unwrap();

        let err = cache.get_or_extract(&job, &llm, &store).await.unwrap_err();

        assert!(matches!(err, ScreeningError::Storage(_)));
        assert!(cache.get(job.job_id).is_none());
        assert!(store.load_requirements(job.job_id).await.unwrap().is_none());
    }
}
