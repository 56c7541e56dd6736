//! File-backed record store. One JSON document per record:
//!
//! ```text
//! <root>/jobs/<job_id>/job.json
//! <root>/jobs/<job_id>/requirements.json
//! <root>/jobs/<job_id>/matches/<resume_id>.json
//! <root>/resumes/<resume_id>.json
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so a reader never observes a partial record.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::screening::models::{Job, JobRequirements, MatchResult, ResumeExtraction};

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
    /// Writes under an existing job hold this shared; job deletion holds it
    /// exclusively, so nothing lands in a job directory after it is removed.
    job_lock: Arc<RwLock<()>>,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            job_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Creates the top-level directories.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [self.jobs_dir(), self.resumes_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        }
        info!("Record store ready at {}", self.root.display());
        Ok(())
    }

    // ── jobs ────────────────────────────────────────────────────────────────

    pub async fn save_job(&self, job: &Job) -> Result<()> {
        write_json_atomic(self.job_dir(job.job_id).join("job.json"), job).await
    }

    pub async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        read_json(&self.job_dir(job_id).join("job.json")).await
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for dir in list_dirs(&self.jobs_dir()).await? {
            if let Some(job) = read_json::<Job>(&dir.join("job.json")).await? {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Removes the job together with its cached requirements and match results.
    pub async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        let _guard = self.job_lock.write().await;
        remove_dir_if_exists(&self.job_dir(job_id)).await
    }

    /// Removes every job directory. Returns how many were removed.
    pub async fn delete_all_jobs(&self) -> Result<usize> {
        let _guard = self.job_lock.write().await;
        let mut deleted = 0;
        for dir in list_dirs(&self.jobs_dir()).await? {
            if remove_dir_if_exists(&dir).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Writes a record that belongs to a job. Fails when the job is gone so a
    /// late writer cannot recreate a deleted job's directory.
    async fn write_job_record<T: Serialize>(
        &self,
        job_id: Uuid,
        path: PathBuf,
        value: &T,
    ) -> Result<()> {
        let _guard = self.job_lock.read().await;
        let job_file = self.job_dir(job_id).join("job.json");
        if !tokio::fs::try_exists(&job_file)
            .await
            .with_context(|| format!("Failed to check {}", job_file.display()))?
        {
            bail!("Job {job_id} no longer exists");
        }
        write_json_atomic(path, value).await
    }

    // ── requirements ────────────────────────────────────────────────────────

    pub async fn save_requirements(&self, requirements: &JobRequirements) -> Result<()> {
        self.write_job_record(
            requirements.job_id,
            self.requirements_path(requirements.job_id),
            requirements,
        )
        .await
    }

    pub async fn load_requirements(&self, job_id: Uuid) -> Result<Option<JobRequirements>> {
        read_json(&self.requirements_path(job_id)).await
    }

    pub async fn delete_requirements(&self, job_id: Uuid) -> Result<bool> {
        remove_file_if_exists(&self.requirements_path(job_id)).await
    }

    // ── resumes ─────────────────────────────────────────────────────────────

    pub async fn save_resume(&self, resume: &ResumeExtraction) -> Result<()> {
        write_json_atomic(self.resume_path(resume.resume_id), resume).await
    }

    pub async fn load_resume(&self, resume_id: Uuid) -> Result<Option<ResumeExtraction>> {
        read_json(&self.resume_path(resume_id)).await
    }

    /// All parsed resumes, oldest first.
    pub async fn list_resumes(&self) -> Result<Vec<ResumeExtraction>> {
        let mut resumes: Vec<ResumeExtraction> = read_json_dir(&self.resumes_dir()).await?;
        resumes.sort_by(|a, b| a.parsed_at.cmp(&b.parsed_at));
        Ok(resumes)
    }

    /// Removes a resume and every match result that refers to it.
    pub async fn delete_resume(&self, resume_id: Uuid) -> Result<bool> {
        let removed = remove_file_if_exists(&self.resume_path(resume_id)).await?;
        for job_dir in list_dirs(&self.jobs_dir()).await? {
            let match_path = job_dir
                .join("matches")
                .join(format!("{resume_id}.json"));
            remove_file_if_exists(&match_path).await?;
        }
        Ok(removed)
    }

    pub async fn delete_all_resumes(&self) -> Result<usize> {
        let resumes = self.list_resumes().await?;
        for resume in &resumes {
            self.delete_resume(resume.resume_id).await?;
        }
        Ok(resumes.len())
    }

    // ── match results ───────────────────────────────────────────────────────

    pub async fn save_match(&self, result: &MatchResult) -> Result<()> {
        let path = self
            .job_dir(result.job_id)
            .join("matches")
            .join(format!("{}.json", result.resume_id));
        self.write_job_record(result.job_id, path, result).await
    }

    pub async fn load_matches(&self, job_id: Uuid) -> Result<Vec<MatchResult>> {
        read_json_dir(&self.job_dir(job_id).join("matches")).await
    }

    // ── paths ───────────────────────────────────────────────────────────────

    fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    fn resumes_dir(&self) -> PathBuf {
        self.root.join("resumes")
    }

    fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.jobs_dir().join(job_id.to_string())
    }

    fn requirements_path(&self, job_id: Uuid) -> PathBuf {
        self.job_dir(job_id).join("requirements.json")
    }

    fn resume_path(&self, resume_id: Uuid) -> PathBuf {
        self.resumes_dir().join(format!("{resume_id}.json"))
    }
}

/// Serializes `value` and atomically replaces `path` with it.
async fn write_json_atomic<T: Serialize>(path: PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize record")?;

    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("Record path {} has no parent", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to persist {}", path.display()))?;
        Ok(())
    })
    .await
    .context("Record writer task panicked")?
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Corrupt record {}", path.display()))?;
    Ok(Some(value))
}

/// Reads every `*.json` record in `dir`. Unreadable records are skipped with a warning.
async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_json::<T>(&path).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record: {e:#}"),
        }
    }
    Ok(records)
}

async fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{Duration, Utc};

    use super::*;
    use crate::screening::models::{OutputLanguage, TextQuality};

    fn job(title: &str) -> Job {
        Job {
            job_id: Uuid::new_v4(),
            title: title.to_string(),
            description: "Python and SQL, 3+ years".to_string(),
            created_at: Utc::now(),
        }
    }

    fn resume() -> ResumeExtraction {
        ResumeExtraction {
            resume_id: Uuid::new_v4(),
            file_name: "jane.pdf".to_string(),
            name: Some("Jane Doe".to_string()),
            email: None,
            phone: None,
            skills: BTreeSet::from(["Python".to_string()]),
            experience: Some("5 years".to_string()),
            education: None,
            summary: None,
            confidence: BTreeMap::from([("skills".to_string(), 90)]),
            output_language: OutputLanguage::English,
            text_quality: TextQuality::Digital,
            parsed_at: Utc::now(),
        }
    }

    fn match_for(job_id: Uuid, resume_id: Uuid) -> MatchResult {
        MatchResult {
            job_id,
            resume_id,
            candidate_name: "Jane Doe".to_string(),
            skills_points: 40,
            experience_points: 35,
            education_points: 25,
            total_score: 100,
            total_required_skills: 2,
            matched_skills: vec!["Python".to_string(), "SQL".to_string()],
            missing_skills: vec![],
            reasoning: BTreeMap::new(),
            calculation: "40 + 35 + 25 = 100".to_string(),
            confidence: BTreeMap::new(),
            math_corrected: false,
            needs_review: false,
            low_confidence_fields: vec![],
            matched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_job_round_trip_and_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.ensure_layout().await.unwrap();

        let mut older = job("Older");
        older.created_at = Utc::now() - Duration::days(1);
        let newer = job("Newer");
        store.save_job(&older).await.unwrap();
        store.save_job(&newer).await.unwrap();

        let loaded = store.load_job(newer.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Newer");

        let titles: Vec<String> = store
            .list_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.title)
            .collect();
        assert_eq!(titles, vec!["Newer".to_string(), "Older".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_records_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert!(store.load_job(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.load_requirements(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.list_resumes().await.unwrap().is_empty());
        assert!(store.load_matches(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let resume = resume();

        store.save_resume(&resume).await.unwrap();
        store.save_resume(&resume).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("resumes"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].to_string_lossy(),
            format!("{}.json", resume.resume_id)
        );
    }

    #[tokio::test]
    async fn test_delete_resume_removes_its_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let job = job("Backend");
        let resume = resume();
        store.save_job(&job).await.unwrap();
        store.save_resume(&resume).await.unwrap();
        store
            .save_match(&match_for(job.job_id, resume.resume_id))
            .await
            .unwrap();
        assert_eq!(store.load_matches(job.job_id).await.unwrap().len(), 1);

        assert!(store.delete_resume(resume.resume_id).await.unwrap());
        assert!(store.load_resume(resume.resume_id).await.unwrap().is_none());
        assert!(store.load_matches(job.job_id).await.unwrap().is_empty());
        assert!(!store.delete_resume(resume.resume_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped_in_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.save_resume(&resume()).await.unwrap();
        std::fs::write(dir.path().join("resumes").join("broken.json"), b"{ nope").unwrap();

        assert_eq!(store.list_resumes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_job_removes_everything_under_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let job = job("Backend");
        store.save_job(&job).await.unwrap();
        store
            .save_match(&match_for(job.job_id, Uuid::new_v4()))
            .await
            .unwrap();

        assert!(store.delete_job(job.job_id).await.unwrap());
        assert!(store.load_job(job.job_id).await.unwrap().is_none());
        assert!(store.load_matches(job.job_id).await.unwrap().is_empty());
        assert!(!store.delete_job(job.job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_jobs_removes_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.ensure_layout().await.unwrap();
        let first = job("Backend");
        let second = job("Frontend");
        store.save_job(&first).await.unwrap();
        store.save_job(&second).await.unwrap();
        store
            .save_match(&match_for(first.job_id, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.delete_all_jobs().await.unwrap(), 2);
        assert!(store.list_jobs().await.unwrap().is_empty());
        assert!(store.load_matches(first.job_id).await.unwrap().is_empty());
        assert_eq!(store.delete_all_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writes_for_a_deleted_job_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let job = job("Backend");
        store.save_job(&job).await.unwrap();
        assert!(store.delete_job(job.job_id).await.unwrap());

        assert!(store
            .save_match(&match_for(job.job_id, Uuid::new_v4()))
            .await
            .is_err());
        let requirements = JobRequirements {
            job_id: job.job_id,
            required_skills: vec!["Python".to_string()],
            experience_requirement: "3+ years".to_string(),
            education_requirement: "Not specified".to_string(),
            confidence: BTreeMap::new(),
            extracted_at: Utc::now(),
        };
        assert!(store.save_requirements(&requirements).await.is_err());
        assert!(!dir.path().join("jobs").join(job.job_id.to_string()).exists());
    }
}
