use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::screening::matcher::compare_results;
use crate::screening::models::{
    BatchReport, Job, JobRequirements, MatchResult, OutputLanguage, ResumeExtraction,
};
use crate::screening::resume_parser::parse_resume;
use crate::screening::text_extract::{extract_text, ExtractedText, TextExtractError};
use crate::screening::ScreeningError;
use crate::state::AppState;

/// Shortlist length when the request does not name one.
const DEFAULT_SHORTLIST: usize = 3;

#[derive(Deserialize)]
pub struct LanguageQuery {
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileIssue {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UploadResponse {
    pub parsed: Vec<ResumeExtraction>,
    pub rejected: Vec<FileIssue>,
    pub failed: Vec<FileIssue>,
}

enum FileOutcome {
    Parsed(ResumeExtraction),
    Rejected(FileIssue),
    Failed(FileIssue),
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchRequest {
    pub resume_ids: Option<Vec<Uuid>>,
    pub shortlist: Option<usize>,
}

#[derive(Serialize)]
pub struct MatchResponse {
    #[serde(flatten)]
    pub report: BatchReport,
    pub shortlist: Vec<MatchResult>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

async fn extract_blocking(file_name: String, data: Bytes) -> Result<ExtractedText, AppError> {
    let extracted = tokio::task::spawn_blocking(move || extract_text(&file_name, &data))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("text extraction task failed: {e}")))?;
    extracted.map_err(|e| match e {
        TextExtractError::UnsupportedType(_) => AppError::Validation(e.to_string()),
        _ => AppError::UnprocessableEntity(e.to_string()),
    })
}

async fn process_upload(
    state: &AppState,
    file_name: String,
    data: Bytes,
    language: OutputLanguage,
) -> FileOutcome {
    let extracted = match extract_blocking(file_name.clone(), data).await {
        Ok(extracted) => extracted,
        Err(AppError::Validation(reason)) => {
            return FileOutcome::Rejected(FileIssue { file_name, reason })
        }
        Err(e) => {
            return FileOutcome::Failed(FileIssue {
                file_name,
                reason: e.to_string(),
            })
        }
    };

    let resume_id = Uuid::new_v4();
    let parsed = parse_resume(resume_id, &file_name, &extracted, language, &state.llm).await;
    let resume = match parsed {
        Ok(resume) => resume,
        Err(ScreeningError::NotAResume(reason)) => {
            return FileOutcome::Rejected(FileIssue { file_name, reason })
        }
        Err(e) => {
            warn!("Resume {file_name} failed: {e}");
            return FileOutcome::Failed(FileIssue {
                file_name,
                reason: e.to_string(),
            });
        }
    };

    match state.store.save_resume(&resume).await {
        Ok(()) => FileOutcome::Parsed(resume),
        Err(e) => FileOutcome::Failed(FileIssue {
            file_name,
            reason: format!("{e:#}"),
        }),
    }
}

/// POST /api/v1/resumes
/// Multipart, one or more `resumes` file fields. `?language=ar` switches output to Arabic.
pub async fn handle_upload_resumes(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let language = match query.language.as_deref() {
        None => OutputLanguage::default(),
        Some(code) => OutputLanguage::from_code(code)
            .ok_or_else(|| AppError::Validation(format!("Unsupported language '{code}'")))?,
    };

    let mut files: Vec<(String, Bytes)> = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("resumes") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("resume").to_string();
        let data = field.bytes().await?;
        files.push((file_name, data));
    }

    if files.is_empty() {
        return Err(AppError::Validation(
            "No files uploaded in the 'resumes' field".to_string(),
        ));
    }

    info!("Processing {} uploaded resumes", files.len());
    let outcomes: Vec<FileOutcome> = stream::iter(files)
        .map(|(file_name, data)| process_upload(&state, file_name, data, language))
        .buffered(state.config.max_concurrent_requests.max(1))
        .collect()
        .await;

    let mut response = UploadResponse::default();
    for outcome in outcomes {
        match outcome {
            FileOutcome::Parsed(resume) => response.parsed.push(resume),
            FileOutcome::Rejected(issue) => response.rejected.push(issue),
            FileOutcome::Failed(issue) => response.failed.push(issue),
        }
    }
    info!(
        "Upload done: {} parsed, {} rejected, {} failed",
        response.parsed.len(),
        response.rejected.len(),
        response.failed.len()
    );

    Ok(Json(response))
}

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResumeExtraction>>, AppError> {
    Ok(Json(state.store.list_resumes().await?))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeExtraction>, AppError> {
    let resume = state
        .store
        .load_resume(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))?;
    Ok(Json(resume))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_resume(id).await? {
        return Err(AppError::NotFound(format!("Resume {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/resumes
pub async fn handle_delete_all_resumes(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted = state.store.delete_all_resumes().await?;
    info!("Deleted {deleted} resumes");
    Ok(Json(DeletedResponse { deleted }))
}

async fn create_job(state: &AppState, title: &str, description: &str) -> Result<Job, AppError> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Job title must not be empty".to_string()));
    }
    if description.is_empty() {
        return Err(AppError::Validation(
            "Job description must not be empty".to_string(),
        ));
    }

    let job = Job {
        job_id: Uuid::new_v4(),
        title: title.to_string(),
        description: description.to_string(),
        created_at: Utc::now(),
    };
    state.store.save_job(&job).await?;
    info!("Created job {} ({})", job.job_id, job.title);
    Ok(job)
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let job = create_job(&state, &req.title, &req.description).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// POST /api/v1/jobs/upload
/// Multipart with a `file` field (PDF or text) and an optional `title` field.
pub async fn handle_upload_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let mut title = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => title = Some(field.text().await?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or("job.txt").to_string();
                let data = field.bytes().await?;
                file = Some((file_name, data));
            }
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| {
            std::path::Path::new(&file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Untitled job")
                .to_string()
        });

    let extracted = extract_blocking(file_name, data).await?;
    let job = create_job(&state, &title, &extracted.text).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, AppError> {
    Ok(Json(state.store.list_jobs().await?))
}

async fn load_job(state: &AppState, id: Uuid) -> Result<Job, AppError> {
    state
        .store
        .load_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(load_job(&state, id).await?))
}

/// DELETE /api/v1/jobs/:id
/// Removes the job, its cached requirements and its stored results.
pub async fn handle_delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_job(id).await? {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    state.matcher.forget_job(id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/jobs
/// Removes every job along with its cached requirements and stored results.
pub async fn handle_delete_all_jobs(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted = state.store.delete_all_jobs().await?;
    state.matcher.forget_all_jobs();
    info!("Deleted {deleted} jobs");
    Ok(Json(DeletedResponse { deleted }))
}

/// GET /api/v1/jobs/:id/requirements
pub async fn handle_get_requirements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRequirements>, AppError> {
    let job = load_job(&state, id).await?;
    let requirements = state.matcher.requirements(&job).await?;
    Ok(Json(requirements.as_ref().clone()))
}

/// POST /api/v1/jobs/:id/requirements/refresh
pub async fn handle_refresh_requirements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRequirements>, AppError> {
    let job = load_job(&state, id).await?;
    let requirements = state.matcher.refresh_requirements(&job).await?;
    Ok(Json(requirements.as_ref().clone()))
}

/// An empty body selects the defaults. Anything else must be a valid request.
fn parse_match_request(body: &[u8]) -> Result<MatchRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(MatchRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid match request: {e}")))
}

/// POST /api/v1/jobs/:id/match
/// Body is optional: `{"resume_ids": [...], "shortlist": 3}`. Without
/// `resume_ids` every stored resume is matched.
pub async fn handle_match(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<MatchResponse>, AppError> {
    let req = parse_match_request(&body)?;
    let job = load_job(&state, id).await?;

    let resumes = match req.resume_ids {
        Some(ids) => {
            let mut resumes = Vec::with_capacity(ids.len());
            for resume_id in ids {
                let resume = state
                    .store
                    .load_resume(resume_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
                resumes.push(resume);
            }
            resumes
        }
        None => state.store.list_resumes().await?,
    };

    if resumes.is_empty() {
        return Err(AppError::Validation(
            "No resumes to match; upload resumes first".to_string(),
        ));
    }

    let report = state.matcher.run(&job, resumes).await?;
    let shortlist = report.shortlist(req.shortlist.unwrap_or(DEFAULT_SHORTLIST));
    Ok(Json(MatchResponse { report, shortlist }))
}

/// GET /api/v1/jobs/:id/results
pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchResult>>, AppError> {
    load_job(&state, id).await?;
    let mut results = state.store.load_matches(id).await?;
    results.sort_by(compare_results);
    Ok(Json(results))
}
