// REST control API built on Axum
// Submission, pause/cancel control and polling endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json as AxumJson,
    routing::{get, post},
    Json, Router,
};
use jobbot_application::{
    CancelJobRequest, CancelJobUseCase, GetJobUseCase, PauseJobRequest, PauseJobUseCase,
    SubmitJobRequest, SubmitJobUseCase,
};
use jobbot_domain::error::DomainError;
use jobbot_domain::jobs::Job;
use jobbot_shared::JobId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

const DEFAULT_PAUSE_SECS: u64 = 10;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub submit_job: Arc<SubmitJobUseCase>,
    pub pause_job: Arc<PauseJobUseCase>,
    pub cancel_job: Arc<CancelJobUseCase>,
    pub get_job: Arc<GetJobUseCase>,
}

/// Error payload returned with non-2xx statuses
#[derive(Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

fn error_response(error: DomainError) -> (StatusCode, AxumJson<ApiErrorBody>) {
    let status = match &error {
        DomainError::InvalidJobSpec { .. } => StatusCode::BAD_REQUEST,
        DomainError::JobNotFound { .. } | DomainError::NoRecentJob => StatusCode::NOT_FOUND,
        DomainError::InvalidStateTransition { .. }
        | DomainError::AlreadyOwned { .. }
        | DomainError::VersionConflict { .. } => StatusCode::CONFLICT,
        DomainError::StoreUnavailable { .. } | DomainError::BusUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        AxumJson(ApiErrorBody {
            error: error.to_string(),
        }),
    )
}

fn parse_job_id(raw: &str) -> Result<JobId, (StatusCode, AxumJson<ApiErrorBody>)> {
    JobId::from_string(raw).ok_or((
        StatusCode::BAD_REQUEST,
        AxumJson(ApiErrorBody {
            error: format!("invalid job id: {}", raw),
        }),
    ))
}

/// DTO for job submission
#[derive(Serialize, Deserialize)]
pub struct SubmitJobApiRequest {
    pub positions: Vec<String>,
    pub locations: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SubmitJobApiResponse {
    pub job_id: String,
}

/// DTO for pause/cancel requests. Both fields are optional: an omitted
/// `job_id` addresses the caller's most recent job.
#[derive(Serialize, Deserialize, Default)]
pub struct ControlApiRequest {
    pub job_id: Option<String>,
    pub duration_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct ControlApiResponse {
    pub job_id: String,
    pub message: String,
}

/// Full job record for polling callers
#[derive(Serialize, Deserialize)]
pub struct JobApiResponse {
    pub job_id: String,
    pub state: String,
    pub positions: Vec<String>,
    pub locations: Vec<String>,
    pub owner: Option<String>,
    pub applied: u32,
    pub pause_until: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobApiResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state.to_string(),
            positions: job.spec.positions,
            locations: job.spec.locations,
            owner: job.owner.map(|w| w.to_string()),
            applied: job.applied,
            pause_until: job.pause_until.map(|t| t.to_rfc3339()),
            error: job.error_message,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Builds the control API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/submit-job", post(submit_job))
        .route("/pause", post(pause_job))
        .route("/cancel", post(cancel_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/health", get(health_check))
        .layer(CorsLayer::new().allow_methods(Any).allow_headers(Any))
}

/// Handler: submit a new job
///
/// Returns 202: execution is asynchronous and outcomes are observed by
/// polling, never via this response.
async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobApiRequest>,
) -> Result<(StatusCode, AxumJson<SubmitJobApiResponse>), (StatusCode, AxumJson<ApiErrorBody>)> {
    match state
        .submit_job
        .execute(SubmitJobRequest {
            positions: request.positions,
            locations: request.locations,
        })
        .await
    {
        Ok(response) => Ok((
            StatusCode::ACCEPTED,
            AxumJson(SubmitJobApiResponse {
                job_id: response.job_id.to_string(),
            }),
        )),
        Err(error) => {
            warn!("Failed to submit job: {}", error);
            Err(error_response(error))
        }
    }
}

/// Handler: pause the addressed job for a bounded window
async fn pause_job(
    State(state): State<AppState>,
    body: Option<Json<ControlApiRequest>>,
) -> Result<AxumJson<ControlApiResponse>, (StatusCode, AxumJson<ApiErrorBody>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let job_id = match &request.job_id {
        Some(raw) => Some(parse_job_id(raw)?),
        None => None,
    };

    match state
        .pause_job
        .execute(PauseJobRequest {
            job_id,
            duration_secs: request.duration_seconds.unwrap_or(DEFAULT_PAUSE_SECS),
        })
        .await
    {
        Ok(response) => Ok(AxumJson(ControlApiResponse {
            job_id: response.job_id.to_string(),
            message: format!("Paused for {} seconds", response.paused_for_secs),
        })),
        Err(error) => {
            warn!("Failed to pause job: {}", error);
            Err(error_response(error))
        }
    }
}

/// Handler: request cancellation of the addressed job
async fn cancel_job(
    State(state): State<AppState>,
    body: Option<Json<ControlApiRequest>>,
) -> Result<AxumJson<ControlApiResponse>, (StatusCode, AxumJson<ApiErrorBody>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let job_id = match &request.job_id {
        Some(raw) => Some(parse_job_id(raw)?),
        None => None,
    };

    match state.cancel_job.execute(CancelJobRequest { job_id }).await {
        Ok(response) => Ok(AxumJson(ControlApiResponse {
            job_id: response.job_id.to_string(),
            message: "Cancellation requested".to_string(),
        })),
        Err(error) => {
            warn!("Failed to cancel job: {}", error);
            Err(error_response(error))
        }
    }
}

/// Handler: fetch one job record for polling
async fn get_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> Result<AxumJson<JobApiResponse>, (StatusCode, AxumJson<ApiErrorBody>)> {
    let job_id = parse_job_id(&job_id)?;

    match state.get_job.execute(job_id).await {
        Ok(job) => Ok(AxumJson(JobApiResponse::from(job))),
        Err(error) => Err(error_response(error)),
    }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn health_check() -> AxumJson<HealthResponse> {
    AxumJson(HealthResponse {
        status: "ok".to_string(),
    })
}
