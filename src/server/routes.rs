use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{DocumentKind, DocumentTarget};
use crate::pipeline::{DocumentLookup, ProjectStatus, ProjectStructure, StartOutcome};
use crate::query::AskOutcome;
use crate::server::AppState;
use crate::{Error, ValidationError};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub source_location: String,
    pub credential: Option<String>,
}

#[derive(Deserialize)]
pub struct DocumentParams {
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub source_location: String,
    pub state: crate::pipeline::PipelineState,
}

/// Library errors mapped onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(Error::Validation(err))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn register_project(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ProjectSummary>), ApiError> {
    let project = state.orchestrator.register_project(&req.source_location, req.credential)?;
    Ok((
        StatusCode::CREATED,
        Json(ProjectSummary { id: project.id, source_location: project.source_location, state: project.state }),
    ))
}

pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Vec<ProjectSummary>> {
    let projects = state
        .orchestrator
        .list_projects()?
        .into_iter()
        .map(|p| ProjectSummary { id: p.id, source_location: p.source_location, state: p.state })
        .collect();
    Ok(Json(projects))
}

pub async fn sync_project(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<(StatusCode, Json<StartOutcome>), ApiError> {
    let outcome = state.orchestrator.start_pipeline(id)?;
    let status = match outcome {
        StartOutcome::Started(_) => StatusCode::ACCEPTED,
        StartOutcome::AlreadyRunning(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

pub async fn get_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<ProjectStatus> {
    Ok(Json(state.orchestrator.get_status(id)?))
}

pub async fn get_structure(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<ProjectStructure> {
    Ok(Json(state.orchestrator.get_structure(id)?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DocumentParams>,
) -> ApiResult<DocumentLookup> {
    let target = match params.target.as_deref() {
        Some(key) => DocumentTarget::parse(key)?,
        None => DocumentTarget::Project,
    };
    let kind = match params.kind.as_deref() {
        Some(kind) => kind.parse::<DocumentKind>()?,
        None => DocumentKind::Summary,
    };
    Ok(Json(state.orchestrator.get_document(id, &target, kind).await?))
}

pub async fn ask(State(state): State<AppState>, Path(id): Path<Uuid>, Json(req): Json<AskRequest>) -> ApiResult<AskOutcome> {
    Ok(Json(state.orchestrator.ask(id, &req.question).await?))
}
