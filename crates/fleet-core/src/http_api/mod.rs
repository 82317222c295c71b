use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fleet_cost::Retribution;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    Assignment, AssignmentController, AssignmentError, AssignmentFilter, AssignmentState, Clock,
    ImportRecord, NewAssignment, SystemClock, TermsPatch, TransitionRequest, ValidationErrors,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
pub struct AppState {
    controller: AssignmentController,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(controller: AssignmentController) -> Self {
        Self::with_clock(controller, Arc::new(SystemClock))
    }

    pub fn with_clock(controller: AssignmentController, clock: Arc<dyn Clock>) -> Self {
        Self { controller, clock }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ValidationErrors>,
}

#[derive(Debug, Serialize)]
struct CreatedBody {
    id: Uuid,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(&'static str, String),
    Validation(ValidationErrors),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<AssignmentError> for ApiError {
    fn from(value: AssignmentError) -> Self {
        let message = value.to_string();
        match value {
            AssignmentError::Validation(errors) => ApiError::Validation(errors),
            AssignmentError::EquipmentAlreadyAssigned { .. } => {
                ApiError::Conflict("equipment_already_assigned", message)
            }
            AssignmentError::InvalidState { .. }
            | AssignmentError::ConcurrentModification { .. } => {
                ApiError::Conflict("invalid_state", message)
            }
            AssignmentError::InvalidTransition { .. } => {
                ApiError::Conflict("invalid_transition", message)
            }
            AssignmentError::NotFound(_) | AssignmentError::ProjectNotFound(_) => {
                ApiError::NotFound(message)
            }
            AssignmentError::Policy(_) => ApiError::Invalid(message),
            AssignmentError::Storage(_) | AssignmentError::Catalog(_) => {
                error!(error = %message, "backend failure while serving request");
                ApiError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::Invalid(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::Invalid(value.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, None),
            ApiError::Conflict(code, message) => (StatusCode::CONFLICT, code, message, None),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_failed",
                errors.to_string(),
                Some(errors),
            ),
            ApiError::Invalid(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message, None)
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                None,
            ),
        };
        let body = Json(ErrorBody {
            error,
            message,
            details,
        });
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/assignments",
            get(list_assignments).post(create_assignment),
        )
        .route("/assignments/import", post(import_assignment))
        .route(
            "/assignments/:id",
            get(get_assignment)
                .put(update_assignment)
                .delete(purge_assignment),
        )
        .route("/assignments/:id/transition", post(transition_assignment))
        .route(
            "/projects/:id/retribution-defaults",
            get(retribution_defaults),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "fleet assignment API listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("assignment {raw} not found")))
}

/// Raw list filters. Blank values mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    equipment_id: Option<String>,
    project_id: Option<String>,
    cost_center_id: Option<String>,
    state: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<AssignmentFilter, ApiError> {
        let state = match non_blank(self.state) {
            Some(raw) => Some(
                raw.parse::<AssignmentState>()
                    .map_err(|err| ApiError::invalid(format!("state: {err}")))?,
            ),
            None => None,
        };
        Ok(AssignmentFilter {
            equipment_id: non_blank(self.equipment_id),
            project_id: non_blank(self.project_id),
            cost_center_id: non_blank(self.cost_center_id),
            state,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

async fn list_assignments(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    Ok(Json(state.controller.list(&filter)?))
}

async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.controller.get(id)?))
}

async fn create_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewAssignment>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBody>), ApiError> {
    let Json(mut input) = payload?;
    if input.idempotency_key.is_none() {
        input.idempotency_key = idempotency_key(&headers)?;
    }
    let created = state.controller.create(input, state.clock.now())?;
    Ok((StatusCode::CREATED, Json(CreatedBody { id: created.id })))
}

async fn import_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ImportRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBody>), ApiError> {
    let Json(mut record) = payload?;
    if record.assignment.idempotency_key.is_none() {
        record.assignment.idempotency_key = idempotency_key(&headers)?;
    }
    let imported = state.controller.import(record, state.clock.now())?;
    Ok((StatusCode::CREATED, Json(CreatedBody { id: imported.id })))
}

async fn update_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TermsPatch>, JsonRejection>,
) -> Result<Json<Assignment>, ApiError> {
    let id = parse_id(&id)?;
    let Json(patch) = payload?;
    Ok(Json(
        state.controller.update_terms(id, patch, state.clock.now())?,
    ))
}

async fn transition_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<Assignment>, ApiError> {
    let id = parse_id(&id)?;
    let Json(request) = payload?;
    Ok(Json(
        state.controller.transition(id, request, state.clock.now())?,
    ))
}

async fn purge_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.controller.purge(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn retribution_defaults(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Retribution>, ApiError> {
    Ok(Json(state.controller.suggest_terms(&project_id)?))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::invalid("Idempotency-Key header must be visible ASCII"))?
        .trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}
