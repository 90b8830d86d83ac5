use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engine::{ActionKind, ActionOptions, NewInstance, StepAction, WorkflowInstance};

use crate::{AppState, ApiError};

#[derive(Serialize)]
pub struct CreatedDto {
    pub id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewInstance>,
) -> Result<(StatusCode, Json<CreatedDto>), ApiError> {
    let id = state.orchestrator.create_instance(payload).await?;
    Ok((StatusCode::CREATED, Json(CreatedDto { id })))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowInstance>, ApiError> {
    Ok(Json(state.orchestrator.get_instance(id).await?))
}

pub async fn activate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowInstance>, ApiError> {
    Ok(Json(state.orchestrator.activate(id).await?))
}

#[derive(Deserialize)]
pub struct TakeActionDto {
    pub action: ActionKind,
    pub actor_id: String,
    #[serde(flatten)]
    pub options: ActionOptions,
}

pub async fn take_action(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TakeActionDto>,
) -> Result<Json<WorkflowInstance>, ApiError> {
    let actor_id = payload.actor_id.trim();
    if actor_id.is_empty() {
        return Err(ApiError::BadRequest("actor_id is required".into()));
    }

    let mut options = payload.options;
    if options.signer_ip.is_none() {
        options.signer_ip = forwarded_for(&headers);
    }

    let instance = state
        .orchestrator
        .take_action(id, payload.action, actor_id, options)
        .await?;
    Ok(Json(instance))
}

#[derive(Deserialize)]
pub struct ActionsQuery {
    #[serde(default)]
    pub include_internal: bool,
}

pub async fn list_actions(
    Path(id): Path<Uuid>,
    Query(query): Query<ActionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StepAction>>, ApiError> {
    Ok(Json(state.orchestrator.get_actions(id, query.include_internal).await?))
}

/// First hop of `X-Forwarded-For`, the original client.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}
