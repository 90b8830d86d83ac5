use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use engine::{StepDefinition, WorkflowTemplate};

use crate::{AppState, ApiError};

#[derive(Deserialize)]
pub struct CreateTemplateDto {
    pub name: String,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub allow_return_to_previous: bool,
    #[serde(default)]
    pub auto_terminate_hours: Option<u32>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateDto>,
) -> Result<(StatusCode, Json<WorkflowTemplate>), ApiError> {
    let mut template = WorkflowTemplate::new(payload.name, payload.steps);
    template.allow_return_to_previous = payload.allow_return_to_previous;
    template.auto_terminate_hours = payload.auto_terminate_hours;

    let stored = state.orchestrator.register_template(template).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    Ok(Json(state.orchestrator.get_template(id).await?))
}
