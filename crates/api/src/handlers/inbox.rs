use axum::{
    Json,
    extract::{Path, State},
};

use engine::WorkflowInstance;

use crate::{AppState, ApiError};

/// Instances waiting on `actor_id`, most urgent deadline first.
pub async fn list(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowInstance>>, ApiError> {
    Ok(Json(state.orchestrator.list_instances_needing_action(&actor_id).await?))
}
