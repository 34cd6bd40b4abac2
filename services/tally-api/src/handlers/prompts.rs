//! Upgrade prompt lifecycle handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tally_types::UpgradePrompt;
use tracing::instrument;

use crate::error::ApiResult;
use crate::handlers::shared::{parse_prompt_id, parse_user_id};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListPromptsQuery {
    #[serde(default)]
    pub include_dismissed: bool,
}

/// GET /api/v1/prompts/{user_id}
///
/// Registered as `/prompts/{id}` so the segment name matches the
/// dismiss and convert routes.
#[instrument(skip(state))]
pub async fn list_prompts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListPromptsQuery>,
) -> ApiResult<Json<Vec<UpgradePrompt>>> {
    let user_id = parse_user_id(&user_id)?;
    let prompts = state
        .quota
        .list_prompts(&user_id, query.include_dismissed)
        .await?;
    Ok(Json(prompts))
}

/// POST /api/v1/prompts/{id}/dismiss
///
/// Dismissing an already dismissed or converted prompt returns it unchanged.
#[instrument(skip(state))]
pub async fn dismiss_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpgradePrompt>> {
    let id = parse_prompt_id(&id)?;
    Ok(Json(state.quota.dismiss_prompt(id).await?))
}

/// POST /api/v1/prompts/{id}/convert
#[instrument(skip(state))]
pub async fn convert_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpgradePrompt>> {
    let id = parse_prompt_id(&id)?;
    Ok(Json(state.quota.convert_prompt(id).await?))
}
