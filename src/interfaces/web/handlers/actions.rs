use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::Value;

use super::super::AppState;
use super::super::auth::AuthenticatedOwner;
use super::failure;
use crate::core::actions::ActionDraft;

pub async fn list_actions(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    let actions = state.ctx.actions.list_actions(&owner.owner_id).await;
    Json(serde_json::json!({ "success": true, "actions": actions }))
}

pub async fn create_action(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<ActionDraft>,
) -> Json<Value> {
    match state.ctx.actions.create_action(&owner.owner_id, draft).await {
        Ok(action) => Json(serde_json::json!({ "success": true, "action": action })),
        Err(e) => failure(e),
    }
}

pub async fn get_action(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state.ctx.actions.get_action(&owner.owner_id, &action_id).await {
        Ok(action) => Json(serde_json::json!({ "success": true, "action": action })),
        Err(e) => failure(e),
    }
}

pub async fn update_action(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<ActionDraft>,
) -> Json<Value> {
    match state
        .ctx
        .actions
        .update_action(&owner.owner_id, &action_id, draft)
        .await
    {
        Ok(action) => Json(serde_json::json!({ "success": true, "action": action })),
        Err(e) => failure(e),
    }
}

pub async fn delete_action(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state
        .ctx
        .actions
        .remove_action(&owner.owner_id, &action_id)
        .await
    {
        Ok(removed) => Json(serde_json::json!({ "success": true, "removed": removed })),
        Err(e) => failure(e),
    }
}

pub async fn run_action(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state
        .ctx
        .actions
        .trigger_now(&owner.owner_id, &action_id)
        .await
    {
        Ok(output) => Json(serde_json::json!({ "success": true, "output": output })),
        Err(e) => failure(e),
    }
}
