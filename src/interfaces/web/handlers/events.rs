use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::Value;

use super::super::AppState;
use super::super::auth::AuthenticatedOwner;
use super::failure;
use crate::core::events::{EventDraft, EventPatch, event_url};
use crate::core::types::Event;

/// Event record plus the URL an external system should call.
fn event_view(state: &AppState, event: &Event) -> Value {
    let mut view = serde_json::to_value(event).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut view {
        map.insert(
            "url".to_string(),
            Value::String(event_url(&state.ctx.public_base_url, &event.event_id)),
        );
    }
    view
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    let events = state.ctx.events.list_events(&owner.owner_id).await;
    let views: Vec<Value> = events.iter().map(|e| event_view(&state, e)).collect();
    Json(serde_json::json!({ "success": true, "events": views }))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<EventDraft>,
) -> Json<Value> {
    match state.ctx.events.create_event(&owner.owner_id, draft).await {
        Ok(event) => Json(serde_json::json!({
            "success": true,
            "event": event_view(&state, &event)
        })),
        Err(e) => failure(e),
    }
}

pub async fn get_event(
    Path(event_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state.ctx.events.get_event(&owner.owner_id, &event_id).await {
        Ok(event) => Json(serde_json::json!({
            "success": true,
            "event": event_view(&state, &event)
        })),
        Err(e) => failure(e),
    }
}

pub async fn update_event(
    Path(event_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(patch): Json<EventPatch>,
) -> Json<Value> {
    match state
        .ctx
        .events
        .update_event(&owner.owner_id, &event_id, patch)
        .await
    {
        Ok(event) => Json(serde_json::json!({
            "success": true,
            "event": event_view(&state, &event)
        })),
        Err(e) => failure(e),
    }
}

pub async fn delete_event(
    Path(event_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state.ctx.remove_event(&owner.owner_id, &event_id).await {
        Ok(()) => Json(serde_json::json!({ "success": true, "message": "Event removed" })),
        Err(e) => failure(e),
    }
}
