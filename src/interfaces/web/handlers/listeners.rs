use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::Value;

use super::super::AppState;
use super::super::auth::AuthenticatedOwner;
use super::failure;
use crate::core::listeners::ListenerDraft;

pub async fn list_listeners(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    let listeners = state.ctx.listeners.list_listeners(&owner.owner_id).await;
    Json(serde_json::json!({ "success": true, "listeners": listeners }))
}

pub async fn create_listener(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<ListenerDraft>,
) -> Json<Value> {
    match state
        .ctx
        .listeners
        .create_listener(&owner.owner_id, draft)
        .await
    {
        Ok(listener) => Json(serde_json::json!({ "success": true, "listener": listener })),
        Err(e) => failure(e),
    }
}

pub async fn get_listener(
    Path(listener_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state
        .ctx
        .listeners
        .get_listener(&owner.owner_id, &listener_id)
        .await
    {
        Ok(listener) => Json(serde_json::json!({ "success": true, "listener": listener })),
        Err(e) => failure(e),
    }
}

pub async fn update_listener(
    Path(listener_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<ListenerDraft>,
) -> Json<Value> {
    match state
        .ctx
        .listeners
        .update_listener(&owner.owner_id, &listener_id, draft)
        .await
    {
        Ok(listener) => Json(serde_json::json!({ "success": true, "listener": listener })),
        Err(e) => failure(e),
    }
}

/// Deleting an already removed listener still succeeds, with
/// `removed: false`.
pub async fn delete_listener(
    Path(listener_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Json<Value> {
    match state
        .ctx
        .listeners
        .remove_listener(&owner.owner_id, &listener_id)
        .await
    {
        Ok(removed) => Json(serde_json::json!({ "success": true, "removed": removed })),
        Err(e) => failure(e),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::execution::testing::ScriptedExecutor;
    use crate::interfaces::web::testing::{json_request, test_app};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn listener_crud_round_trip() {
        let app = test_app(ScriptedExecutor::replying("x")).await;
        let alice = Some("alice:alice-secret");
        json_request(
            &app.router,
            Method::POST,
            "/api/events",
            alice,
            Some(json!({ "eventId": "door" })),
        )
        .await;

        let rejected = json_request(
            &app.router,
            Method::POST,
            "/api/listeners",
            alice,
            Some(json!({ "eventId": "door", "instruction": "a", "template": "b" })),
        )
        .await;
        assert_eq!(
            rejected["error"],
            "Provide either instruction or template, not both"
        );

        let created = json_request(
            &app.router,
            Method::POST,
            "/api/listeners",
            alice,
            Some(json!({
                "eventId": "door",
                "template": "Door: {{state}}",
                "notify": true,
                "options": { "autoStopAfterSingleEvent": true }
            })),
        )
        .await;
        assert_eq!(created["success"], true);
        let id = created["listener"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["listener"]["trigger"]["type"], "template");
        assert_eq!(created["listener"]["options"]["autoStopAfterSingleEvent"], true);

        let updated = json_request(
            &app.router,
            Method::PUT,
            &format!("/api/listeners/{}", id),
            alice,
            Some(json!({ "eventId": "door", "instruction": "Summarise", "toolNames": ["notes"] })),
        )
        .await;
        assert_eq!(updated["listener"]["trigger"]["toolNames"], json!(["notes"]));

        let bob_delete = json_request(
            &app.router,
            Method::DELETE,
            &format!("/api/listeners/{}", id),
            Some("bob:bob-secret"),
            None,
        )
        .await;
        assert_eq!(bob_delete["error"], "Listener belongs to another owner");

        let path = format!("/api/listeners/{}", id);
        let first = json_request(&app.router, Method::DELETE, &path, alice, None).await;
        let second = json_request(&app.router, Method::DELETE, &path, alice, None).await;
        assert_eq!(first["removed"], true);
        assert_eq!(second, json!({ "success": true, "removed": false }));
    }
}
