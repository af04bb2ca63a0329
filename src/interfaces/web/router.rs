use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware,
    middleware::Next,
    routing::get,
};
use tower_http::trace::TraceLayer;

use super::AppState;
use super::auth;
use super::handlers::{actions, events, listeners, webhooks};

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

pub fn build_api_router(state: AppState) -> Router {
    // Webhooks authenticate per request; ping needs no token at all.
    let public_routes = Router::new()
        .route(
            "/events/{event_id}",
            get(webhooks::trigger_get).post(webhooks::trigger_post),
        )
        .route("/api/health", get(health))
        .with_state(state.clone());

    let authed_routes = Router::new()
        .route(
            "/api/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/api/events/{event_id}",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/api/listeners",
            get(listeners::list_listeners).post(listeners::create_listener),
        )
        .route(
            "/api/listeners/{listener_id}",
            get(listeners::get_listener)
                .put(listeners::update_listener)
                .delete(listeners::delete_listener),
        )
        .route(
            "/api/actions",
            get(actions::list_actions).post(actions::create_action),
        )
        .route(
            "/api/actions/{action_id}",
            get(actions::get_action)
                .put(actions::update_action)
                .delete(actions::delete_action),
        )
        .route(
            "/api/actions/{action_id}/run",
            axum::routing::post(actions::run_action),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_owner,
        ))
        .with_state(state);

    public_routes
        .merge(authed_routes)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}
