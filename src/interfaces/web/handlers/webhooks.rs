use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::super::AppState;
use super::super::auth::authenticate;
use crate::core::types::Payload;

/// Reserved event id: no auth, fixed answer, still published.
pub const PING_EVENT: &str = "ping";
const PING_ACK: &str = "pong";
const TRIGGER_ACK: &str = "Event triggered";

fn wait_requested(params: &HashMap<String, String>) -> bool {
    params
        .get("wait")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn query_payload(params: HashMap<String, String>) -> Payload {
    params
        .into_iter()
        .filter(|(key, _)| key != "wait")
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

/// Body bytes as text; a JSON object becomes the payload, anything else is
/// wrapped under `body`.
fn body_payload(body: &[u8]) -> Payload {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Payload::new();
    }
    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => return map,
        Ok(other) => other,
        Err(_) => Value::String(text.into_owned()),
    };
    let mut payload = Payload::new();
    payload.insert("body".to_string(), value);
    payload
}

pub async fn trigger_get(
    Path(event_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let wait = wait_requested(&params);
    trigger(state, event_id, &headers, wait, query_payload(params)).await
}

pub async fn trigger_post(
    Path(event_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let wait = wait_requested(&params);
    trigger(state, event_id, &headers, wait, body_payload(&body)).await
}

async fn trigger(
    state: AppState,
    event_id: String,
    headers: &HeaderMap,
    wait: bool,
    payload: Payload,
) -> Response {
    let ctx = &state.ctx;

    if event_id == PING_EVENT {
        info!("Event '{}' triggered by ping (wait: {})", event_id, wait);
        ctx.bus.publish(&event_id, payload);
        return PING_ACK.into_response();
    }

    let owner = match authenticate(ctx.owners.as_ref(), headers).await {
        Ok(owner) => owner,
        Err(e) => {
            debug!("Rejected trigger for event '{}': {}", event_id, e);
            return Json(serde_json::json!({ "error": e.to_string() })).into_response();
        }
    };

    if let Some(event_owner) = ctx.events.owner_of(&event_id).await
        && event_owner != owner.owner_id
    {
        debug!(
            "Owner {} is triggering event '{}' owned by {}",
            owner.owner_id, event_id, event_owner
        );
    }
    info!(
        "Event '{}' triggered by {} (wait: {}, listeners: {})",
        event_id,
        owner.display_name,
        wait,
        ctx.bus.subscriber_count(&event_id)
    );

    if wait {
        let outputs = ctx.bus.publish_and_collect(&event_id, payload).await;
        Json(serde_json::json!({
            "success": true,
            "response": TRIGGER_ACK,
            "listeners": outputs
        }))
        .into_response()
    } else {
        ctx.bus.publish(&event_id, payload);
        TRIGGER_ACK.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventDraft;
    use crate::core::execution::testing::ScriptedExecutor;
    use crate::core::listeners::ListenerDraft;
    use crate::interfaces::web::testing::{TestApp, send, test_app};
    use axum::http::Method;
    use serde_json::json;
    use std::time::Duration;

    async fn app_with_door_listener(text: &str) -> TestApp {
        let app = test_app(ScriptedExecutor::replying("unused")).await;
        let ctx = &app.test.ctx;
        for id in ["door", PING_EVENT] {
            ctx.events
                .create_event(
                    "owner-alice",
                    EventDraft {
                        event_id: id.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            ctx.listeners
                .create_listener(
                    "owner-alice",
                    ListenerDraft {
                        event_id: id.to_string(),
                        template: Some(text.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        app
    }

    async fn triggered(app: &TestApp, event_id: &str) -> bool {
        for _ in 0..50 {
            let event = app
                .test
                .ctx
                .events
                .get_event("owner-alice", event_id)
                .await
                .unwrap();
            if event.last_triggered_at.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn wait_flag_accepts_common_truthy_values() {
        for value in ["true", "1", "yes", "TRUE"] {
            let params = HashMap::from([("wait".to_string(), value.to_string())]);
            assert!(wait_requested(&params));
        }
        let params = HashMap::from([("wait".to_string(), "no".to_string())]);
        assert!(!wait_requested(&params));
        assert!(!wait_requested(&HashMap::new()));
    }

    #[test]
    fn body_payload_prefers_json_objects() {
        assert_eq!(body_payload(br#"{"who":"courier"}"#)["who"], "courier");
        assert_eq!(body_payload(b"[1,2]")["body"], json!([1, 2]));
        assert_eq!(body_payload(b"door opened")["body"], "door opened");
        assert!(body_payload(b"   ").is_empty());
    }

    #[tokio::test]
    async fn ping_needs_no_token_and_still_publishes() {
        let app = app_with_door_listener("alive").await;
        let (_, body) = send(&app.router, Method::GET, "/events/ping", None, None).await;
        assert_eq!(body, "pong");
        assert!(triggered(&app, PING_EVENT).await);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected_without_publishing() {
        let app = app_with_door_listener("x").await;
        let (_, body) = send(
            &app.router,
            Method::GET,
            "/events/door?wait=true",
            Some("alice:nope"),
            None,
        )
        .await;
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "error": "Unauthorized" }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let event = app.test.ctx.events.get_event("owner-alice", "door").await.unwrap();
        assert!(event.last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn wait_mode_returns_listener_outputs() {
        let app = app_with_door_listener("{{who}} rang").await;
        let (_, body) = send(
            &app.router,
            Method::GET,
            "/events/door?wait=true&who=Courier",
            Some("alice:alice-secret"),
            None,
        )
        .await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["response"], "Event triggered");
        assert_eq!(body["listeners"], json!(["Courier rang"]));

        let event = app.test.ctx.events.get_event("owner-alice", "door").await.unwrap();
        let payload = event.last_payload.unwrap();
        assert_eq!(payload["who"], "Courier");
        assert!(!payload.contains_key("wait"));
    }

    #[tokio::test]
    async fn post_body_becomes_payload() {
        let app = app_with_door_listener("{{who}} / {{body}}").await;
        let (_, body) = send(
            &app.router,
            Method::POST,
            "/events/door?wait=1",
            Some("alice:alice-secret"),
            Some(r#"{"who":"Neighbour"}"#),
        )
        .await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["listeners"], json!(["Neighbour / {{body}}"]));

        let (_, body) = send(
            &app.router,
            Method::POST,
            "/events/door?wait=1",
            Some("alice:alice-secret"),
            Some("plain text"),
        )
        .await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["listeners"], json!(["{{who}} / plain text"]));
    }

    #[tokio::test]
    async fn any_known_owner_may_trigger_and_gets_plain_ack() {
        let app = app_with_door_listener("x").await;
        let (_, body) = send(
            &app.router,
            Method::GET,
            "/events/door",
            Some("bob:bob-secret"),
            None,
        )
        .await;
        assert_eq!(body, "Event triggered");
        assert!(triggered(&app, "door").await);
    }
}
