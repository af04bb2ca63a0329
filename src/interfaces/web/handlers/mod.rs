pub mod actions;
pub mod events;
pub mod listeners;
pub mod webhooks;

use axum::Json;

use crate::core::error::AutomationError;

/// Logical failures travel in the body with a 200 status.
pub(super) fn failure(error: AutomationError) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": false, "error": error.to_string() }))
}
