use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::core::error::{AutomationError, AutomationResult};
use crate::core::owners::{EVENTS_PLATFORM, OwnerDirectory};

/// Header carrying `<ownerDisplayName>:<secret>`.
pub(crate) const TOKEN_HEADER: &str = "token";

/// Owner resolved from the token header, attached to the request by
/// [`require_owner`].
#[derive(Debug, Clone)]
pub(crate) struct AuthenticatedOwner {
    pub owner_id: String,
    pub display_name: String,
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Every failure collapses to the same `Unauthorized` so callers cannot tell
/// an unknown owner from a wrong secret.
pub(crate) async fn authenticate(
    owners: &dyn OwnerDirectory,
    headers: &HeaderMap,
) -> AutomationResult<AuthenticatedOwner> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AutomationError::Unauthorized)?;
    let (display_name, secret) = token
        .split_once(':')
        .ok_or(AutomationError::Unauthorized)?;
    if display_name.is_empty() || secret.is_empty() {
        return Err(AutomationError::Unauthorized);
    }

    let owner_id = owners
        .resolve_display_name(display_name)
        .await
        .ok_or(AutomationError::Unauthorized)?;
    let matched = owners
        .identities(&owner_id, EVENTS_PLATFORM)
        .await
        .iter()
        .any(|identity| constant_time_eq(identity.secret.as_bytes(), secret.as_bytes()));
    if !matched {
        return Err(AutomationError::Unauthorized);
    }

    Ok(AuthenticatedOwner {
        owner_id,
        display_name: display_name.to_string(),
    })
}

pub(crate) async fn require_owner(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(state.ctx.owners.as_ref(), req.headers()).await {
        Ok(owner) => {
            req.extensions_mut().insert(owner);
            next.run(req).await
        }
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": e.to_string()
        }))
        .into_response(),
    }
}
