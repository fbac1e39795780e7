use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use quill_types::api::Claims;
use quill_types::models::{Principal, User};

use crate::auth::AppState;

/// The authenticated user for the current request, loaded fresh from
/// storage so permission checks observe role state as of this request.
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// Extract and validate the bearer token, load the account, and refresh
/// its last-seen timestamp. Rejects the request when any step fails.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    let user = resolve_user(&state, token).ok_or(StatusCode::UNAUTHORIZED)?;

    ping(&state, &user);

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Like `require_auth` but never rejects: requests without a valid token
/// proceed as `Principal::Anonymous`. For public pages that render
/// differently for known actors.
pub async fn resolve_principal(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let principal = match bearer_token(&req).and_then(|token| resolve_user(&state, token)) {
        Some(user) => {
            ping(&state, &user);
            Principal::Known(user)
        }
        None => Principal::Anonymous,
    };

    req.extensions_mut().insert(principal);
    next.run(req).await
}

/// Guard for routes that additionally require a confirmed account.
/// Layered inside `require_auth`, which populates the extension.
pub async fn require_confirmed(
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !user.confirmed {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .strip_prefix("Bearer ")
}

fn resolve_user(state: &AppState, token: &str) -> Option<User> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.secret_key.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    match state.db.user_by_id(&data.claims.sub) {
        Ok(user) => user,
        Err(e) => {
            warn!("user lookup failed during auth: {}", e);
            None
        }
    }
}

/// The per-request activity ping. A failed refresh is logged, not fatal —
/// the request itself still proceeds.
fn ping(state: &AppState, user: &User) {
    if let Some(id) = user.id {
        if let Err(e) = state.db.touch_last_seen(&id) {
            warn!("last_seen refresh failed for {}: {}", id, e);
        }
    }
}
