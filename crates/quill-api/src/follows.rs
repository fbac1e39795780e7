use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use quill_types::api::RelationshipResponse;
use quill_types::models::User;
use quill_types::permissions::Permission;

use crate::auth::AppState;
use crate::middleware::CurrentUser;

pub async fn follow_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    // Explicit capability gate; the core exposes can(), handlers enforce it.
    if !current.can(Permission::FOLLOW) {
        return Err(StatusCode::FORBIDDEN);
    }

    let target = lookup_target(&state, &username)?;
    if current.id == target.id {
        // No self-follow.
        return Err(StatusCode::BAD_REQUEST);
    }

    // Re-following is a no-op, not an error.
    state.db.follow(&current, &target).map_err(|e| {
        error!("follow failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    relationship_of(&state, &current, &target).map(Json)
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    if !current.can(Permission::FOLLOW) {
        return Err(StatusCode::FORBIDDEN);
    }

    let target = lookup_target(&state, &username)?;

    // Unfollowing someone never followed is a no-op.
    state.db.unfollow(&current, &target).map_err(|e| {
        error!("unfollow failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    relationship_of(&state, &current, &target).map(Json)
}

pub async fn relationship(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let target = lookup_target(&state, &username)?;
    relationship_of(&state, &current, &target).map(Json)
}

fn lookup_target(state: &AppState, username: &str) -> Result<User, StatusCode> {
    state
        .db
        .user_by_username(username)
        .map_err(|e| {
            error!("user lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)
}

fn relationship_of(
    state: &AppState,
    current: &User,
    target: &User,
) -> Result<RelationshipResponse, StatusCode> {
    let following = state
        .db
        .is_following(current, target)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let followed_by = state
        .db
        .is_followed_by(current, target)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(RelationshipResponse {
        following,
        followed_by,
    })
}
