use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use quill_types::api::{ProfileResponse, RelationshipResponse, UpdateProfileRequest, UserResponse};
use quill_types::models::Principal;
use quill_types::permissions::Permission;

use crate::auth::AppState;
use crate::middleware::CurrentUser;

pub async fn me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<UserResponse> {
    Json(UserResponse::from_user(&user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = user.id.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .db
        .update_profile(
            &user_id,
            req.name.as_deref(),
            req.location.as_deref(),
            req.about_me.as_deref(),
        )
        .map_err(|e| {
            error!("profile update failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let updated = state
        .db
        .user_by_id(&user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(UserResponse::from_user(&updated)))
}

/// Public profile page data. The viewer may be anonymous; relationship
/// state is included only for known actors.
pub async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .user_by_username(&username)
        .map_err(|e| {
            error!("profile lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let followers = state
        .db
        .follower_count(&user)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let following = state
        .db
        .following_count(&user)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let relationship = match principal.user() {
        Some(actor) => Some(RelationshipResponse {
            following: state
                .db
                .is_following(actor, &user)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
            followed_by: state
                .db
                .is_followed_by(actor, &user)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        }),
        None => None,
    };

    let is_self = principal.user().and_then(|actor| actor.id) == user.id;
    let can_follow = principal.can(Permission::FOLLOW) && !is_self;

    Ok(Json(ProfileResponse {
        username: user.username,
        name: user.name,
        location: user.location,
        about_me: user.about_me,
        member_since: user.member_since,
        last_seen: user.last_seen,
        followers,
        following,
        relationship,
        can_follow,
    }))
}
