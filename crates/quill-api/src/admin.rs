use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use quill_db::StoreError;
use quill_types::api::{AdminUpdateUserRequest, UserResponse};

use crate::auth::AppState;
use crate::middleware::CurrentUser;

/// Administrative edit of another account: email, username, confirmed
/// flag, and role, under the same uniqueness rules as registration.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !admin.is_administrator() {
        return Err(StatusCode::FORBIDDEN);
    }

    if let Some(username) = &req.username {
        if !crate::auth::valid_username(username) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    if let Some(email) = &req.email {
        if email.is_empty() || email.len() > 64 || !email.contains('@') {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    // Role is referenced by name; an unknown name is a caller mistake.
    let role_id = match &req.role {
        Some(name) => Some(
            state
                .db
                .role_by_name(name)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .ok_or(StatusCode::BAD_REQUEST)?
                .id,
        ),
        None => None,
    };

    match state.db.admin_update_user(
        &user_id,
        req.email.as_deref(),
        req.username.as_deref(),
        req.confirmed,
        role_id.as_ref(),
    ) {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(StoreError::Conflict(_)) => return Err(StatusCode::CONFLICT),
        Err(e) => {
            error!("admin user update failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let updated = state
        .db
        .user_by_id(&user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(UserResponse::from_user(&updated)))
}

/// Remove an account. Follow edges in both directions go with it, in the
/// same transaction.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
) -> Result<StatusCode, StatusCode> {
    if !admin.is_administrator() {
        return Err(StatusCode::FORBIDDEN);
    }

    let removed = state.db.delete_user(&user_id).map_err(|e| {
        error!("user deletion failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
