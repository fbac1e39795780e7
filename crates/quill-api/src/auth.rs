use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::error;
use uuid::Uuid;

use quill_db::{Database, StoreError};
use quill_identity::password;
use quill_identity::token::{CONFIRMATION_TOKEN_TTL_SECS, generate_confirmation_token, verify_confirmation_token};
use quill_types::api::{
    Claims, ConfirmRequest, ConfirmResponse, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse, ResendConfirmationResponse,
};
use quill_types::models::{Role, User};

use crate::middleware::CurrentUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Process-wide signing secret for session and confirmation tokens.
    pub secret_key: String,
    /// Registrations with this email receive the Administrator role.
    pub admin_email: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if req.email.is_empty() || req.email.len() > 64 || !req.email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !valid_username(&req.username) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let role = registration_role(&state.db, &state.admin_email, &req.email)
        .map_err(|e| {
            error!("role lookup failed during registration: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            error!("canonical roles missing; was role seeding run at startup?");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let password_hash =
        password::hash_password(&req.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let user = User::new(req.email, req.username.clone(), role);

    let user_id = match state.db.create_user(&user, &password_hash) {
        Ok(id) => id,
        Err(StoreError::Conflict(_)) => return Err(StatusCode::CONFLICT),
        Err(e) => {
            error!("user creation failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let token = create_session_token(&state.secret_key, user_id, &req.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Delivery of the confirmation link is the caller's concern.
    let confirmation_token =
        generate_confirmation_token(&state.secret_key, user_id, CONFIRMATION_TOKEN_TTL_SECS)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            token,
            confirmation_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // An unknown email and a wrong password are indistinguishable.
    let Some((user, password_hash)) = state
        .db
        .user_and_hash_by_email(&req.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !password::verify_password(&password_hash, &req.password) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user_id = user.id.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = create_session_token(&state.secret_key, user_id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// Apply a confirmation token to the current account. An invalid, expired,
/// or mismatched token is a notice (`confirmed: false`), never an error.
pub async fn confirm(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if user.confirmed {
        return Ok(Json(ConfirmResponse { confirmed: true }));
    }

    let user_id = user.id.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    if !verify_confirmation_token(&state.secret_key, &req.token, user_id) {
        return Ok(Json(ConfirmResponse { confirmed: false }));
    }

    state
        .db
        .set_confirmed(&user_id, true)
        .map_err(|e| {
            error!("persisting confirmation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ConfirmResponse { confirmed: true }))
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = user.id.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let confirmation_token =
        generate_confirmation_token(&state.secret_key, user_id, CONFIRMATION_TOKEN_TTL_SECS)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ResendConfirmationResponse { confirmation_token }))
}

fn create_session_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Role for a fresh registration: the administrator email gets the
/// Administrator role, everyone else the default role. Either way the
/// account never ends up without a role.
fn registration_role(
    db: &Database,
    admin_email: &str,
    email: &str,
) -> Result<Option<Role>, StoreError> {
    if !admin_email.is_empty() && email == admin_email {
        db.role_by_name(Role::ADMINISTRATOR)
    } else {
        db.default_role()
    }
}

/// Username pattern from the registration form: a letter first, then
/// letters, digits, dots, or underscores.
pub(crate) fn valid_username(username: &str) -> bool {
    if username.is_empty() || username.len() > 64 {
        return false;
    }
    let mut chars = username.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
