use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

// -- JWT Claims --

/// Session-token claims shared between quill-api's login/register handlers
/// and its auth middleware. Confirmation tokens use a different claim set
/// (`confirm` instead of `sub`) so the two are not interchangeable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
    /// Handed back for delivery by the caller; sending mail is outside
    /// this service.
    pub confirmation_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct ResendConfirmationResponse {
    pub confirmation_token: String,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
}

/// Self/admin view of an account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub confirmed: bool,
    pub role: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            // Rows loaded from storage always carry an id.
            id: user.id.unwrap_or_default(),
            email: user.email.clone(),
            username: user.username.clone(),
            confirmed: user.confirmed,
            role: user.role.name.clone(),
            name: user.name.clone(),
            location: user.location.clone(),
            about_me: user.about_me.clone(),
            member_since: user.member_since,
            last_seen: user.last_seen,
        }
    }
}

/// Public view of an account, without the email address.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub followers: i64,
    pub following: i64,
    /// Present when the viewer is authenticated.
    pub relationship: Option<RelationshipResponse>,
    /// Whether the viewer may follow this account right now.
    pub can_follow: bool,
}

// -- Follows --

#[derive(Debug, Serialize)]
pub struct RelationshipResponse {
    pub following: bool,
    pub followed_by: bool,
}

// -- Admin --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminUpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub confirmed: Option<bool>,
    /// Role name, e.g. "Moderator".
    pub role: Option<String>,
}
