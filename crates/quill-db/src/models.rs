use chrono::{DateTime, Utc};
use uuid::Uuid;

use quill_types::models::{Role, User};
use quill_types::permissions::Permission;

use crate::error::{StoreError, StoreResult};

/// Database row types — these map directly to SQLite rows. Distinct from
/// the quill-types domain models to keep the DB layer independent.
///
/// `UserRow` is the only place the password hash exists in memory. It
/// intentionally derives neither Debug nor Serialize, and the hash is
/// dropped when converting to the domain `User`.
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role_id: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: String,
    pub last_seen: String,
}

pub struct RoleRow {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub permissions: i64,
}

impl RoleRow {
    pub fn into_role(self) -> StoreResult<Role> {
        Ok(Role {
            id: parse_uuid(&self.id)?,
            name: self.name,
            is_default: self.is_default,
            permissions: Permission::from_bits(self.permissions),
        })
    }
}

impl UserRow {
    pub fn into_user(self, role: Role) -> StoreResult<User> {
        Ok(User {
            id: Some(parse_uuid(&self.id)?),
            email: self.email,
            username: self.username,
            confirmed: self.confirmed,
            name: self.name,
            location: self.location,
            about_me: self.about_me,
            member_since: parse_timestamp(&self.member_since)?,
            last_seen: parse_timestamp(&self.last_seen)?,
            role,
        })
    }
}

pub(crate) fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    raw.parse()
        .map_err(|_| StoreError::Decode(format!("bad uuid '{}'", raw)))
}

/// Rows written by this crate carry RFC 3339 timestamps; rows created via
/// the column DEFAULT hold SQLite's "YYYY-MM-DD HH:MM:SS". Accept both.
pub(crate) fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|_| StoreError::Decode(format!("bad timestamp '{}'", raw)))
}
