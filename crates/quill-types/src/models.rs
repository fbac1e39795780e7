use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Permission;

/// A named, persisted bundle of permission bits. Exactly one role is
/// flagged as the default for new registrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub permissions: Permission,
}

impl Role {
    pub const USER: &'static str = "User";
    pub const MODERATOR: &'static str = "Moderator";
    pub const ADMINISTRATOR: &'static str = "Administrator";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_default: false,
            permissions: Permission::NONE,
        }
    }

    /// The three canonical roles seeded at startup. "User" is the default.
    pub fn canonical() -> [(&'static str, Permission); 3] {
        let base = Permission::FOLLOW | Permission::COMMENT | Permission::WRITE;
        [
            (Self::USER, base),
            (Self::MODERATOR, base | Permission::MODERATE),
            (Self::ADMINISTRATOR, base | Permission::MODERATE | Permission::ADMIN),
        ]
    }

    pub fn has_permission(&self, perm: Permission) -> bool {
        self.permissions.contains(perm)
    }

    /// No-op when the bits are already present.
    pub fn add_permission(&mut self, perm: Permission) {
        if !self.has_permission(perm) {
            self.permissions |= perm;
        }
    }

    /// No-op when the bits are already absent.
    pub fn remove_permission(&mut self, perm: Permission) {
        if self.has_permission(perm) {
            self.permissions &= !perm;
        }
    }

    pub fn reset_permissions(&mut self) {
        self.permissions = Permission::NONE;
    }
}

/// A registered account. `id` stays `None` until the row is persisted;
/// `role` is assigned at construction and never absent afterwards.
///
/// The password hash deliberately does not live here — it stays in the
/// storage row and never crosses into domain or API types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<Uuid>,
    pub email: String,
    pub username: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub role: Role,
}

impl User {
    pub fn new(email: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            email: email.into(),
            username: username.into(),
            confirmed: false,
            name: None,
            location: None,
            about_me: None,
            member_since: now,
            last_seen: now,
            role,
        }
    }

    pub fn can(&self, perm: Permission) -> bool {
        self.role.has_permission(perm)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMIN)
    }
}

/// The current actor: a known account, or the anonymous null-object used
/// when nobody is authenticated. Callers query permissions without a null
/// check; anonymous denies everything.
#[derive(Debug, Clone)]
pub enum Principal {
    Known(User),
    Anonymous,
}

impl Principal {
    pub fn can(&self, perm: Permission) -> bool {
        match self {
            Principal::Known(user) => user.can(perm),
            Principal::Anonymous => false,
        }
    }

    pub fn is_administrator(&self) -> bool {
        match self {
            Principal::Known(user) => user.is_administrator(),
            Principal::Anonymous => false,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Known(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }
}
