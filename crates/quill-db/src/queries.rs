use chrono::Utc;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use quill_types::models::{Role, User};
use quill_types::permissions::Permission;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{RoleRow, UserRow};

const USER_SELECT: &str = "SELECT u.id, u.email, u.username, u.password_hash, u.role_id, \
     u.confirmed, u.name, u.location, u.about_me, u.member_since, u.last_seen, \
     r.id, r.name, r.is_default, r.permissions \
     FROM users u JOIN roles r ON u.role_id = r.id";

impl Database {
    // -- Roles --

    /// Idempotent upsert of the three canonical roles. Run at startup;
    /// re-running converges to the same state, and concurrent invocations
    /// resolve first-one-wins on the unique name.
    pub fn seed_roles(&self) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for (name, permissions) in Role::canonical() {
                tx.execute(
                    "INSERT OR IGNORE INTO roles (id, name) VALUES (?1, ?2)",
                    (Uuid::new_v4().to_string(), name),
                )?;
                tx.execute(
                    "UPDATE roles SET permissions = ?1, is_default = ?2 WHERE name = ?3",
                    rusqlite::params![permissions.bits(), name == Role::USER, name],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;
        info!("Canonical roles seeded");
        Ok(())
    }

    pub fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        self.with_conn(|conn| {
            query_role(
                conn,
                "SELECT id, name, is_default, permissions FROM roles WHERE name = ?1",
                [name],
            )
        })
    }

    pub fn default_role(&self) -> StoreResult<Option<Role>> {
        self.with_conn(|conn| {
            query_role(
                conn,
                "SELECT id, name, is_default, permissions FROM roles WHERE is_default = 1 LIMIT 1",
                (),
            )
        })
    }

    /// Administrative permission edit — the only mutation path for roles
    /// besides seeding.
    pub fn set_role_permissions(&self, role_id: &Uuid, permissions: Permission) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE roles SET permissions = ?1 WHERE id = ?2",
                rusqlite::params![permissions.bits(), role_id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    // -- Users --

    /// Insert a new user row. The id is assigned here; duplicate email or
    /// username surfaces as `StoreError::Conflict`.
    pub fn create_user(&self, user: &User, password_hash: &str) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password_hash, role_id, confirmed, \
                 name, location, about_me, member_since, last_seen) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id.to_string(),
                    user.email,
                    user.username,
                    password_hash,
                    user.role.id.to_string(),
                    user.confirmed,
                    user.name,
                    user.location,
                    user.about_me,
                    user.member_since.to_rfc3339(),
                    user.last_seen.to_rfc3339(),
                ],
            )
            .map_err(map_unique_violation)?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn user_by_id(&self, id: &Uuid) -> StoreResult<Option<User>> {
        self.with_conn(|conn| {
            Ok(query_user(conn, "u.id = ?1", &id.to_string())?.map(|(user, _)| user))
        })
    }

    pub fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| Ok(query_user(conn, "u.username = ?1", username)?.map(|(user, _)| user)))
    }

    /// Login lookup: the user plus the stored password hash. The hash
    /// goes straight into verification and nowhere else.
    pub fn user_and_hash_by_email(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", email))
    }

    pub fn set_confirmed(&self, id: &Uuid, confirmed: bool) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET confirmed = ?1 WHERE id = ?2",
                rusqlite::params![confirmed, id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Refresh activity recency. One UPDATE, called on every
    /// authenticated request, safe under rapid repetition.
    pub fn touch_last_seen(&self, id: &Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?1 WHERE id = ?2",
                rusqlite::params![Utc::now().to_rfc3339(), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn update_profile(
        &self,
        id: &Uuid,
        name: Option<&str>,
        location: Option<&str>,
        about_me: Option<&str>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET name = ?1, location = ?2, about_me = ?3 WHERE id = ?4",
                rusqlite::params![name, location, about_me, id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    /// Administrative edit of another account. Absent fields are left
    /// untouched; email/username stay subject to the same uniqueness
    /// rules as registration. Returns false when the user does not exist.
    pub fn admin_update_user(
        &self,
        id: &Uuid,
        email: Option<&str>,
        username: Option<&str>,
        confirmed: Option<bool>,
        role_id: Option<&Uuid>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let n = conn
                .execute(
                    "UPDATE users SET \
                         email = COALESCE(?1, email), \
                         username = COALESCE(?2, username), \
                         confirmed = COALESCE(?3, confirmed), \
                         role_id = COALESCE(?4, role_id) \
                     WHERE id = ?5",
                    rusqlite::params![
                        email,
                        username,
                        confirmed,
                        role_id.map(|r| r.to_string()),
                        id.to_string(),
                    ],
                )
                .map_err(map_unique_violation)?;
            Ok(n > 0)
        })
    }

    /// Remove a user and, in the same transaction, every follow edge
    /// where they appear on either side.
    pub fn delete_user(&self, id: &Uuid) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 OR followed_id = ?1",
                [id.to_string()],
            )?;
            let n = tx.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    // -- Follows --

    /// Create the edge follower → followed. A no-op when the edge already
    /// exists — concurrent inserts of the same pair race on the primary
    /// key and the loser is ignored, not an error. Returns true when the
    /// edge was newly created.
    pub fn follow(&self, follower: &User, followed: &User) -> StoreResult<bool> {
        let (Some(follower_id), Some(followed_id)) = (follower.id, followed.id) else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    follower_id.to_string(),
                    followed_id.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove the edge follower → followed; a no-op when absent.
    pub fn unfollow(&self, follower: &User, followed: &User) -> StoreResult<bool> {
        let (Some(follower_id), Some(followed_id)) = (follower.id, followed.id) else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                [follower_id.to_string(), followed_id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    /// False when either side has not been persisted yet.
    pub fn is_following(&self, follower: &User, followed: &User) -> StoreResult<bool> {
        let (Some(follower_id), Some(followed_id)) = (follower.id, followed.id) else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                [follower_id.to_string(), followed_id.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    pub fn is_followed_by(&self, user: &User, other: &User) -> StoreResult<bool> {
        self.is_following(other, user)
    }

    pub fn follower_count(&self, user: &User) -> StoreResult<i64> {
        let Some(id) = user.id else { return Ok(0) };
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE followed_id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    pub fn following_count(&self, user: &User) -> StoreResult<i64> {
        let Some(id) = user.id else { return Ok(0) };
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )?)
        })
    }
}

fn query_role(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Option<Role>> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt
        .query_row(params, |row| {
            Ok(RoleRow {
                id: row.get(0)?,
                name: row.get(1)?,
                is_default: row.get(2)?,
                permissions: row.get(3)?,
            })
        })
        .optional()?;

    row.map(RoleRow::into_role).transpose()
}

fn query_user(
    conn: &Connection,
    where_clause: &str,
    param: &str,
) -> StoreResult<Option<(User, String)>> {
    let sql = format!("{} WHERE {}", USER_SELECT, where_clause);
    let mut stmt = conn.prepare(&sql)?;

    let pair = stmt
        .query_row([param], |row| {
            Ok((
                UserRow {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    username: row.get(2)?,
                    password_hash: row.get(3)?,
                    role_id: row.get(4)?,
                    confirmed: row.get(5)?,
                    name: row.get(6)?,
                    location: row.get(7)?,
                    about_me: row.get(8)?,
                    member_since: row.get(9)?,
                    last_seen: row.get(10)?,
                },
                RoleRow {
                    id: row.get(11)?,
                    name: row.get(12)?,
                    is_default: row.get(13)?,
                    permissions: row.get(14)?,
                },
            ))
        })
        .optional()?;

    match pair {
        Some((user_row, role_row)) => {
            let role = role_row.into_role()?;
            let hash = user_row.password_hash.clone();
            Ok(Some((user_row.into_user(role)?, hash)))
        }
        None => Ok(None),
    }
}

fn map_unique_violation(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref e, Some(ref msg)) = err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("users.email") {
                return StoreError::Conflict("email");
            }
            if msg.contains("users.username") {
                return StoreError::Conflict("username");
            }
        }
    }
    StoreError::Sqlite(err)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.seed_roles().unwrap();
        db
    }

    fn register(db: &Database, email: &str, username: &str) -> User {
        let role = db.default_role().unwrap().expect("default role seeded");
        let user = User::new(email, username, role);
        let id = db.create_user(&user, "phc-format-hash").unwrap();
        db.user_by_id(&id).unwrap().expect("user persisted")
    }

    fn role_count(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM roles", (), |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn seeding_twice_converges() {
        let db = test_db();
        db.seed_roles().unwrap();

        assert_eq!(role_count(&db), 3);

        let user = db.role_by_name(Role::USER).unwrap().unwrap();
        assert_eq!(user.permissions.bits(), 7);
        assert!(user.is_default);

        let moderator = db.role_by_name(Role::MODERATOR).unwrap().unwrap();
        assert_eq!(moderator.permissions.bits(), 15);
        assert!(!moderator.is_default);

        let admin = db.role_by_name(Role::ADMINISTRATOR).unwrap().unwrap();
        assert_eq!(admin.permissions.bits(), 31);
        assert!(!admin.is_default);

        assert_eq!(db.default_role().unwrap().unwrap().name, Role::USER);
    }

    #[test]
    fn seeding_repairs_drifted_permissions() {
        let db = test_db();
        let moderator = db.role_by_name(Role::MODERATOR).unwrap().unwrap();
        assert!(db.set_role_permissions(&moderator.id, Permission::NONE).unwrap());

        db.seed_roles().unwrap();

        let repaired = db.role_by_name(Role::MODERATOR).unwrap().unwrap();
        assert_eq!(repaired.permissions.bits(), 15);
        assert_eq!(repaired.id, moderator.id);
    }

    #[test]
    fn duplicate_email_and_username_conflict() {
        let db = test_db();
        register(&db, "a@example.com", "alice");

        let role = db.default_role().unwrap().unwrap();
        let dup_email = User::new("a@example.com", "alice2", role.clone());
        assert!(matches!(
            db.create_user(&dup_email, "h").unwrap_err(),
            StoreError::Conflict("email")
        ));

        let dup_username = User::new("a2@example.com", "alice", role);
        assert!(matches!(
            db.create_user(&dup_username, "h").unwrap_err(),
            StoreError::Conflict("username")
        ));
    }

    #[test]
    fn login_lookup_returns_the_stored_hash() {
        let db = test_db();
        let role = db.default_role().unwrap().unwrap();
        let user = User::new("a@example.com", "alice", role);
        db.create_user(&user, "the-stored-hash").unwrap();

        let (loaded, hash) = db.user_and_hash_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(hash, "the-stored-hash");

        assert!(db.user_and_hash_by_email("missing@example.com").unwrap().is_none());
    }

    #[test]
    fn new_users_start_unconfirmed() {
        let db = test_db();
        let user = register(&db, "a@example.com", "alice");
        assert!(!user.confirmed);

        db.set_confirmed(&user.id.unwrap(), true).unwrap();
        assert!(db.user_by_id(&user.id.unwrap()).unwrap().unwrap().confirmed);
    }

    #[test]
    fn loaded_user_carries_its_role() {
        let db = test_db();
        let user = register(&db, "a@example.com", "alice");
        assert_eq!(user.role.name, Role::USER);
        assert!(user.can(Permission::WRITE));
        assert!(!user.is_administrator());
    }

    #[test]
    fn follow_twice_leaves_one_edge() {
        let db = test_db();
        let a = register(&db, "a@example.com", "alice");
        let b = register(&db, "b@example.com", "bob");

        assert!(db.follow(&a, &b).unwrap());
        assert!(!db.follow(&a, &b).unwrap());

        assert!(db.is_following(&a, &b).unwrap());
        assert_eq!(db.follower_count(&b).unwrap(), 1);
        assert_eq!(db.following_count(&a).unwrap(), 1);
    }

    #[test]
    fn relationship_is_directional() {
        let db = test_db();
        let a = register(&db, "a@example.com", "alice");
        let b = register(&db, "b@example.com", "bob");

        db.follow(&a, &b).unwrap();

        assert!(db.is_following(&a, &b).unwrap());
        assert!(!db.is_following(&b, &a).unwrap());
        assert!(db.is_followed_by(&b, &a).unwrap());
        assert!(!db.is_followed_by(&a, &b).unwrap());
    }

    #[test]
    fn unfollow_then_missing_edge_is_noop() {
        let db = test_db();
        let a = register(&db, "a@example.com", "alice");
        let b = register(&db, "b@example.com", "bob");

        db.follow(&a, &b).unwrap();
        assert!(db.unfollow(&a, &b).unwrap());
        assert!(!db.is_following(&a, &b).unwrap());

        assert!(!db.unfollow(&a, &b).unwrap());
        assert_eq!(db.follower_count(&b).unwrap(), 0);
    }

    #[test]
    fn unpersisted_user_has_no_relationships() {
        let db = test_db();
        let a = register(&db, "a@example.com", "alice");
        let ghost = User::new("g@example.com", "ghost", db.default_role().unwrap().unwrap());
        assert!(ghost.id.is_none());

        assert!(!db.is_following(&a, &ghost).unwrap());
        assert!(!db.is_following(&ghost, &a).unwrap());
        assert!(!db.follow(&a, &ghost).unwrap());
        assert_eq!(db.following_count(&ghost).unwrap(), 0);
    }

    #[test]
    fn deleting_a_user_cascades_edges_both_ways() {
        let db = test_db();
        let a = register(&db, "a@example.com", "alice");
        let b = register(&db, "b@example.com", "bob");
        let c = register(&db, "c@example.com", "carol");

        db.follow(&a, &b).unwrap();
        db.follow(&b, &a).unwrap();
        db.follow(&c, &a).unwrap();

        assert!(db.delete_user(&a.id.unwrap()).unwrap());
        assert!(db.user_by_id(&a.id.unwrap()).unwrap().is_none());

        assert_eq!(db.follower_count(&b).unwrap(), 0);
        assert_eq!(db.following_count(&b).unwrap(), 0);
        assert_eq!(db.following_count(&c).unwrap(), 0);

        // Deleting again reports nothing removed.
        assert!(!db.delete_user(&a.id.unwrap()).unwrap());
    }

    #[test]
    fn touch_last_seen_refreshes_activity() {
        let db = test_db();
        let before = register(&db, "a@example.com", "alice");
        let id = before.id.unwrap();

        db.touch_last_seen(&id).unwrap();
        db.touch_last_seen(&id).unwrap();

        let after = db.user_by_id(&id).unwrap().unwrap();
        assert!(after.last_seen >= before.last_seen);
        assert_eq!(after.member_since, before.member_since);
    }

    #[test]
    fn profile_update_persists() {
        let db = test_db();
        let user = register(&db, "a@example.com", "alice");
        let id = user.id.unwrap();

        assert!(db
            .update_profile(&id, Some("Alice"), Some("Lagos"), Some("writes things"))
            .unwrap());

        let loaded = db.user_by_id(&id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Alice"));
        assert_eq!(loaded.location.as_deref(), Some("Lagos"));
        assert_eq!(loaded.about_me.as_deref(), Some("writes things"));
    }

    #[test]
    fn admin_update_respects_uniqueness() {
        let db = test_db();
        register(&db, "a@example.com", "alice");
        let bob = register(&db, "b@example.com", "bob");
        let bob_id = bob.id.unwrap();

        let err = db
            .admin_update_user(&bob_id, Some("a@example.com"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("email")));

        assert!(db
            .admin_update_user(&bob_id, Some("bob@example.com"), None, Some(true), None)
            .unwrap());
        let updated = db.user_by_id(&bob_id).unwrap().unwrap();
        assert_eq!(updated.email, "bob@example.com");
        assert!(updated.confirmed);
    }

    #[test]
    fn admin_update_changes_role() {
        let db = test_db();
        let user = register(&db, "a@example.com", "alice");
        let moderator = db.role_by_name(Role::MODERATOR).unwrap().unwrap();

        assert!(db
            .admin_update_user(&user.id.unwrap(), None, None, None, Some(&moderator.id))
            .unwrap());

        let updated = db.user_by_id(&user.id.unwrap()).unwrap().unwrap();
        assert_eq!(updated.role.name, Role::MODERATOR);
        assert!(updated.can(Permission::MODERATE));

        // Unknown target: nothing to update.
        assert!(!db
            .admin_update_user(&Uuid::new_v4(), None, None, Some(true), None)
            .unwrap());
    }
}
