//! User Storage
//! Mission: Securely store and manage user accounts with SQLite
//!
//! Usernames and emails are unique at all times. The existence checks and the
//! write that follows them share one transaction under the store lock, and the
//! UNIQUE indexes reject anything that slips past.

use crate::auth::models::{Gender, Role, User};
use crate::db::{is_unique_violation, Database, DocumentId, StoreError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tracing::info;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, full_name, gender, created_at";

const USERNAME_TAKEN: &str = "Username already exists";
const EMAIL_TAKEN: &str = "Email already registered";

/// Fields a user can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Username,
    Email,
}

impl UserField {
    fn column(&self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Username => "username",
            UserField::Email => "email",
        }
    }
}

/// A user about to be inserted; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub full_name: String,
    pub gender: Gender,
}

/// Partial update through the normal (non-role) path. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub gender: Option<Gender>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.gender.is_none()
    }

    fn apply_to(self, user: &mut User) {
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(password_hash) = self.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(gender) = self.gender {
            user.gender = gender;
        }
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        full_name: row.get(5)?,
        gender: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_unique_violation(err: rusqlite::Error) -> StoreError {
    if is_unique_violation(&err, "users.username") {
        StoreError::Conflict(USERNAME_TAKEN.to_string())
    } else if is_unique_violation(&err, "users.email") {
        StoreError::Conflict(EMAIL_TAKEN.to_string())
    } else {
        err.into()
    }
}

/// Fail with a conflict if `field = value` belongs to anyone other than `except`.
fn ensure_unique(
    tx: &Transaction<'_>,
    field: UserField,
    value: &str,
    except: Option<&DocumentId>,
) -> Result<(), StoreError> {
    let sql = format!("SELECT id FROM users WHERE {} = ?1", field.column());
    let owner: Option<DocumentId> = tx
        .query_row(&sql, params![value], |row| row.get(0))
        .optional()?;

    match owner {
        Some(id) if Some(&id) != except => Err(StoreError::Conflict(
            match field {
                UserField::Email => EMAIL_TAKEN,
                _ => USERNAME_TAKEN,
            }
            .to_string(),
        )),
        _ => Ok(()),
    }
}

fn load(tx: &Transaction<'_>, id: &DocumentId) -> Result<User, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    tx.query_row(&sql, params![id], user_from_row)
        .optional()?
        .ok_or(StoreError::NotFound)
}

/// Credential store: durable user records
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look a user up by a single unique field
    pub fn find_by(&self, field: UserField, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} = ?1",
            USER_COLUMNS,
            field.column()
        );
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params![value], user_from_row)
                .optional()?)
        })
    }

    pub fn get(&self, id: &DocumentId) -> Result<User, StoreError> {
        self.find_by(UserField::Id, id.as_str())?
            .ok_or(StoreError::NotFound)
    }

    /// Insert a new user, failing atomically on a taken username or email
    pub fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: DocumentId::generate(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            full_name: new_user.full_name,
            gender: new_user.gender,
            created_at: Utc::now(),
        };

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_unique(&tx, UserField::Username, &user.username, None)?;
            ensure_unique(&tx, UserField::Email, &user.email, None)?;

            tx.execute(
                "INSERT INTO users (id, username, email, password_hash, role, full_name, gender, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.role,
                    user.full_name,
                    user.gender,
                    user.created_at,
                ],
            )
            .map_err(map_unique_violation)?;

            tx.commit()?;
            Ok(())
        })?;

        info!("✅ Created user: {} ({})", user.username, user.role.as_str());
        Ok(user)
    }

    /// Apply a partial update; a new username or email is re-checked for uniqueness.
    ///
    /// Assignments and solutions record their author by username, so a rename
    /// carries those references along in the same transaction.
    pub fn update(&self, id: &DocumentId, update: UserUpdate) -> Result<User, StoreError> {
        let (user, renamed_from) = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut user = load(&tx, id)?;
            let previous_username = user.username.clone();

            if let Some(username) = &update.username {
                ensure_unique(&tx, UserField::Username, username, Some(id))?;
            }
            if let Some(email) = &update.email {
                ensure_unique(&tx, UserField::Email, email, Some(id))?;
            }

            update.apply_to(&mut user);

            tx.execute(
                "UPDATE users SET username = ?2, email = ?3, password_hash = ?4,
                    full_name = ?5, gender = ?6
                 WHERE id = ?1",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.full_name,
                    user.gender,
                ],
            )
            .map_err(map_unique_violation)?;

            let renamed_from = if user.username != previous_username {
                tx.execute(
                    "UPDATE assignments SET created_by = ?2 WHERE created_by = ?1",
                    params![previous_username, user.username],
                )?;
                tx.execute(
                    "UPDATE solutions SET answered_by = ?2 WHERE answered_by = ?1",
                    params![previous_username, user.username],
                )?;
                Some(previous_username)
            } else {
                None
            };

            tx.commit()?;
            Ok((user, renamed_from))
        })?;

        if let Some(previous) = renamed_from {
            info!("✏️  Renamed user {} to {}", previous, user.username);
        }
        Ok(user)
    }

    /// Explicit role change. Tokens already issued keep their old role until expiry.
    pub fn set_role(&self, id: &DocumentId, role: Role) -> Result<User, StoreError> {
        let user = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut user = load(&tx, id)?;
            tx.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                params![id, role],
            )?;
            tx.commit()?;
            user.role = role;
            Ok(user)
        })?;

        info!("🔑 Role of {} set to {}", user.username, role);
        Ok(user)
    }

    pub fn list(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at, id", USER_COLUMNS);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    pub fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let rows_affected = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])?))?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        info!("🗑️  Deleted user: {}", id);
        Ok(())
    }
}
