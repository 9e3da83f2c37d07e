use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::api::RegisterRequest;
use refuge_types::models::{Role, User};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, UserRow, now_ts, to_json};

pub(crate) const USER_COLUMNS: &str =
    "id, name, organization_name, email, role, language, verified, avatar, contact, location, created_at, updated_at";

/// Which users `list_users` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserFilter {
    pub exclude_id: Option<Uuid>,
    pub role: Option<Role>,
    pub exclude_role: Option<Role>,
}

impl Database {
    // -- Users --

    /// Inserts a user. `req.email` is stored as given; callers normalize it.
    pub fn create_user(&self, req: &RegisterRequest, password_hash: &str) -> Result<User> {
        let id = Uuid::new_v4();
        let now = now_ts();
        let role = req.role.unwrap_or(Role::User);
        let language = req.language.as_deref().unwrap_or("en");
        let location = to_json(req.location.as_ref())?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, organization_name, email, password, role, language, contact, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id.to_string(),
                    req.name,
                    req.organization_name,
                    req.email,
                    password_hash,
                    role.as_str(),
                    language,
                    req.contact,
                    location,
                    now,
                ],
            )?;
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {}, password FROM users WHERE email = ?1", USER_COLUMNS);
            conn.query_row(&sql, [email], |row| {
                Ok(UserRow {
                    user: map_user(row)?,
                    password: row.get(12)?,
                })
            })
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE (?1 IS NULL OR id != ?1)
                   AND (?2 IS NULL OR role = ?2)
                   AND (?3 IS NULL OR role != ?3)
                 ORDER BY name COLLATE NOCASE",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        filter.exclude_id.map(|id| id.to_string()),
                        filter.role.map(|r| r.as_str()),
                        filter.exclude_role.map(|r| r.as_str()),
                    ],
                    map_user,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_user).optional()
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.uuid(0)?,
        name: row.get(1)?,
        organization_name: row.get(2)?,
        email: row.get(3)?,
        role: row.label(4)?,
        language: row.get(5)?,
        verified: row.get(6)?,
        avatar: row.get(7)?,
        contact: row.get(8)?,
        location: row.json(9)?,
        created_at: row.ts(10)?,
        updated_at: row.ts(11)?,
    })
}
