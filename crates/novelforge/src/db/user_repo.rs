//! User repository: CRUD operations for the `users` table.

use std::collections::BTreeSet;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::user::{NotifyItem, User};

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    let notify: String = row.get("notify")?;
    let notify: BTreeSet<NotifyItem> = serde_json::from_str(&notify)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        role: row.get("role")?,
        tier: row.get("tier")?,
        is_active: row.get("is_active")?,
        notify,
        created_at: row.get("created_at")?,
    })
}

fn notify_json(user: &User) -> Result<String, rusqlite::Error> {
    serde_json::to_string(&user.notify)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Inserts a new user row.
pub fn insert(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, name, email, role, tier, is_active, notify, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id,
            user.name,
            user.email,
            user.role,
            user.tier,
            user.is_active,
            notify_json(user)?,
            user.created_at,
        ],
    )?;
    Ok(())
}

/// Updates an existing user. All fields except `id` and `created_at` are overwritten.
pub fn update(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET name=?2, email=?3, role=?4, tier=?5, is_active=?6, notify=?7
         WHERE id=?1",
        params![
            user.id,
            user.name,
            user.email,
            user.role,
            user.tier,
            user.is_active,
            notify_json(user)?,
        ],
    )?;
    Ok(())
}

/// Finds a user by ID.
pub fn find(conn: &Connection, id: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row("SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
        .optional()?;
    Ok(user)
}
