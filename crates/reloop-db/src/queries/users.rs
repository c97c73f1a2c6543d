use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::placeholders;
use crate::Database;
use crate::models::{NewUser, UserRow};

const USER_COLUMNS: &str = "id, name, email, password, is_active, date_joined, profile_picture, \
     phone_number, address, postal_code, state, country, is_active_user, last_active";

impl Database {
    /// Insert runs inside a transaction: the row either commits whole or not at all.
    pub fn create_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (name, email, password, is_active, date_joined, profile_picture,
                                    phone_number, address, postal_code, state, country)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    user.name,
                    user.email,
                    user.password,
                    user.is_active,
                    now,
                    user.profile_picture,
                    user.phone_number,
                    user.address,
                    user.postal_code,
                    user.state,
                    user.country,
                ],
            )?;
            let id = tx.last_insert_rowid();
            let row = query_user(&tx, id)?.ok_or_else(|| anyhow!("user {} missing after insert", id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], map_user).optional()?)
        })
    }

    /// True when another user (other than `except`) already owns `email`.
    pub fn email_in_use(&self, email: &str, except: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id IS NOT ?2)",
                params![email, except],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch users for a set of ids. Unknown ids are skipped.
    pub fn get_users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({}) ORDER BY id",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persist every mutable profile column of `user`.
    pub fn update_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET name = ?2, email = ?3, is_active = ?4, profile_picture = ?5,
                        phone_number = ?6, address = ?7, postal_code = ?8, state = ?9, country = ?10
                 WHERE id = ?1",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.is_active,
                    user.profile_picture,
                    user.phone_number,
                    user.address,
                    user.postal_code,
                    user.state,
                    user.country,
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    /// Activity ping: flags the user active and stamps `last_active`.
    pub fn mark_user_active(&self, id: i64, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active_user = 1, last_active = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, id)
        })
    }
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_user).optional()?)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        is_active: row.get(4)?,
        date_joined: row.get(5)?,
        profile_picture: row.get(6)?,
        phone_number: row.get(7)?,
        address: row.get(8)?,
        postal_code: row.get(9)?,
        state: row.get(10)?,
        country: row.get(11)?,
        is_active_user: row.get(12)?,
        last_active: row.get(13)?,
    })
}
