use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::Database;

impl Database {
    /// Record a revoked refresh token. Returns false if it was already listed.
    pub fn blacklist_token(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO token_blacklist (jti, user_id, expires_at, blacklisted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![jti, user_id, expires_at, now],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn is_token_blacklisted(&self, jti: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let listed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = ?1)",
                [jti],
                |row| row.get(0),
            )?;
            Ok(listed)
        })
    }

    /// Drop entries whose token has expired anyway.
    pub fn purge_expired_blacklist(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM token_blacklist WHERE expires_at <= ?1", [now])?;
            Ok(removed)
        })
    }
}
