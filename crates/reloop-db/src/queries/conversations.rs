use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{ConversationRow, ConversationSummaryRow};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.user1_id, c.user2_id, c.latest_conversation, c.deleted_at, c.created_at, c.updated_at";

/// Latest message text and the viewer's (?1) unread count, appended after
/// `CONVERSATION_COLUMNS`.
const SUMMARY_COLUMNS: &str = "
    (SELECT m.content FROM messages m WHERE m.conversation_id = c.id
     ORDER BY m.created_at DESC, m.id DESC LIMIT 1),
    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id
     AND m.recipient_id = ?1 AND m.is_read = 0)";

impl Database {
    /// Lookup-or-create for the unordered pair `(a, b)`, both orderings checked,
    /// in one transaction. A soft-deleted pair is restored rather than duplicated.
    /// Returns the conversation and whether it was newly inserted.
    pub fn open_conversation(
        &self,
        a: i64,
        b: i64,
        now: DateTime<Utc>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_between(&tx, a, b)? {
                if existing.deleted_at.is_some() {
                    tx.execute(
                        "UPDATE conversations SET deleted_at = NULL, updated_at = ?2 WHERE id = ?1",
                        params![existing.id, now],
                    )?;
                }
                let row = query_conversation(&tx, existing.id)?
                    .ok_or_else(|| anyhow!("conversation {} vanished", existing.id))?;
                tx.commit()?;
                return Ok((row, false));
            }

            tx.execute(
                "INSERT INTO conversations (user1_id, user2_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![a, b, now],
            )?;
            let id = tx.last_insert_rowid();
            let row = query_conversation(&tx, id)?
                .ok_or_else(|| anyhow!("conversation {} missing after insert", id))?;
            tx.commit()?;
            Ok((row, true))
        })
    }

    pub fn find_conversation_between(&self, a: i64, b: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_between(conn, a, b))
    }

    /// Live (not soft-deleted) conversation by id.
    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            Ok(query_conversation(conn, id)?.filter(|c| c.deleted_at.is_none()))
        })
    }

    /// Conversation `id` annotated for `viewer`.
    pub fn get_conversation_summary(
        &self,
        id: i64,
        viewer: i64,
    ) -> Result<Option<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS}, {SUMMARY_COLUMNS}
                 FROM conversations c WHERE c.id = ?2 AND c.deleted_at IS NULL"
            );
            Ok(conn.query_row(&sql, [viewer, id], map_summary).optional()?)
        })
    }

    /// Every live conversation `user` takes part in, most recent activity first.
    /// A conversation without messages counts from when it was opened.
    pub fn list_conversations_for(&self, user: i64) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS}, {SUMMARY_COLUMNS}
                 FROM conversations c
                 WHERE (c.user1_id = ?1 OR c.user2_id = ?1) AND c.deleted_at IS NULL
                 ORDER BY COALESCE(c.latest_conversation, c.created_at) DESC, c.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user], map_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Distinct ids of everyone `user` has a live conversation with.
    pub fn conversation_partner_ids(&self, user: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT partner FROM (
                     SELECT CASE WHEN user1_id = ?1 THEN user2_id ELSE user1_id END AS partner
                     FROM conversations
                     WHERE (user1_id = ?1 OR user2_id = ?1) AND deleted_at IS NULL
                 )
                 WHERE partner IS NOT NULL AND partner != ?1
                 ORDER BY partner",
            )?;
            let ids = stmt
                .query_map([user], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    pub fn soft_delete_conversation(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET deleted_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now],
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_conversation(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?1");
    Ok(conn.query_row(&sql, [id], map_conversation).optional()?)
}

fn query_between(conn: &Connection, a: i64, b: i64) -> Result<Option<ConversationRow>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations c
         WHERE (c.user1_id = ?1 AND c.user2_id = ?2) OR (c.user1_id = ?2 AND c.user2_id = ?1)
         ORDER BY c.id LIMIT 1"
    );
    Ok(conn.query_row(&sql, [a, b], map_conversation).optional()?)
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        latest_conversation: row.get(3)?,
        deleted_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_summary(row: &Row<'_>) -> rusqlite::Result<ConversationSummaryRow> {
    Ok(ConversationSummaryRow {
        conversation: map_conversation(row)?,
        latest_message: row.get(7)?,
        unread_count: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;
    use crate::models::NewMessage;

    #[test]
    fn open_is_idempotent_in_either_order() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");

        let (first, created) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        assert!(created);
        let (again, created_again) = db.open_conversation(b.id, a.id, Utc::now()).unwrap();
        assert!(!created_again);
        assert_eq!(first.id, again.id);

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn soft_deleted_pair_is_restored() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();

        assert!(db.soft_delete_conversation(conv.id, Utc::now()).unwrap());
        assert!(db.get_conversation(conv.id).unwrap().is_none());
        assert!(db.list_conversations_for(a.id).unwrap().is_empty());
        assert!(!db.soft_delete_conversation(conv.id, Utc::now()).unwrap());

        let (restored, created) = db.open_conversation(b.id, a.id, Utc::now()).unwrap();
        assert!(!created);
        assert_eq!(restored.id, conv.id);
        assert!(restored.deleted_at.is_none());
    }

    #[test]
    fn partners_are_distinct_counterparts() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let c = testutil::user(&db, "c@x.com");
        db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        db.open_conversation(c.id, a.id, Utc::now()).unwrap();

        assert_eq!(db.conversation_partner_ids(a.id).unwrap(), vec![b.id, c.id]);
        assert_eq!(db.conversation_partner_ids(b.id).unwrap(), vec![a.id]);
    }

    #[test]
    fn fresh_conversation_sorts_above_older_activity() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let c = testutil::user(&db, "c@x.com");
        let earlier = Utc::now() - chrono::Duration::hours(1);

        let (old, _) = db.open_conversation(a.id, b.id, earlier).unwrap();
        let message = NewMessage { conversation_id: old.id, sender_id: a.id, recipient_id: b.id, content: "hi".into() };
        db.post_message(&message, earlier).unwrap();
        let (fresh, _) = db.open_conversation(a.id, c.id, Utc::now()).unwrap();

        let order: Vec<i64> = db.list_conversations_for(a.id).unwrap().iter().map(|s| s.conversation.id).collect();
        assert_eq!(order, vec![fresh.id, old.id]);
    }

    #[test]
    fn counterpart_helpers() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();

        assert!(conv.involves(a.id));
        assert_eq!(conv.counterpart_of(a.id), Some(b.id));
        assert_eq!(conv.counterpart_of(b.id), Some(a.id));
        assert_eq!(conv.counterpart_of(999), None);
    }
}
