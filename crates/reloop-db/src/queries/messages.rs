use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{MessageRow, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, recipient_id, content, read_at, is_read, created_at";

impl Database {
    /// Store a message and bump its conversation's `latest_conversation` to the
    /// message timestamp, atomically.
    pub fn post_message(&self, message: &NewMessage, now: DateTime<Utc>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (conversation_id, sender_id, recipient_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.conversation_id,
                    message.sender_id,
                    message.recipient_id,
                    message.content,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE conversations SET latest_conversation = ?2, updated_at = ?2 WHERE id = ?1",
                params![message.conversation_id, now],
            )?;
            let row = query_message(&tx, id)?.ok_or_else(|| anyhow!("message {} missing after insert", id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn count_messages(&self, conversation_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?)
        })
    }

    /// One page of a conversation, newest first.
    pub fn list_messages(&self, conversation_id: i64, limit: i64, offset: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![conversation_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip every unread message addressed to `recipient` in the conversation.
    /// Returns how many rows changed.
    pub fn mark_read(&self, conversation_id: i64, recipient: i64, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?3
                 WHERE conversation_id = ?1 AND recipient_id = ?2 AND is_read = 0",
                params![conversation_id, recipient, now],
            )?;
            Ok(changed)
        })
    }

    /// Fetch the messages still unread by `recipient` and mark exactly those
    /// read. The returned rows are the state before marking.
    pub fn take_unread(
        &self,
        conversation_id: i64,
        recipient: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let unread = {
                let sql = format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND recipient_id = ?2 AND is_read = 0
                     ORDER BY created_at, id"
                );
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map([conversation_id, recipient], map_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            // Same predicate under the same lock, so exactly the fetched rows flip.
            tx.execute(
                "UPDATE messages SET is_read = 1, read_at = ?3
                 WHERE conversation_id = ?1 AND recipient_id = ?2 AND is_read = 0",
                params![conversation_id, recipient, now],
            )?;

            tx.commit()?;
            Ok(unread)
        })
    }
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_message).optional()?)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        content: row.get(4)?,
        read_at: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;
    use chrono::Duration;

    fn message(conversation_id: i64, from: i64, to: i64, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id: from,
            recipient_id: to,
            content: content.to_string(),
        }
    }

    #[test]
    fn posting_bumps_latest_conversation() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        assert!(conv.latest_conversation.is_none());

        let msg = db.post_message(&message(conv.id, a.id, b.id, "hi"), Utc::now()).unwrap();
        let conv = db.get_conversation(conv.id).unwrap().unwrap();
        assert!(conv.latest_conversation.unwrap() >= msg.created_at);
        assert!(!msg.is_read);
    }

    #[test]
    fn pages_newest_first() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        let start = Utc::now();
        for i in 0..5 {
            db.post_message(&message(conv.id, a.id, b.id, &format!("m{i}")), start + Duration::seconds(i))
                .unwrap();
        }

        assert_eq!(db.count_messages(conv.id).unwrap(), 5);
        let first: Vec<_> = db
            .list_messages(conv.id, 2, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.content.unwrap())
            .collect();
        assert_eq!(first, vec!["m4", "m3"]);
        let last = db.list_messages(conv.id, 2, 4).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content.as_deref(), Some("m0"));
    }

    #[test]
    fn mark_read_only_touches_recipient_and_is_idempotent() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        db.post_message(&message(conv.id, a.id, b.id, "to b"), Utc::now()).unwrap();
        db.post_message(&message(conv.id, a.id, b.id, "to b again"), Utc::now()).unwrap();
        db.post_message(&message(conv.id, b.id, a.id, "to a"), Utc::now()).unwrap();

        assert_eq!(db.mark_read(conv.id, b.id, Utc::now()).unwrap(), 2);
        assert_eq!(db.mark_read(conv.id, b.id, Utc::now()).unwrap(), 0);

        let summary = db.get_conversation_summary(conv.id, a.id).unwrap().unwrap();
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.latest_message.as_deref(), Some("to a"));
    }

    #[test]
    fn take_unread_returns_snapshot_and_marks() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let (conv, _) = db.open_conversation(a.id, b.id, Utc::now()).unwrap();
        db.post_message(&message(conv.id, a.id, b.id, "one"), Utc::now()).unwrap();
        db.post_message(&message(conv.id, a.id, b.id, "two"), Utc::now()).unwrap();

        let taken = db.take_unread(conv.id, b.id, Utc::now()).unwrap();
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|m| !m.is_read));
        assert!(db.take_unread(conv.id, b.id, Utc::now()).unwrap().is_empty());

        let stored = db.list_messages(conv.id, 10, 0).unwrap();
        assert!(stored.iter().all(|m| m.is_read && m.read_at.is_some()));
    }
}
