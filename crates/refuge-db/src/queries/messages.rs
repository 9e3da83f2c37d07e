use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use refuge_types::models::{Conversation, Message, UserSummary};

use super::OptionalExt;
use crate::Database;
use crate::models::{RowExt, format_ts, now_ts};

const MESSAGE_COLUMNS: &str = "id, content, sender_id, is_read, conversation_id, created_at";

impl Database {
    // -- Conversations --

    /// Returns the one-to-one conversation between `user` and `other`,
    /// creating it if needed. The flag is true when it was created.
    pub fn get_or_create_conversation(
        &self,
        user: Uuid,
        other: Uuid,
    ) -> Result<(Conversation, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT p1.conversation_id
                     FROM conversation_participants p1
                     JOIN conversation_participants p2 ON p1.conversation_id = p2.conversation_id
                     WHERE p1.user_id = ?1 AND p2.user_id = ?2
                       AND (SELECT COUNT(*) FROM conversation_participants p3
                            WHERE p3.conversation_id = p1.conversation_id) = 2
                     LIMIT 1",
                    params![user.to_string(), other.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            let (id, created) = match existing {
                Some(raw) => (raw.parse::<Uuid>()?, false),
                None => {
                    let id = Uuid::new_v4();
                    let now = now_ts();
                    tx.execute(
                        "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                        params![id.to_string(), now],
                    )?;
                    for participant in [user, other] {
                        tx.execute(
                            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                            params![id.to_string(), participant.to_string()],
                        )?;
                    }
                    (id, true)
                }
            };

            let conversation = query_conversation(&tx, id, user)?
                .ok_or_else(|| anyhow!("Conversation vanished: {}", id))?;
            tx.commit()?;
            Ok((conversation, created))
        })
    }

    /// Conversation as seen by `viewer` (unread count is theirs).
    pub fn get_conversation(&self, id: Uuid, viewer: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, id, viewer))
    }

    /// The viewer's conversations, most recently active first.
    pub fn list_conversations(&self, viewer: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let ids: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT c.id FROM conversations c
                     JOIN conversation_participants p ON p.conversation_id = c.id
                     WHERE p.user_id = ?1
                     ORDER BY COALESCE(c.last_message_at, c.updated_at) DESC",
                )?;
                stmt.query_map([viewer.to_string()], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut conversations = Vec::with_capacity(ids.len());
            for raw in ids {
                if let Some(c) = query_conversation(conn, raw.parse()?, viewer)? {
                    conversations.push(c);
                }
            }
            Ok(conversations)
        })
    }

    pub fn is_participant(&self, conversation_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id.to_string(), user.to_string()],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn participant_ids(&self, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1",
            )?;
            let ids = stmt
                .query_map([conversation_id.to_string()], |row| row.uuid(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Messages --

    /// Stores a message and updates the conversation's last-message snapshot.
    pub fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let id = Uuid::new_v4();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, content, sender_id, is_read, conversation_id, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                params![
                    id.to_string(),
                    content,
                    sender_id.to_string(),
                    conversation_id.to_string(),
                    now
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message = ?2, last_message_at = ?3, updated_at = ?3 WHERE id = ?1",
                params![conversation_id.to_string(), content, now],
            )?;
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            let message = tx.query_row(&sql, [id.to_string()], map_message)?;
            tx.commit()?;
            Ok(message)
        })
    }

    /// Up to `limit` messages older than `before` (or the newest ones),
    /// returned oldest first.
    pub fn get_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at DESC
                 LIMIT ?3",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(
                    params![conversation_id.to_string(), before.map(format_ts), limit],
                    map_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Marks other participants' messages as read. Returns how many changed.
    pub fn mark_conversation_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                params![conversation_id.to_string(), reader.to_string()],
            )?;
            Ok(n)
        })
    }

    /// Unread messages from others across all of the user's conversations.
    pub fn unread_message_count(&self, user: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversation_participants p ON p.conversation_id = m.conversation_id
                 WHERE p.user_id = ?1 AND m.sender_id != ?1 AND m.is_read = 0",
                [user.to_string()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }
}

fn query_conversation(conn: &Connection, id: Uuid, viewer: Uuid) -> Result<Option<Conversation>> {
    let row = conn
        .query_row(
            "SELECT id, last_message, last_message_at, created_at, updated_at FROM conversations WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(Conversation {
                    id: row.uuid(0)?,
                    last_message: row.get(1)?,
                    last_message_at: row.opt_ts(2)?,
                    participants: Vec::new(),
                    unread_count: 0,
                    created_at: row.ts(3)?,
                    updated_at: row.ts(4)?,
                })
            },
        )
        .optional()?;

    let Some(mut conversation) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.organization_name, u.role, u.avatar
         FROM conversation_participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.conversation_id = ?1
         ORDER BY u.name COLLATE NOCASE",
    )?;
    conversation.participants = stmt
        .query_map([id.to_string()], |row| {
            Ok(UserSummary {
                id: row.uuid(0)?,
                name: row.get(1)?,
                organization_name: row.get(2)?,
                role: row.label(3)?,
                avatar: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    conversation.unread_count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
        params![id.to_string(), viewer.to_string()],
        |row| row.get(0),
    )?;

    Ok(Some(conversation))
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.uuid(0)?,
        content: row.get(1)?,
        sender_id: row.uuid(2)?,
        read: row.get(3)?,
        conversation_id: row.uuid(4)?,
        created_at: row.ts(5)?,
    })
}
