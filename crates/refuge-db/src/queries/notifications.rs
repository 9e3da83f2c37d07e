use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params, params_from_iter};
use rusqlite::types::Value;
use uuid::Uuid;

use refuge_types::models::{Notification, NotificationType};

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::{RowExt, now_ts};

const NOTIFICATION_COLUMNS: &str =
    "id, title, description, notification_type, recipient_id, entity_id, is_read, action_taken, created_at";

/// Fields for a new notification; everything else is defaulted.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub title: String,
    pub description: String,
    pub notification_type: NotificationType,
    pub entity_id: Option<Uuid>,
}

impl Database {
    // -- Notifications --

    pub fn create_notification(&self, new: &NewNotification) -> Result<Notification> {
        let id = Uuid::new_v4();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, title, description, notification_type, recipient_id, entity_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    new.title,
                    new.description,
                    new.notification_type.as_str(),
                    new.recipient_id.to_string(),
                    new.entity_id.map(|e| e.to_string()),
                    now_ts(),
                ],
            )?;
            query_notification(conn, id)?
                .ok_or_else(|| anyhow!("Notification vanished after insert: {}", id))
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications WHERE recipient_id = ?1 ORDER BY created_at DESC",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([recipient_id.to_string()], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, recipient_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Sets the given flags on the recipient's notifications among `ids`.
    /// Ids belonging to someone else are ignored. Returns rows changed.
    pub fn update_notifications(
        &self,
        recipient_id: Uuid,
        ids: &[Uuid],
        read: Option<bool>,
        action_taken: Option<bool>,
    ) -> Result<usize> {
        if ids.is_empty() || (read.is_none() && action_taken.is_none()) {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE notifications
             SET is_read = COALESCE(?2, is_read), action_taken = COALESCE(?3, action_taken)
             WHERE recipient_id = ?1 AND id IN ({})",
            placeholders(4, ids.len())
        );
        let mut values: Vec<Value> = vec![
            Value::Text(recipient_id.to_string()),
            read.map_or(Value::Null, |r| Value::Integer(r as i64)),
            action_taken.map_or(Value::Null, |a| Value::Integer(a as i64)),
        ];
        values.extend(ids.iter().map(|id| Value::Text(id.to_string())));

        self.with_conn_mut(|conn| Ok(conn.execute(&sql, params_from_iter(values))?))
    }

    pub fn delete_notifications(&self, recipient_id: Uuid, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM notifications WHERE recipient_id = ?1 AND id IN ({})",
            placeholders(2, ids.len())
        );
        let values = std::iter::once(recipient_id.to_string())
            .chain(ids.iter().map(|id| id.to_string()))
            .collect::<Vec<_>>();

        self.with_conn_mut(|conn| Ok(conn.execute(&sql, params_from_iter(values))?))
    }

    pub fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
            )?;
            Ok(n)
        })
    }
}

fn query_notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS);
    conn.query_row(&sql, [id.to_string()], map_notification).optional()
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.uuid(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        notification_type: row.label(3)?,
        recipient_id: row.uuid(4)?,
        entity_id: row.opt_uuid(5)?,
        read: row.get(6)?,
        action_taken: row.get(7)?,
        created_at: row.ts(8)?,
    })
}
