use crate::database::models::{NotificationRecord, NotificationStatus, NotificationType};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

pub(super) struct SqliteNotificationRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        group_id: row.get(1)?,
        object_trx_id: row.get(2)?,
        kind: row.get(3)?,
        status: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

impl<'conn> super::NotificationRepository for SqliteNotificationRepository<'conn> {
    fn create(&self, record: &NotificationRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (id, group_id, object_trx_id, kind, status, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.group_id,
                record.object_trx_id,
                record.kind,
                record.status,
                record.timestamp
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<NotificationRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, group_id, object_trx_id, kind, status, timestamp
                FROM notifications
                WHERE id = ?1
                "#,
                params![id],
                row_to_record,
            )
            .optional()?)
    }

    fn mark_read(&self, id: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE notifications SET status = ?2 WHERE id = ?1",
            params![id, NotificationStatus::Read],
        )?;
        Ok(affected > 0)
    }

    fn list(
        &self,
        group_id: &str,
        kinds: &[NotificationType],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NotificationRecord>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; kinds.len()].join(", ");
        let sql = format!(
            r#"
            SELECT id, group_id, object_trx_id, kind, status, timestamp
            FROM notifications
            WHERE kind IN ({placeholders}) AND group_id = ?{}
            ORDER BY timestamp DESC
            LIMIT ?{} OFFSET ?{}
            "#,
            kinds.len() + 1,
            kinds.len() + 2,
            kinds.len() + 3,
        );

        let limit = limit as i64;
        let offset = offset as i64;
        let mut bindings: Vec<&dyn ToSql> = Vec::with_capacity(kinds.len() + 3);
        for kind in kinds {
            bindings.push(kind);
        }
        bindings.push(&group_id);
        bindings.push(&limit);
        bindings.push(&offset);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(bindings.as_slice(), row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn count_unread(&self, group_id: &str, kind: NotificationType) -> Result<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE group_id = ?1 AND kind = ?2 AND status = ?3
            "#,
            params![group_id, kind, NotificationStatus::Unread],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
