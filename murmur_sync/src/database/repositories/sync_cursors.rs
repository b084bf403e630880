use crate::database::models::SyncCursorRecord;
use crate::database::StoreError;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteSyncCursorRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SyncCursorRecord> {
    Ok(SyncCursorRecord {
        group_id: row.get(0)?,
        latest_read_timestamp: row.get(1)?,
        unread_count: row.get(2)?,
        latest_object_timestamp: row.get(3)?,
    })
}

impl<'conn> super::SyncCursorRepository for SqliteSyncCursorRepository<'conn> {
    fn ensure(&self, group_id: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sync_cursors (group_id, latest_read_timestamp, unread_count, latest_object_timestamp)
            VALUES (?1, 0, 0, 0)
            ON CONFLICT(group_id) DO NOTHING
            "#,
            params![group_id],
        )?;
        Ok(())
    }

    fn get(&self, group_id: &str) -> Result<Option<SyncCursorRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT group_id, latest_read_timestamp, unread_count, latest_object_timestamp
                FROM sync_cursors
                WHERE group_id = ?1
                "#,
                params![group_id],
                row_to_record,
            )
            .optional()?)
    }

    fn list(&self) -> Result<Vec<SyncCursorRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT group_id, latest_read_timestamp, unread_count, latest_object_timestamp
            FROM sync_cursors
            ORDER BY group_id ASC
            "#,
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut cursors = Vec::new();
        for row in rows {
            cursors.push(row?);
        }
        Ok(cursors)
    }

    fn advance(&self, group_id: &str, unread_delta: i64, observed_timestamp: i64) -> Result<()> {
        let affected = self.conn.execute(
            r#"
            UPDATE sync_cursors
            SET unread_count = unread_count + ?2,
                latest_object_timestamp = MAX(latest_object_timestamp, ?3)
            WHERE group_id = ?1
            "#,
            params![group_id, unread_delta, observed_timestamp],
        )?;
        if affected == 0 {
            return Err(StoreError::UnknownGroup(group_id.to_string()).into());
        }
        Ok(())
    }

    fn mark_read(&self, group_id: &str) -> Result<()> {
        let affected = self.conn.execute(
            r#"
            UPDATE sync_cursors
            SET latest_read_timestamp = latest_object_timestamp,
                unread_count = 0
            WHERE group_id = ?1
            "#,
            params![group_id],
        )?;
        if affected == 0 {
            return Err(StoreError::UnknownGroup(group_id.to_string()).into());
        }
        Ok(())
    }
}
