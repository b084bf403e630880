use crate::database::models::{ContentKind, ContentQuery, ContentRecord};
use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const COLUMNS: &str = "id, trx_id, group_id, publisher, kind, timestamp, body, \
                       object_trx_id, thread_trx_id, reply_trx_id, status";

pub(super) struct SqliteContentRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    Ok(ContentRecord {
        id: row.get(0)?,
        trx_id: row.get(1)?,
        group_id: row.get(2)?,
        publisher: row.get(3)?,
        kind: row.get(4)?,
        timestamp: row.get(5)?,
        body: row.get(6)?,
        object_trx_id: row.get(7)?,
        thread_trx_id: row.get(8)?,
        reply_trx_id: row.get(9)?,
        status: row.get(10)?,
    })
}

impl<'conn> super::ContentRepository for SqliteContentRepository<'conn> {
    fn create(&self, record: &ContentRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO content (trx_id, group_id, publisher, kind, timestamp, body,
                                 object_trx_id, thread_trx_id, reply_trx_id, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.trx_id,
                record.group_id,
                record.publisher,
                record.kind,
                record.timestamp,
                record.body,
                record.object_trx_id,
                record.thread_trx_id,
                record.reply_trx_id,
                record.status
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn bulk_create(&self, records: &[ContentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO content (trx_id, group_id, publisher, kind, timestamp, body,
                                 object_trx_id, thread_trx_id, reply_trx_id, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )?;
        for record in records {
            stmt.execute(params![
                record.trx_id,
                record.group_id,
                record.publisher,
                record.kind,
                record.timestamp,
                record.body,
                record.object_trx_id,
                record.thread_trx_id,
                record.reply_trx_id,
                record.status
            ])?;
        }
        Ok(())
    }

    fn get_by_trx_id(&self, trx_id: &str) -> Result<Option<ContentRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM content WHERE trx_id = ?1"),
                params![trx_id],
                row_to_record,
            )
            .optional()?)
    }

    fn bulk_get_by_trx_ids(&self, trx_ids: &[String]) -> Result<Vec<Option<ContentRecord>>> {
        if trx_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; trx_ids.len()].join(", ");
        let sql = format!("SELECT {COLUMNS} FROM content WHERE trx_id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(trx_ids.iter()), row_to_record)?;

        let mut by_trx_id = HashMap::new();
        for row in rows {
            let record = row?;
            by_trx_id.insert(record.trx_id.clone(), record);
        }
        Ok(trx_ids.iter().map(|id| by_trx_id.get(id).cloned()).collect())
    }

    fn list(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {COLUMNS}
            FROM content
            WHERE group_id = ?1
              AND (?2 IS NULL OR kind = ?2)
              AND (?3 IS NULL OR publisher = ?3)
              AND (?4 IS NULL OR timestamp < ?4)
            ORDER BY timestamp DESC
            LIMIT ?5
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                query.group_id,
                query.kind,
                query.publisher,
                query.before_timestamp,
                query.limit as i64
            ],
            row_to_record,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn settle(&self, id: i64, publisher: &str, timestamp: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE content
            SET publisher = ?2, timestamp = ?3, status = 'synced'
            WHERE id = ?1
            "#,
            params![id, publisher, timestamp],
        )?;
        Ok(())
    }

    fn count_for_publisher(&self, group_id: &str, publisher: &str) -> Result<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM content
            WHERE group_id = ?1 AND publisher = ?2 AND kind = ?3
            "#,
            params![group_id, publisher, ContentKind::Object],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_comments_for(&self, group_id: &str, object_trx_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM content
            WHERE group_id = ?1 AND kind = ?2 AND object_trx_id = ?3
            "#,
            params![group_id, ContentKind::Comment, object_trx_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_likes_for(&self, group_id: &str, object_trx_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM content
            WHERE group_id = ?1 AND kind = ?2 AND object_trx_id = ?3
            "#,
            params![group_id, ContentKind::Like, object_trx_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
