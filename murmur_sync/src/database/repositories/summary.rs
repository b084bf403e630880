use crate::database::models::{SummaryKind, SummaryRecord};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteSummaryRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::SummaryRepository for SqliteSummaryRepository<'conn> {
    fn upsert(&self, record: &SummaryRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO summary (group_id, object_id, object_type, count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(group_id, object_id, object_type) DO UPDATE SET
                count = excluded.count
            "#,
            params![
                record.group_id,
                record.object_id,
                record.object_type,
                record.count
            ],
        )?;
        Ok(())
    }

    fn get(
        &self,
        group_id: &str,
        object_id: &str,
        kind: SummaryKind,
    ) -> Result<Option<SummaryRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT group_id, object_id, object_type, count
                FROM summary
                WHERE group_id = ?1 AND object_id = ?2 AND object_type = ?3
                "#,
                params![group_id, object_id, kind],
                |row| {
                    Ok(SummaryRecord {
                        group_id: row.get(0)?,
                        object_id: row.get(1)?,
                        object_type: row.get(2)?,
                        count: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    fn get_count(&self, group_id: &str, object_id: &str, kind: SummaryKind) -> Result<i64> {
        let count = self
            .conn
            .query_row(
                r#"
                SELECT count FROM summary
                WHERE group_id = ?1 AND object_id = ?2 AND object_type = ?3
                "#,
                params![group_id, object_id, kind],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }
}
