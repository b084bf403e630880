use crate::database::models::ProfileRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteProfileRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::ProfileRepository for SqliteProfileRepository<'conn> {
    fn add(&self, record: &ProfileRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO profiles (group_id, publisher, name, avatar, external_account_id, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.group_id,
                record.publisher,
                record.name,
                record.avatar,
                record.external_account_id,
                record.timestamp
            ],
        )?;
        Ok(())
    }

    fn latest(&self, group_id: &str, publisher: &str) -> Result<Option<ProfileRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, group_id, publisher, name, avatar, external_account_id, timestamp
                FROM profiles
                WHERE group_id = ?1 AND publisher = ?2
                ORDER BY timestamp DESC
                LIMIT 1
                "#,
                params![group_id, publisher],
                |row| {
                    Ok(ProfileRecord {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        publisher: row.get(2)?,
                        name: row.get(3)?,
                        avatar: row.get(4)?,
                        external_account_id: row.get(5)?,
                        timestamp: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }
}
