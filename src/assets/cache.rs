use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::stimulus::StimulusAttributes;

/// One generated image with the profile it depicts.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub id: String,
    pub attributes: StimulusAttributes,
    pub mime_type: String,
    pub data: Vec<u8>,
}

pub struct AssetCache {
    conn: Connection,
}

impl AssetCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut cache = Self {
            conn: Connection::open(path)?,
        };
        cache.init()?;
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self> {
        let mut cache = Self {
            conn: Connection::open_in_memory()?,
        };
        cache.init()?;
        Ok(cache)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                attributes TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Upsert by id in one transaction.
    pub fn save(&mut self, assets: &[StoredAsset]) -> Result<()> {
        let tx = self.conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        for asset in assets {
            tx.execute(
                "INSERT OR REPLACE INTO assets (id, attributes, mime_type, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    asset.id,
                    serde_json::to_string(&asset.attributes)?,
                    asset.mime_type,
                    asset.data,
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<StoredAsset>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, attributes, mime_type, data FROM assets ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, attrs, mime_type, data) = row?;
            out.push(StoredAsset {
                id,
                attributes: serde_json::from_str(&attrs)?,
                mime_type,
                data,
            });
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
