use super::models::StatsSnapshot;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct StatsRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> StatsRepository<'a> {
    const INSERT_STATS: &'static str =
        "INSERT INTO stats (total_txs, weekly_txs, daily_txs, created_at) VALUES (?1, ?2, ?3, ?4)";

    const LATEST: &'static str = "SELECT total_txs, weekly_txs, daily_txs, created_at
        FROM stats ORDER BY created_at DESC, id DESC LIMIT 1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, snapshot: &StatsSnapshot) -> Result<()> {
        self.conn.execute(
            Self::INSERT_STATS,
            params![
                snapshot.total_txs,
                snapshot.weekly_txs,
                snapshot.daily_txs,
                snapshot.created_at
            ],
        )?;
        Ok(())
    }

    pub fn latest(&self) -> Result<Option<StatsSnapshot>> {
        Ok(self
            .conn
            .query_row(Self::LATEST, [], |row| {
                Ok(StatsSnapshot {
                    total_txs: row.get(0)?,
                    weekly_txs: row.get(1)?,
                    daily_txs: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .optional()?)
    }
}
