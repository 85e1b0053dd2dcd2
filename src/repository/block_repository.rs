use super::models::{Block, clamp_limit, key};
use alloy_primitives::{B256, U256};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct BlockRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> BlockRepository<'a> {
    // A block re-imported under a different hash invalidates its cumulative
    // fee total and those of every block above it; the same hash keeps them.
    const UPSERT_BLOCK: &'static str = "INSERT INTO blocks (
            number, hash, parent_hash, miner, gas_used, gas_limit, base_fee_per_gas,
            tx_count, extra_data, timestamp, burned_fees, cumulative_fees_burned
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)
        ON CONFLICT(number) DO UPDATE SET
            hash = excluded.hash,
            parent_hash = excluded.parent_hash,
            miner = excluded.miner,
            gas_used = excluded.gas_used,
            gas_limit = excluded.gas_limit,
            base_fee_per_gas = excluded.base_fee_per_gas,
            tx_count = excluded.tx_count,
            extra_data = excluded.extra_data,
            timestamp = excluded.timestamp,
            burned_fees = excluded.burned_fees,
            cumulative_fees_burned = CASE
                WHEN blocks.hash = excluded.hash THEN blocks.cumulative_fees_burned
                ELSE NULL
            END";

    const DELETE_BLOCK: &'static str = "DELETE FROM blocks WHERE number = ?1";

    const STORED_HASH: &'static str = "SELECT hash FROM blocks WHERE number = ?1";

    const CLEAR_CUMULATIVE_FEES_ABOVE: &'static str = "UPDATE blocks
        SET cumulative_fees_burned = NULL
        WHERE number > ?1 AND cumulative_fees_burned IS NOT NULL";

    const SET_CUMULATIVE_FEES: &'static str =
        "UPDATE blocks SET cumulative_fees_burned = ?1 WHERE number = ?2 AND hash = ?3";

    const EXISTS: &'static str = "SELECT 1 FROM blocks WHERE number = ?1";

    const MAX_NUMBER: &'static str = "SELECT MAX(number) FROM blocks";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, block: &Block) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(Self::STORED_HASH, params![block.number], |row| row.get(0))
            .optional()?;
        if stored.is_some_and(|hash| hash != key(&block.hash)) {
            self.clear_cumulative_fees_above(block.number)?;
        }

        self.conn.execute(
            Self::UPSERT_BLOCK,
            params![
                block.number,
                key(&block.hash),
                key(&block.parent_hash),
                key(&block.miner),
                block.gas_used,
                block.gas_limit,
                block.base_fee_per_gas,
                block.tx_count,
                block.extra_data,
                block.timestamp,
                block.burned_fees.map(|fees| fees.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Removes block `number`. Totals above it are cleared since the
    /// replacement may land under another hash.
    pub fn delete(&self, number: u64) -> Result<usize> {
        let deleted = self.conn.execute(Self::DELETE_BLOCK, params![number])?;
        if deleted > 0 {
            self.clear_cumulative_fees_above(number)?;
        }
        Ok(deleted)
    }

    pub fn clear_cumulative_fees_above(&self, number: u64) -> Result<usize> {
        Ok(self
            .conn
            .execute(Self::CLEAR_CUMULATIVE_FEES_ABOVE, params![number])?)
    }

    pub fn exists(&self, number: u64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(Self::EXISTS, params![number], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_by_number(&self, number: u64) -> Result<Option<Block>> {
        self.find_one("WHERE number = ?1", params![number])
    }

    pub fn get_by_hash(&self, hash: &B256) -> Result<Option<Block>> {
        self.find_one("WHERE hash = ?1", params![key(hash)])
    }

    pub fn max_number(&self) -> Result<Option<u64>> {
        Ok(self.conn.query_row(Self::MAX_NUMBER, [], |row| row.get(0))?)
    }

    pub fn lowest(&self) -> Result<Option<Block>> {
        self.find_one("ORDER BY number ASC LIMIT 1", [])
    }

    /// Highest block already carrying a cumulative burned-fee total.
    pub fn highest_with_cumulative_fees(&self) -> Result<Option<Block>> {
        self.find_one(
            "WHERE cumulative_fees_burned IS NOT NULL ORDER BY number DESC LIMIT 1",
            [],
        )
    }

    /// Lowest block carrying a total whose stored successor has none. Totals
    /// are written in order, so anything above such a gap is suspect.
    pub fn lowest_before_missing_cumulative_fees(&self) -> Result<Option<Block>> {
        self.find_one(
            "WHERE cumulative_fees_burned IS NOT NULL AND EXISTS (
                SELECT 1 FROM blocks child
                WHERE child.number = blocks.number + 1
                  AND child.cumulative_fees_burned IS NULL
            ) ORDER BY number ASC LIMIT 1",
            [],
        )
    }

    /// Writes the running total, guarded by hash so a concurrent reorg
    /// re-import is never overwritten with a stale value.
    pub fn set_cumulative_fees(&self, number: u64, hash: &B256, total: &U256) -> Result<bool> {
        let updated = self.conn.execute(
            Self::SET_CUMULATIVE_FEES,
            params![total.to_string(), number, key(hash)],
        )?;
        Ok(updated == 1)
    }

    pub fn latest(&self, skip: usize, limit: usize) -> Result<Vec<Block>> {
        let query = format!(
            "SELECT {} FROM blocks ORDER BY number DESC LIMIT ?1 OFFSET ?2",
            Block::COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let blocks = stmt
            .query_map(params![clamp_limit(limit), skip], Block::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn find_one(&self, clause: &str, params: impl rusqlite::Params) -> Result<Option<Block>> {
        let query = format!("SELECT {} FROM blocks {clause}", Block::COLUMNS);
        Ok(self
            .conn
            .query_row(&query, params, Block::from_row)
            .optional()?)
    }
}
