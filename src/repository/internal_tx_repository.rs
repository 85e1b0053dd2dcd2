use super::models::{InternalTransaction, clamp_limit, key};
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::params;

pub struct InternalTransactionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> InternalTransactionRepository<'a> {
    const UPSERT_INTERNAL_TX: &'static str = "INSERT INTO internal_transactions (
            transaction_hash, log_index, contract_address, from_address, to_address,
            value, token_id, block_number, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(transaction_hash, log_index) DO UPDATE SET
            contract_address = excluded.contract_address,
            from_address = excluded.from_address,
            to_address = excluded.to_address,
            value = excluded.value,
            token_id = excluded.token_id,
            block_number = excluded.block_number,
            timestamp = COALESCE(excluded.timestamp, internal_transactions.timestamp)";

    const COUNT_FOR_CONTRACT: &'static str =
        "SELECT COUNT(*) FROM internal_transactions WHERE contract_address = ?1";

    const COUNT_FOR_CONTRACT_IN_RANGE: &'static str = "SELECT COUNT(*) FROM internal_transactions
        WHERE contract_address = ?1 AND block_number BETWEEN ?2 AND ?3";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, event: &InternalTransaction) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_INTERNAL_TX,
            params![
                key(&event.transaction_hash),
                event.log_index,
                key(&event.contract_address),
                key(&event.from_address),
                key(&event.to_address),
                event.value.to_string(),
                event.token_id.map(|id| id.to_string()),
                event.block_number,
                event.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_batch(&self, events: &[InternalTransaction]) -> Result<usize> {
        for event in events {
            self.upsert(event)?;
        }
        Ok(events.len())
    }

    pub fn count_for_contract(&self, contract: &Address) -> Result<u64> {
        Ok(self
            .conn
            .query_row(Self::COUNT_FOR_CONTRACT, params![key(contract)], |row| {
                row.get(0)
            })?)
    }

    /// Stored events of `contract` inside the inclusive block range.
    pub fn count_for_contract_in_range(
        &self,
        contract: &Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<u64> {
        Ok(self.conn.query_row(
            Self::COUNT_FOR_CONTRACT_IN_RANGE,
            params![key(contract), from_block, to_block],
            |row| row.get(0),
        )?)
    }

    /// Transfers of `contract`, newest first.
    pub fn for_contract(
        &self,
        contract: &Address,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<InternalTransaction>> {
        let query = format!(
            "SELECT {} FROM internal_transactions WHERE contract_address = ?1
             ORDER BY block_number DESC, log_index DESC
             LIMIT ?2 OFFSET ?3",
            InternalTransaction::COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let events = stmt
            .query_map(
                params![key(contract), clamp_limit(limit), skip],
                InternalTransaction::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}
