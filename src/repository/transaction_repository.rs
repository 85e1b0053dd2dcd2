use super::models::{Transaction, clamp_limit, key};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::{OptionalExtension, ToSql, params, params_from_iter};

pub struct TransactionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransactionRepository<'a> {
    const UPSERT_TRANSACTION: &'static str = "INSERT INTO transactions (
            hash, block_number, block_hash, from_address, to_address, contract_address,
            status, value, gas_price, gas_limit, gas_fee, nonce, timestamp, input, input_empty
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(hash) DO UPDATE SET
            block_number = excluded.block_number,
            block_hash = excluded.block_hash,
            from_address = excluded.from_address,
            to_address = excluded.to_address,
            contract_address = excluded.contract_address,
            status = excluded.status,
            value = excluded.value,
            gas_price = excluded.gas_price,
            gas_limit = excluded.gas_limit,
            gas_fee = excluded.gas_fee,
            nonce = excluded.nonce,
            timestamp = excluded.timestamp,
            input = excluded.input,
            input_empty = excluded.input_empty";

    const DELETE_FOR_BLOCK: &'static str = "DELETE FROM transactions WHERE block_number = ?1";

    const COUNT_FOR_BLOCK: &'static str =
        "SELECT COUNT(*) FROM transactions WHERE block_number = ?1";

    const COUNT_SINCE: &'static str = "SELECT COUNT(*) FROM transactions WHERE timestamp >= ?1";

    const CREATION_BLOCK: &'static str =
        "SELECT MIN(block_number) FROM transactions WHERE contract_address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, tx: &Transaction) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TRANSACTION,
            params![
                key(&tx.hash),
                tx.block_number,
                key(&tx.block_hash),
                key(&tx.from_address),
                tx.to_address.as_ref().map(key),
                tx.contract_address.as_ref().map(key),
                tx.status,
                tx.value.to_string(),
                tx.gas_price.to_string(),
                tx.gas_limit,
                tx.gas_fee.to_string(),
                tx.nonce,
                tx.timestamp,
                tx.input,
                tx.input_empty,
            ],
        )?;
        Ok(())
    }

    pub fn delete_for_block(&self, block_number: u64) -> Result<usize> {
        Ok(self
            .conn
            .execute(Self::DELETE_FOR_BLOCK, params![block_number])?)
    }

    pub fn count_for_block(&self, block_number: u64) -> Result<u64> {
        Ok(self
            .conn
            .query_row(Self::COUNT_FOR_BLOCK, params![block_number], |row| {
                row.get(0)
            })?)
    }

    /// Transactions with `timestamp >= since`; `since = 0` counts everything.
    pub fn count_since(&self, since: u64) -> Result<u64> {
        Ok(self
            .conn
            .query_row(Self::COUNT_SINCE, params![since], |row| row.get(0))?)
    }

    /// Block of the transaction that deployed `contract`, if it was stored.
    pub fn creation_block(&self, contract: &Address) -> Result<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::CREATION_BLOCK, params![key(contract)], |row| {
                row.get(0)
            })?)
    }

    pub fn get_by_hash(&self, hash: &B256) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE hash = ?1",
            Transaction::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&query, params![key(hash)], Transaction::from_row)
            .optional()?)
    }

    pub fn for_block(&self, block_number: u64) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE block_number = ?1 ORDER BY hash",
            Transaction::COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let txs = stmt
            .query_map(params![block_number], Transaction::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Transactions sent from, sent to, or creating `address`, newest first,
    /// optionally bounded by block timestamp.
    pub fn for_address(
        &self,
        address: &Address,
        from_timestamp: Option<u64>,
        to_timestamp: Option<u64>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let address_str = key(address);
        let mut conditions =
            vec!["(from_address = ? OR to_address = ? OR contract_address = ?)"];
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(address_str.clone()),
            Box::new(address_str.clone()),
            Box::new(address_str),
        ];

        if let Some(from) = from_timestamp {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from));
        }
        if let Some(to) = to_timestamp {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to));
        }

        let query = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY block_number DESC, hash LIMIT {} OFFSET {}",
            Transaction::COLUMNS,
            conditions.join(" AND "),
            clamp_limit(limit),
            skip
        );

        let mut stmt = self.conn.prepare(&query)?;
        let txs = stmt
            .query_map(params_from_iter(params), Transaction::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use alloy_primitives::U256;

    fn tx(hash: u8, block_number: u64, from: u8, to: Option<u8>) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(hash),
            block_number,
            block_hash: B256::repeat_byte(0xbb),
            from_address: Address::repeat_byte(from),
            to_address: to.map(Address::repeat_byte),
            contract_address: None,
            status: None,
            value: U256::from(10u64),
            gas_price: U256::from(2u64),
            gas_limit: 21_000,
            gas_fee: U256::from(42_000u64),
            nonce: hash as u64,
            timestamp: 1_000 + block_number,
            input: "0x".to_string(),
            input_empty: true,
        }
    }

    #[test]
    fn counts_and_deletes_per_block() {
        let db = Database::new(":memory:").unwrap();
        db.with(|conn| {
            let repo = TransactionRepository::new(conn);
            repo.upsert(&tx(1, 10, 0xa1, Some(0xb1)))?;
            repo.upsert(&tx(2, 10, 0xa1, Some(0xb2)))?;
            repo.upsert(&tx(3, 11, 0xa2, None))?;

            assert_eq!(repo.count_for_block(10)?, 2);
            assert_eq!(repo.delete_for_block(10)?, 2);
            assert_eq!(repo.count_for_block(10)?, 0);
            assert_eq!(repo.count_for_block(11)?, 1);
            assert_eq!(repo.count_since(0)?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn address_history_filters_by_time_and_paginates() {
        let db = Database::new(":memory:").unwrap();
        db.with(|conn| {
            let repo = TransactionRepository::new(conn);
            for n in 1..=5u8 {
                repo.upsert(&tx(n, n as u64, 0xa1, Some(0xb1)))?;
            }
            repo.upsert(&tx(9, 3, 0xcc, Some(0xdd)))?;

            let who = Address::repeat_byte(0xb1);
            let all = repo.for_address(&who, None, None, 0, 100)?;
            assert_eq!(all.len(), 5);
            assert_eq!(all[0].block_number, 5);

            let windowed = repo.for_address(&who, Some(1_002), Some(1_004), 0, 100)?;
            let blocks: Vec<u64> = windowed.iter().map(|t| t.block_number).collect();
            assert_eq!(blocks, vec![4, 3, 2]);

            let page = repo.for_address(&who, None, None, 1, 2)?;
            assert_eq!(page.len(), 2);
            assert_eq!(page[0].block_number, 4);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn finds_creation_block() {
        let db = Database::new(":memory:").unwrap();
        db.with(|conn| {
            let repo = TransactionRepository::new(conn);
            let contract = Address::repeat_byte(0xcc);
            let mut creation = tx(7, 77, 0xa1, None);
            creation.contract_address = Some(contract);
            creation.status = Some(true);
            repo.upsert(&creation)?;

            assert_eq!(repo.creation_block(&contract)?, Some(77));
            assert_eq!(repo.creation_block(&Address::repeat_byte(0x01))?, None);
            assert_eq!(repo.get_by_hash(&B256::repeat_byte(7))?, Some(creation));
            Ok(())
        })
        .unwrap();
    }
}
