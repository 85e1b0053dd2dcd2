//! Keeps stored blocks and transactions aligned with upstream.
//!
//! [`ChainSyncer`] owns the import path and the local consistency checks.
//! The head listener and the backfill sweep are thin loops around it.

pub mod backfill;
pub mod consistency;
pub mod listener;

use crate::chain::{ChainBlock, ChainSource};
use crate::repository::{
    ActivityRepository, Block, BlockRepository, Database, Transaction, TransactionRepository,
};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use backfill::Backfill;
pub use listener::HeadListener;

/// Upstream reported no block where one was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockNotFound(pub u64);

impl fmt::Display for BlockNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} not found upstream", self.0)
    }
}

impl std::error::Error for BlockNotFound {}

pub struct ChainSyncer<C> {
    chain: Arc<C>,
    db: Database,
}

impl<C: ChainSource> ChainSyncer<C> {
    pub fn new(chain: Arc<C>, db: Database) -> Self {
        Self { chain, db }
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Stores `raw` and its transactions, replacing whatever was stored
    /// under the same block number.
    ///
    /// Receipts are fetched only for contract creations, to learn the
    /// created address and status. Every address the block touches is
    /// marked active for the token updater.
    pub async fn import_block(&self, raw: &ChainBlock) -> Result<Block> {
        let mut receipts = HashMap::new();
        for tx in raw.transactions.iter().filter(|tx| tx.to.is_none()) {
            if let Some(receipt) = self.chain.transaction_receipt(tx.hash).await? {
                receipts.insert(tx.hash, receipt);
            }
        }

        let block = Block {
            number: raw.number,
            hash: raw.hash,
            parent_hash: raw.parent_hash,
            miner: raw.miner,
            gas_used: raw.gas_used,
            gas_limit: raw.gas_limit,
            base_fee_per_gas: raw.base_fee_per_gas,
            tx_count: raw.transactions.len() as u64,
            extra_data: raw.extra_data.to_string(),
            timestamp: raw.timestamp,
            burned_fees: Some(
                U256::from(raw.base_fee_per_gas.unwrap_or_default()) * U256::from(raw.gas_used),
            ),
            cumulative_fees_burned: None,
        };

        let mut active: Vec<(Address, bool)> = vec![(raw.miner, false)];
        let transactions: Vec<Transaction> = raw
            .transactions
            .iter()
            .map(|tx| {
                let receipt = receipts.get(&tx.hash);
                let contract_address = receipt.and_then(|r| r.contract_address);
                let gas_price = U256::from(tx.gas_price);
                let gas_fee = match receipt {
                    Some(r) => gas_price * U256::from(r.gas_used),
                    None => gas_price * U256::from(tx.gas_limit),
                };

                active.push((tx.from, false));
                if let Some(to) = tx.to {
                    active.push((to, !tx.input.is_empty()));
                }
                if let Some(created) = contract_address {
                    active.push((created, true));
                }

                Transaction {
                    hash: tx.hash,
                    block_number: raw.number,
                    block_hash: raw.hash,
                    from_address: tx.from,
                    to_address: tx.to,
                    contract_address,
                    status: receipt.map(|r| r.status),
                    value: tx.value,
                    gas_price,
                    gas_limit: tx.gas_limit,
                    gas_fee,
                    nonce: tx.nonce,
                    timestamp: raw.timestamp,
                    input: tx.input.to_string(),
                    input_empty: tx.input.is_empty(),
                }
            })
            .collect();

        let now = crate::unix_now_millis();
        self.db.with(|conn| {
            let db_tx = conn.unchecked_transaction()?;
            BlockRepository::new(&db_tx).upsert(&block)?;
            let tx_repo = TransactionRepository::new(&db_tx);
            tx_repo.delete_for_block(block.number)?;
            for tx in &transactions {
                tx_repo.upsert(tx)?;
            }
            let activity = ActivityRepository::new(&db_tx);
            for (address, contract_hint) in &active {
                activity.touch(address, *contract_hint, now)?;
            }
            db_tx.commit()?;
            Ok(())
        })?;

        debug!(
            "Imported block {} ({:?}) with {} transactions",
            block.number, block.hash, block.tx_count
        );
        Ok(block)
    }

    /// Fetches block `number` upstream and imports it. `None` when upstream
    /// does not have it.
    pub async fn fetch_and_import(&self, number: u64) -> Result<Option<Block>> {
        match self.chain.block_by_number(number).await? {
            Some(raw) => Ok(Some(self.import_block(&raw).await?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_and_import_by_hash(&self, hash: B256) -> Result<Option<Block>> {
        match self.chain.block_by_hash(hash).await? {
            Some(raw) => Ok(Some(self.import_block(&raw).await?)),
            None => Ok(None),
        }
    }

    pub fn stored_block(&self, number: u64) -> Result<Option<Block>> {
        self.db
            .with(|conn| BlockRepository::new(conn).get_by_number(number))
    }

    pub fn block_exists(&self, number: u64) -> Result<bool> {
        self.db.with(|conn| BlockRepository::new(conn).exists(number))
    }
}
