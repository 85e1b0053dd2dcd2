//! Operator-triggered delete-and-reimport.

use crate::chain::ChainSource;
use crate::repository::{AddressRepository, Block, BlockRepository, TransactionRepository};
use crate::syncer::{BlockNotFound, ChainSyncer};
use crate::tokens::{AddressUpdate, TokenUpdater};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A block given either by number or by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Hash(B256),
}

impl FromStr for BlockRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0x") && s.len() == 66 {
            let hash = B256::from_str(s).with_context(|| format!("Invalid block hash: {s}"))?;
            return Ok(BlockRef::Hash(hash));
        }
        let number = s
            .parse::<u64>()
            .with_context(|| format!("Invalid block number or hash: {s}"))?;
        Ok(BlockRef::Number(number))
    }
}

/// Deletes the block and its transactions, then imports it again from
/// upstream.
pub async fn reimport_block<C: ChainSource>(
    syncer: &ChainSyncer<C>,
    block: BlockRef,
) -> Result<Block> {
    let number = match block {
        BlockRef::Number(number) => number,
        BlockRef::Hash(hash) => {
            let stored = syncer
                .db()
                .with(|conn| BlockRepository::new(conn).get_by_hash(&hash))?;
            match stored {
                Some(block) => block.number,
                None => {
                    syncer
                        .chain()
                        .block_by_hash(hash)
                        .await?
                        .with_context(|| format!("Block {hash:?} not found upstream"))?
                        .number
                }
            }
        }
    };

    let (blocks, transactions) = syncer.db().with(|conn| {
        let db_tx = conn.unchecked_transaction()?;
        let transactions = TransactionRepository::new(&db_tx).delete_for_block(number)?;
        let blocks = BlockRepository::new(&db_tx).delete(number)?;
        db_tx.commit()?;
        Ok((blocks, transactions))
    })?;
    info!(
        "Deleted block {} ({} block row(s), {} transaction(s)), reimporting",
        number, blocks, transactions
    );

    let imported = syncer
        .fetch_and_import(number)
        .await?
        .ok_or(BlockNotFound(number))?;
    info!(
        "Reimported block {} ({:?}) with {} transactions",
        imported.number, imported.hash, imported.tx_count
    );
    Ok(imported)
}

/// Reimports the block holding the stored transaction `hash`.
pub async fn reimport_transaction<C: ChainSource>(
    syncer: &ChainSyncer<C>,
    hash: B256,
) -> Result<Block> {
    let tx = syncer
        .db()
        .with(|conn| TransactionRepository::new(conn).get_by_hash(&hash))?
        .with_context(|| format!("Transaction {hash:?} is not stored"))?;
    reimport_block(syncer, BlockRef::Number(tx.block_number)).await
}

/// Drops the transfer watermark of `address` and refreshes it, rescanning
/// transfers from its deployment.
pub async fn reimport_contract<C: ChainSource>(
    updater: &TokenUpdater<C>,
    address: Address,
    cancel: &CancellationToken,
) -> Result<AddressUpdate> {
    let cleared = updater
        .db()
        .with(|conn| AddressRepository::new(conn).clear_watermark(&address))?;
    if cleared == 0 {
        info!("{:?} was not stored yet, running a first update", address);
    }
    updater.update_address(address, cancel).await
}
