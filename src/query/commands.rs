use crate::admin::{self, BlockRef};
use crate::chain::ChainSource;
use crate::query::formatters::{
    OutputFormat, format_address, format_block, format_holders, format_internal_transactions,
    format_rich_list, format_stats, format_transaction, format_transactions,
};
use crate::repository::{
    AddressRepository, BlockRepository, Database, HolderRepository,
    InternalTransactionRepository, StatsRepository, TransactionRepository,
};
use crate::syncer::ChainSyncer;
use crate::tokens::TokenUpdater;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

pub fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address.trim())
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}

pub fn parse_hash(hash: &str) -> Result<B256> {
    B256::from_str(hash.trim()).map_err(|_| anyhow::anyhow!("Invalid hash format: {}", hash))
}

pub fn cmd_block(db: &Database, block: &str, with_txs: bool, format: &OutputFormat) -> Result<()> {
    let block_ref = BlockRef::from_str(block)?;
    let (stored, transactions) = db.with(|conn| {
        let repo = BlockRepository::new(conn);
        let stored = match block_ref {
            BlockRef::Number(number) => repo.get_by_number(number)?,
            BlockRef::Hash(hash) => repo.get_by_hash(&hash)?,
        };
        let transactions = match (&stored, with_txs) {
            (Some(block), true) => TransactionRepository::new(conn).for_block(block.number)?,
            _ => Vec::new(),
        };
        Ok((stored, transactions))
    })?;

    let block = stored.ok_or_else(|| anyhow::anyhow!("Block {} is not stored", block))?;
    println!("{}", format_block(&block, format));
    if with_txs {
        println!("{}", format_transactions(&transactions, format));
    }

    Ok(())
}

pub fn cmd_tx(db: &Database, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = parse_hash(hash)?;
    let tx = db
        .with(|conn| TransactionRepository::new(conn).get_by_hash(&hash))?
        .ok_or_else(|| anyhow::anyhow!("Transaction {:?} is not stored", hash))?;
    println!("{}", format_transaction(&tx, format));

    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AddressQuery {
    pub address: String,
    pub from_timestamp: Option<u64>,
    pub to_timestamp: Option<u64>,
    pub skip: usize,
    pub limit: usize,
}

pub fn cmd_address(db: &Database, query: AddressQuery, format: &OutputFormat) -> Result<()> {
    let address = parse_address(&query.address)?;
    let (record, transactions) = db.with(|conn| {
        Ok((
            AddressRepository::new(conn).get(&address)?,
            TransactionRepository::new(conn).for_address(
                &address,
                query.from_timestamp,
                query.to_timestamp,
                query.skip,
                query.limit,
            )?,
        ))
    })?;

    match record {
        Some(record) => println!("{}", format_address(&record, format)),
        None => println!("Address {address:?} has not been refreshed yet."),
    }
    println!("{}", format_transactions(&transactions, format));

    Ok(())
}

pub fn cmd_holders(db: &Database, contract: &str, page: Page, format: &OutputFormat) -> Result<()> {
    let contract = parse_address(contract)?;
    let holders = db.with(|conn| {
        HolderRepository::new(conn).for_contract(&contract, page.skip, page.limit)
    })?;
    println!("{}", format_holders(&holders, page.skip, format));

    Ok(())
}

pub fn cmd_transfers(
    db: &Database,
    contract: &str,
    page: Page,
    format: &OutputFormat,
) -> Result<()> {
    let contract = parse_address(contract)?;
    let (record, events) = db.with(|conn| {
        Ok((
            AddressRepository::new(conn).get(&contract)?,
            InternalTransactionRepository::new(conn).for_contract(
                &contract,
                page.skip,
                page.limit,
            )?,
        ))
    })?;

    let decimals = record.and_then(|r| r.token_decimals);
    println!("{}", format_internal_transactions(&events, decimals, format));

    Ok(())
}

pub fn cmd_rich_list(db: &Database, page: Page, format: &OutputFormat) -> Result<()> {
    let records = db.with(|conn| AddressRepository::new(conn).rich_list(page.skip, page.limit))?;
    println!("{}", format_rich_list(&records, page.skip, format));

    Ok(())
}

pub fn cmd_stats(db: &Database, format: &OutputFormat) -> Result<()> {
    let snapshot = db.with(|conn| StatsRepository::new(conn).latest())?;
    println!("{}", format_stats(snapshot.as_ref(), format));

    Ok(())
}

pub async fn cmd_reimport_block<C: ChainSource>(
    syncer: &ChainSyncer<C>,
    block: &str,
    format: &OutputFormat,
) -> Result<()> {
    let block = admin::reimport_block(syncer, BlockRef::from_str(block)?).await?;
    println!("{}", format_block(&block, format));

    Ok(())
}

pub async fn cmd_reimport_tx<C: ChainSource>(
    syncer: &ChainSyncer<C>,
    hash: &str,
    format: &OutputFormat,
) -> Result<()> {
    let block = admin::reimport_transaction(syncer, parse_hash(hash)?).await?;
    println!("{}", format_block(&block, format));

    Ok(())
}

pub async fn cmd_reimport_contract<C: ChainSource>(
    updater: &TokenUpdater<C>,
    address: &str,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;
    let update = admin::reimport_contract(updater, address, &CancellationToken::new()).await?;
    println!(
        "Rescanned {:?} up to block {}: {} transfer(s) found, {} imported, {} holder(s) refreshed",
        address,
        update.head,
        update.events_found,
        update.events_imported,
        update.holders_refreshed
    );

    if let Some(record) = updater
        .db()
        .with(|conn| AddressRepository::new(conn).get(&address))?
    {
        println!("{}", format_address(&record, format));
    }

    Ok(())
}
