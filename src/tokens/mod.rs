//! Periodic refresh of active addresses: balances, classification, token
//! metadata, decoded transfers and holder balances.

pub mod metadata;
pub mod transfers;

use crate::chain::ChainSource;
use crate::classifier::ClassifierCache;
use crate::config::Config;
use crate::deployment::find_deployment_block;
use crate::events::TokenTransfer;
use crate::repository::{
    ActivityRepository, AddressRecord, AddressRepository, AddressSubset, BlockRepository, Database,
    HolderRepository, InternalTransaction, InternalTransactionRepository, MISSING, TokenHolder,
    TransactionRepository,
};
use crate::retry::sleep_or_cancel;
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use transfers::scan_transfers;

/// Active addresses handled per store round-trip.
const ACTIVE_BATCH_SIZE: usize = 500;

/// Native balances are rendered with ether's 18 decimals.
const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterSettings {
    pub log_window_size: u64,
    pub log_fetch_retries: usize,
    pub holder_refresh_concurrency: usize,
}

impl From<&Config> for UpdaterSettings {
    fn from(config: &Config) -> Self {
        Self {
            log_window_size: config.log_window_size,
            log_fetch_retries: config.log_fetch_retries,
            holder_refresh_concurrency: config.holder_refresh_concurrency.max(1),
        }
    }
}

/// What a single `update_address` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressUpdate {
    pub is_contract: bool,
    pub is_token: bool,
    pub scanned_from: Option<u64>,
    pub events_found: usize,
    pub events_imported: usize,
    pub holders_refreshed: usize,
    pub head: u64,
}

pub struct TokenUpdater<C> {
    chain: Arc<C>,
    db: Database,
    classifier: Arc<ClassifierCache>,
    settings: UpdaterSettings,
}

impl<C: ChainSource> TokenUpdater<C> {
    pub fn new(
        chain: Arc<C>,
        db: Database,
        classifier: Arc<ClassifierCache>,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            chain,
            db,
            classifier,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Refreshes `subset` every `interval` until cancelled.
    pub async fn run(
        &self,
        subset: AddressSubset,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!("Token updater for {:?} addresses started", subset);

        while !cancel.is_cancelled() {
            match self.run_once(subset, &cancel).await {
                Ok(0) => debug!("No {:?} addresses touched since last run", subset),
                Ok(updated) => info!("Refreshed {} {:?} address(es)", updated, subset),
                Err(e) => warn!("Token updater run for {:?} failed: {:#}", subset, e),
            }

            if !sleep_or_cancel(&cancel, interval).await {
                break;
            }
        }

        info!("Token updater for {:?} addresses stopped", subset);
        Ok(())
    }

    /// Walks every address of `subset` touched after the persisted
    /// watermark, advancing it address by address. The pass stops at the
    /// first failing address and leaves the watermark just before it, so
    /// the next pass starts again from that address.
    pub async fn run_once(
        &self,
        subset: AddressSubset,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let key = subset.watermark_key();
        let mut watermark = self
            .db
            .with(|conn| ActivityRepository::new(conn).get_watermark(key))?;
        let mut processed = 0;

        loop {
            let batch = self.db.with(|conn| {
                ActivityRepository::new(conn).touched_since(subset, watermark, ACTIVE_BATCH_SIZE)
            })?;
            if batch.is_empty() {
                break;
            }

            for active in batch {
                if cancel.is_cancelled() {
                    return Ok(processed);
                }
                self.update_address(active.address, cancel)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to update address {:?} after {} refreshed",
                            active.address, processed
                        )
                    })?;
                watermark = active.touched_at;
                processed += 1;
                self.db.with(|conn| {
                    ActivityRepository::new(conn).set_watermark(key, watermark)
                })?;
            }
        }

        Ok(processed)
    }

    /// Brings the stored record of `address` up to the current head.
    ///
    /// When the transfer scan fails, the balance, classification and
    /// metadata are still stored but `last_updated_block` keeps its old
    /// value, so the next call rescans the same range.
    pub async fn update_address(
        &self,
        address: Address,
        cancel: &CancellationToken,
    ) -> Result<AddressUpdate> {
        let head = self.chain.latest_block_number().await?;
        let balance = self
            .chain
            .pending_balance(address)
            .await
            .context("Failed to fetch balance")?;
        let code = self
            .chain
            .code_at(address)
            .await
            .context("Failed to fetch code")?;

        let mut record = self
            .db
            .with(|conn| AddressRepository::new(conn).get(&address))?
            .unwrap_or_else(|| AddressRecord::new(address));
        let mut update = AddressUpdate {
            head,
            ..AddressUpdate::default()
        };

        record.balance_wei = balance;
        record.balance_display =
            format_units(balance, NATIVE_DECIMALS).unwrap_or_else(|_| balance.to_string());
        record.balance_float = record.balance_display.parse().unwrap_or(0.0);

        let refreshed = if code.is_empty() {
            record.is_contract = false;
            record.bytecode = None;
            record.standards.clear();
            record.functions.clear();
            Ok(())
        } else {
            update.is_contract = true;
            self.refresh_contract(&mut record, &code.to_string(), head, cancel, &mut update)
                .await
        };

        if refreshed.is_ok() {
            record.last_updated_block = Some(head);
        }
        self.db
            .with(|conn| AddressRepository::new(conn).upsert(&record))?;
        refreshed?;

        debug!("Updated address {:?} at head {}", address, head);
        Ok(update)
    }

    async fn refresh_contract(
        &self,
        record: &mut AddressRecord,
        bytecode: &str,
        head: u64,
        cancel: &CancellationToken,
        update: &mut AddressUpdate,
    ) -> Result<()> {
        let address = record.address;
        let classification = self.classifier.classify(bytecode);

        record.is_contract = true;
        record.bytecode = Some(bytecode.to_string());
        record.standards = classification.standards.iter().map(|s| s.to_string()).collect();
        record.functions = classification.functions.iter().map(|s| s.to_string()).collect();

        if classification.is_upgradeable_proxy() {
            record.proxy_target = metadata::proxy_target(self.chain.as_ref(), address).await;
        }
        if classification.has_owner() {
            record.owner = metadata::owner(self.chain.as_ref(), address).await;
        }

        if !classification.is_token() {
            return Ok(());
        }
        update.is_token = true;

        let details = metadata::token_details(self.chain.as_ref(), address).await;
        record.token_name = Some(details.name);
        record.token_symbol = Some(details.symbol);
        record.token_decimals = Some(details.decimals);
        record.token_total_supply = Some(details.total_supply.to_string());

        let start = self.scan_start(record, head).await?;
        if start <= head {
            update.scanned_from = Some(start);
            self.sync_transfers(record, start, head, cancel, update)
                .await?;
        }

        let (holders, events) = self.db.with(|conn| {
            Ok((
                HolderRepository::new(conn).count_for_contract(&address)?,
                InternalTransactionRepository::new(conn).count_for_contract(&address)?,
            ))
        })?;
        record.holder_count = holders;
        record.internal_tx_count = events;
        Ok(())
    }

    /// First block to scan: after the watermark, else the stored creation
    /// block, else a deployment search upstream.
    async fn scan_start(&self, record: &AddressRecord, head: u64) -> Result<u64> {
        if let Some(last) = record.last_updated_block {
            return Ok(last + 1);
        }
        let address = record.address;
        let created = self
            .db
            .with(|conn| TransactionRepository::new(conn).creation_block(&address))?;
        match created {
            Some(block) => Ok(block),
            None => find_deployment_block(self.chain.as_ref(), address, head).await,
        }
    }

    async fn sync_transfers(
        &self,
        record: &AddressRecord,
        start: u64,
        head: u64,
        cancel: &CancellationToken,
        update: &mut AddressUpdate,
    ) -> Result<()> {
        let address = record.address;
        let scan = scan_transfers(
            self.chain.as_ref(),
            cancel,
            address,
            start,
            head,
            self.settings.log_window_size,
            self.settings.log_fetch_retries,
        )
        .await?;
        update.events_found = scan.events.len();

        let stored = self.db.with(|conn| {
            InternalTransactionRepository::new(conn).count_for_contract_in_range(
                &address, start, head,
            )
        })?;
        if stored == scan.events.len() as u64 {
            debug!(
                "{:?}: {} transfer(s) in {}-{} already stored",
                address, stored, start, head
            );
            return Ok(());
        }

        info!(
            "{:?}: importing {} transfer(s) in blocks {}-{} ({} stored)",
            address,
            scan.events.len(),
            start,
            head,
            stored
        );
        let events = self.to_internal_transactions(&scan.events)?;
        self.db.with(|conn| {
            let db_tx = conn.unchecked_transaction()?;
            InternalTransactionRepository::new(&db_tx).upsert_batch(&events)?;
            db_tx.commit()?;
            Ok(())
        })?;
        update.events_imported = events.len();

        let participants: BTreeSet<Address> = scan.participants().into_iter().collect();
        update.holders_refreshed = self.refresh_holders(record, participants).await?;
        Ok(())
    }

    fn to_internal_transactions(&self, events: &[TokenTransfer]) -> Result<Vec<InternalTransaction>> {
        let block_numbers: BTreeSet<u64> = events.iter().map(|e| e.block_number).collect();
        let timestamps: HashMap<u64, u64> = self.db.with(|conn| {
            let repo = BlockRepository::new(conn);
            let mut found = HashMap::new();
            for number in block_numbers {
                if let Some(block) = repo.get_by_number(number)? {
                    found.insert(number, block.timestamp);
                }
            }
            Ok(found)
        })?;

        Ok(events
            .iter()
            .map(|event| InternalTransaction {
                transaction_hash: event.transaction_hash,
                log_index: event.log_index,
                contract_address: event.contract_address,
                from_address: event.from,
                to_address: event.to,
                value: event.amount(),
                token_id: event.token_id(),
                block_number: event.block_number,
                timestamp: timestamps.get(&event.block_number).copied(),
            })
            .collect())
    }

    /// Re-reads `balanceOf` for every participant. A failed query keeps the
    /// stored balance, or records zero for a holder seen for the first time.
    async fn refresh_holders(
        &self,
        record: &AddressRecord,
        participants: BTreeSet<Address>,
    ) -> Result<usize> {
        let contract = record.address;
        let balances: Vec<(Address, Result<U256>)> = stream::iter(participants)
            .map(|holder| {
                let chain = Arc::clone(&self.chain);
                async move {
                    let balance = metadata::balance_of(chain.as_ref(), contract, holder).await;
                    (holder, balance)
                }
            })
            .buffer_unordered(self.settings.holder_refresh_concurrency)
            .collect()
            .await;

        let decimals = record.token_decimals.unwrap_or(0);
        let token_name = record.token_name.clone().unwrap_or_else(|| MISSING.to_string());
        let token_symbol = record
            .token_symbol
            .clone()
            .unwrap_or_else(|| MISSING.to_string());

        self.db.with(|conn| {
            let repo = HolderRepository::new(conn);
            for (holder, balance) in &balances {
                let balance = match balance {
                    Ok(balance) => *balance,
                    Err(e) => {
                        warn!(
                            "balanceOf({:?}) on {:?} failed, keeping stored balance: {}",
                            holder, contract, e
                        );
                        repo.get(&contract, holder)?
                            .map(|stored| stored.balance)
                            .unwrap_or_default()
                    }
                };
                repo.upsert(&TokenHolder {
                    contract_address: contract,
                    holder_address: *holder,
                    balance,
                    balance_scaled: format_units(balance, decimals)
                        .unwrap_or_else(|_| balance.to_string()),
                    token_name: token_name.clone(),
                    token_symbol: token_symbol.clone(),
                })?;
            }
            Ok(())
        })?;

        Ok(balances.len())
    }
}
