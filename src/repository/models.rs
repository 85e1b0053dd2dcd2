use alloy_primitives::{Address, B256, U256};
use rusqlite::Row;
use serde::Serialize;
use std::str::FromStr;

/// Largest page any read accessor hands out.
pub const MAX_PAGE_SIZE: usize = 500;

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// Placeholder for token metadata an accessor could not provide.
pub const MISSING: &str = "MISSING";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub miner: Address,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub tx_count: u64,
    pub extra_data: String,
    pub timestamp: u64,
    pub burned_fees: Option<U256>,
    pub cumulative_fees_burned: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    pub from_address: Address,
    pub to_address: Option<Address>,
    pub contract_address: Option<Address>,
    pub status: Option<bool>,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub gas_fee: U256,
    pub nonce: u64,
    pub timestamp: u64,
    pub input: String,
    pub input_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressRecord {
    pub address: Address,
    pub balance_wei: U256,
    pub balance_float: f64,
    pub balance_display: String,
    pub is_contract: bool,
    pub bytecode: Option<String>,
    pub standards: Vec<String>,
    pub functions: Vec<String>,
    pub proxy_target: Option<Address>,
    pub owner: Option<Address>,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub token_decimals: Option<u8>,
    pub token_total_supply: Option<String>,
    pub holder_count: u64,
    pub internal_tx_count: u64,
    pub last_updated_block: Option<u64>,
}

impl AddressRecord {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance_wei: U256::ZERO,
            balance_float: 0.0,
            balance_display: "0".to_string(),
            is_contract: false,
            bytecode: None,
            standards: Vec::new(),
            functions: Vec::new(),
            proxy_target: None,
            owner: None,
            token_name: None,
            token_symbol: None,
            token_decimals: None,
            token_total_supply: None,
            holder_count: 0,
            internal_tx_count: 0,
            last_updated_block: None,
        }
    }

    pub fn is_token(&self) -> bool {
        self.token_name.is_some() || self.token_symbol.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenHolder {
    pub contract_address: Address,
    pub holder_address: Address,
    pub balance: U256,
    pub balance_scaled: String,
    pub token_name: String,
    pub token_symbol: String,
}

/// A decoded Transfer event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InternalTransaction {
    pub transaction_hash: B256,
    pub log_index: u64,
    pub contract_address: Address,
    pub from_address: Address,
    pub to_address: Address,
    pub value: U256,
    pub token_id: Option<U256>,
    pub block_number: u64,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_txs: u64,
    pub weekly_txs: u64,
    pub daily_txs: u64,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAddress {
    pub address: Address,
    pub contract_hint: bool,
    pub touched_at: u64,
}

pub(crate) fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_optional_column<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        T::from_str(&value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    })
    .transpose()
}

pub(crate) fn parse_json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Storage form of hashes and addresses: lowercase 0x-prefixed hex.
pub(crate) fn key<T: std::fmt::Debug>(value: &T) -> String {
    format!("{value:?}")
}

impl Block {
    pub(crate) const COLUMNS: &'static str = "number, hash, parent_hash, miner, gas_used, \
        gas_limit, base_fee_per_gas, tx_count, extra_data, timestamp, burned_fees, \
        cumulative_fees_burned";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Block {
            number: row.get(0)?,
            hash: parse_column(row, 1)?,
            parent_hash: parse_column(row, 2)?,
            miner: parse_column(row, 3)?,
            gas_used: row.get(4)?,
            gas_limit: row.get(5)?,
            base_fee_per_gas: row.get(6)?,
            tx_count: row.get(7)?,
            extra_data: row.get(8)?,
            timestamp: row.get(9)?,
            burned_fees: parse_optional_column(row, 10)?,
            cumulative_fees_burned: parse_optional_column(row, 11)?,
        })
    }
}

impl Transaction {
    pub(crate) const COLUMNS: &'static str = "hash, block_number, block_hash, from_address, \
        to_address, contract_address, status, value, gas_price, gas_limit, gas_fee, nonce, \
        timestamp, input, input_empty";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            hash: parse_column(row, 0)?,
            block_number: row.get(1)?,
            block_hash: parse_column(row, 2)?,
            from_address: parse_column(row, 3)?,
            to_address: parse_optional_column(row, 4)?,
            contract_address: parse_optional_column(row, 5)?,
            status: row.get(6)?,
            value: parse_column(row, 7)?,
            gas_price: parse_column(row, 8)?,
            gas_limit: row.get(9)?,
            gas_fee: parse_column(row, 10)?,
            nonce: row.get(11)?,
            timestamp: row.get(12)?,
            input: row.get(13)?,
            input_empty: row.get(14)?,
        })
    }
}

impl AddressRecord {
    pub(crate) const COLUMNS: &'static str = "address, balance_wei, balance_float, \
        balance_display, is_contract, bytecode, standards, functions, proxy_target, owner, \
        token_name, token_symbol, token_decimals, token_total_supply, holder_count, \
        internal_tx_count, last_updated_block";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AddressRecord {
            address: parse_column(row, 0)?,
            balance_wei: parse_column(row, 1)?,
            balance_float: row.get(2)?,
            balance_display: row.get(3)?,
            is_contract: row.get(4)?,
            bytecode: row.get(5)?,
            standards: parse_json_list(row, 6)?,
            functions: parse_json_list(row, 7)?,
            proxy_target: parse_optional_column(row, 8)?,
            owner: parse_optional_column(row, 9)?,
            token_name: row.get(10)?,
            token_symbol: row.get(11)?,
            token_decimals: row.get(12)?,
            token_total_supply: row.get(13)?,
            holder_count: row.get(14)?,
            internal_tx_count: row.get(15)?,
            last_updated_block: row.get(16)?,
        })
    }
}

impl TokenHolder {
    pub(crate) const COLUMNS: &'static str = "contract_address, holder_address, balance, \
        balance_scaled, token_name, token_symbol";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TokenHolder {
            contract_address: parse_column(row, 0)?,
            holder_address: parse_column(row, 1)?,
            balance: parse_column(row, 2)?,
            balance_scaled: row.get(3)?,
            token_name: row.get(4)?,
            token_symbol: row.get(5)?,
        })
    }
}

impl InternalTransaction {
    pub(crate) const COLUMNS: &'static str = "transaction_hash, log_index, contract_address, \
        from_address, to_address, value, token_id, block_number, timestamp";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InternalTransaction {
            transaction_hash: parse_column(row, 0)?,
            log_index: row.get(1)?,
            contract_address: parse_column(row, 2)?,
            from_address: parse_column(row, 3)?,
            to_address: parse_column(row, 4)?,
            value: parse_column(row, 5)?,
            token_id: parse_optional_column(row, 6)?,
            block_number: row.get(7)?,
            timestamp: row.get(8)?,
        })
    }
}
