//! Upstream view of the chain.
//!
//! `ChainSource` is everything the workers need from a node. `RpcClient`
//! implements it over JSON-RPC; tests implement it in memory.

use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub miner: Address,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub extra_data: Bytes,
    pub timestamp: u64,
    pub transactions: Vec<ChainTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    /// Sender as recovered from the signature by the node.
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    /// Effective gas price in the context of the containing block.
    pub gas_price: u128,
    pub gas_limit: u64,
    pub nonce: u64,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub contract_address: Option<Address>,
    pub status: bool,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64>;

    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>>;

    async fn block_by_hash(&self, hash: B256) -> Result<Option<ChainBlock>>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>>;

    /// Code at the latest block. Empty for externally owned accounts.
    async fn code_at(&self, address: Address) -> Result<Bytes>;

    async fn code_at_block(&self, address: Address, block_number: u64) -> Result<Bytes>;

    async fn pending_balance(&self, address: Address) -> Result<U256>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes>;

    /// Logs emitted by `address` with `topic0` in the inclusive range.
    async fn transfer_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<ChainLog>>;
}
