//! In-memory chain used by the worker tests.

use crate::chain::{ChainBlock, ChainLog, ChainReceipt, ChainSource, ChainTransaction};
use crate::events::TRANSFER_TOPIC;
use alloy::sol_types::{SolCall, SolValue};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

/// Deterministic block hash; `fork` tells competing branches apart.
pub fn block_hash(number: u64, fork: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xb0;
    bytes[1] = fork;
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

pub fn tx_hash(seed: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x70;
    bytes[24..].copy_from_slice(&seed.to_be_bytes());
    B256::from(bytes)
}

/// Empty block on branch `fork`, linked to its parent on the same branch.
pub fn block(number: u64, fork: u8) -> ChainBlock {
    ChainBlock {
        number,
        hash: block_hash(number, fork),
        parent_hash: if number == 0 {
            B256::ZERO
        } else {
            block_hash(number - 1, fork)
        },
        miner: Address::repeat_byte(0xee),
        gas_used: 100_000,
        gas_limit: 30_000_000,
        base_fee_per_gas: Some(10),
        extra_data: Bytes::new(),
        timestamp: GENESIS_TIMESTAMP + number * 12,
        transactions: Vec::new(),
    }
}

pub fn transfer(seed: u64, from: Address, to: Address) -> ChainTransaction {
    ChainTransaction {
        hash: tx_hash(seed),
        from,
        to: Some(to),
        value: U256::from(seed),
        gas_price: 20,
        gas_limit: 21_000,
        nonce: seed,
        input: Bytes::new(),
    }
}

pub fn creation(seed: u64, from: Address) -> ChainTransaction {
    ChainTransaction {
        hash: tx_hash(seed),
        from,
        to: None,
        value: U256::ZERO,
        gas_price: 20,
        gas_limit: 500_000,
        nonce: seed,
        input: Bytes::from(vec![0x60, 0x80, 0x60, 0x40]),
    }
}

pub fn block_with_txs(number: u64, fork: u8, transactions: Vec<ChainTransaction>) -> ChainBlock {
    ChainBlock {
        transactions,
        ..block(number, fork)
    }
}

/// A fungible Transfer log as a node would return it.
pub fn transfer_log(
    contract: Address,
    block_number: u64,
    seed: u64,
    log_index: u64,
    from: Address,
    to: Address,
    value: u64,
) -> ChainLog {
    ChainLog {
        address: contract,
        topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
        data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
        block_number: Some(block_number),
        transaction_hash: Some(tx_hash(seed)),
        log_index: Some(log_index),
    }
}

#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<HashMap<u64, ChainBlock>>,
    head: Mutex<Option<u64>>,
    receipts: Mutex<HashMap<B256, ChainReceipt>>,
    code: Mutex<HashMap<Address, (u64, Bytes)>>,
    balances: Mutex<HashMap<Address, U256>>,
    calls: Mutex<HashMap<(Address, Bytes), Bytes>>,
    logs: Mutex<Vec<ChainLog>>,
    log_queries: Mutex<Vec<(u64, u64)>>,
    failing_log_queries: AtomicUsize,
    failing_block_fetches: AtomicUsize,
    block_fetches: AtomicUsize,
}

impl MockChain {
    pub fn with_blocks(blocks: impl IntoIterator<Item = ChainBlock>) -> Self {
        let chain = MockChain::default();
        for block in blocks {
            chain.insert_block(block);
        }
        chain
    }

    pub fn insert_block(&self, block: ChainBlock) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn remove_block(&self, number: u64) {
        self.blocks.lock().unwrap().remove(&number);
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = Some(head);
    }

    pub fn set_receipt(&self, hash: B256, receipt: ChainReceipt) {
        self.receipts.lock().unwrap().insert(hash, receipt);
    }

    pub fn set_code(&self, address: Address, deployed_at: u64, code: &str) {
        let code: Bytes = code.parse().unwrap();
        self.code.lock().unwrap().insert(address, (deployed_at, code));
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    /// Makes `call` against `address` return `value`; unregistered calls revert.
    pub fn respond<T: SolCall, V: SolValue>(&self, address: Address, call: T, value: V) {
        self.calls.lock().unwrap().insert(
            (address, Bytes::from(call.abi_encode())),
            Bytes::from(value.abi_encode()),
        );
    }

    pub fn push_log(&self, log: ChainLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.log_queries.lock().unwrap().clone()
    }

    pub fn fail_next_log_queries(&self, count: usize) {
        self.failing_log_queries.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_block_fetches(&self, count: usize) {
        self.failing_block_fetches.store(count, Ordering::SeqCst);
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn latest_block_number(&self) -> Result<u64> {
        if let Some(head) = *self.head.lock().unwrap() {
            return Ok(head);
        }
        Ok(self.blocks.lock().unwrap().keys().max().copied().unwrap_or(0))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_block_fetches) {
            anyhow::bail!("connection reset fetching block {number}");
        }
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn block_by_hash(&self, hash: B256) -> Result<Option<ChainBlock>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .values()
            .find(|b| b.hash == hash)
            .cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self
            .code
            .lock()
            .unwrap()
            .get(&address)
            .map(|(_, code)| code.clone())
            .unwrap_or_default())
    }

    async fn code_at_block(&self, address: Address, block_number: u64) -> Result<Bytes> {
        Ok(self
            .code
            .lock()
            .unwrap()
            .get(&address)
            .filter(|(deployed_at, _)| *deployed_at <= block_number)
            .map(|(_, code)| code.clone())
            .unwrap_or_default())
    }

    async fn pending_balance(&self, address: Address) -> Result<U256> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        self.calls
            .lock()
            .unwrap()
            .get(&(to, calldata))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("execution reverted"))
    }

    async fn transfer_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<ChainLog>> {
        if Self::take_failure(&self.failing_log_queries) {
            anyhow::bail!("429 Too Many Requests");
        }
        self.log_queries
            .lock()
            .unwrap()
            .push((from_block, to_block));
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.address == address
                    && log.topics.first() == Some(&topic0)
                    && log
                        .block_number
                        .is_some_and(|n| n >= from_block && n <= to_block)
            })
            .cloned()
            .collect())
    }
}
