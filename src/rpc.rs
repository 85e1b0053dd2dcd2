use crate::chain::{ChainBlock, ChainLog, ChainReceipt, ChainSource, ChainTransaction};
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{
    Block, BlockId, BlockNumberOrTag, Filter, Log, Transaction, TransactionReceipt,
    TransactionRequest,
};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], max_retries: usize) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: max_retries.max(1),
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    /// Runs `call` against the current provider with timeout, rotation on
    /// failure and exponential back-off between attempts.
    async fn request<T, E, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(AlloyFullProvider) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: std::fmt::Display + Send,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let future = call(self.get_provider().clone());
            async move {
                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        self.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", error_str))
                    }
                    Err(_) => Err(self.handle_timeout()),
                }
            }
        })
        .await
    }

    /// `eth_call` with retries for provider faults only. A revert is the
    /// contract's answer and is returned at once without rotating.
    async fn call_internal(&self, to: Address, calldata: &Bytes) -> Result<Bytes> {
        Retry::spawn(self.get_retry_strategy(), || async move {
            let provider = self.get_provider().clone();
            let request = TransactionRequest::default()
                .to(to)
                .input(calldata.clone().into());

            match timeout(REQUEST_TIMEOUT, async { provider.call(request).await }).await {
                Ok(Ok(output)) => Ok(Ok(output)),
                Ok(Err(e)) => {
                    let error_str = e.to_string();

                    if Self::is_execution_error(&error_str) {
                        debug!("eth_call to {:?} reverted: {}", to, error_str);
                        Ok(Err(anyhow::anyhow!("{}", e)))
                    } else {
                        self.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                }
                Err(_) => Err(self.handle_timeout()),
            }
        })
        .await
        .and_then(|r| r)
    }

    fn is_execution_error(error_str: &str) -> bool {
        let error_str = error_str.to_lowercase();
        ["revert", "invalid opcode", "invalid jump"]
            .iter()
            .any(|marker| error_str.contains(marker))
    }

    async fn get_logs_internal(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        Retry::spawn(self.get_retry_strategy(), || async move {
            let provider = self.get_provider().clone();
            let filter = Filter::new()
                .address(contract_address)
                .event_signature(topic0)
                .from_block(from_block)
                .to_block(to_block);

            match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
                Ok(Ok(logs)) => Ok(Ok(logs)),
                Ok(Err(e)) => {
                    let error_str = e.to_string();

                    if error_str.contains("exceeds max results") {
                        debug!(
                            "Max results exceeded for blocks {}-{}, will split range",
                            from_block, to_block
                        );
                        // not retried: the caller narrows the range instead
                        Ok(Err(anyhow::anyhow!("{}", e)))
                    } else {
                        self.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                }
                Err(_) => Err(self.handle_timeout()),
            }
        })
        .await
        .and_then(|r| r)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self
                .get_logs_internal(current_from, to_block, contract_address, topic0)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();
                    let suggestion = error_str
                        .contains("exceeds max results")
                        .then(|| Self::parse_max_results_error(&error_str))
                        .flatten();

                    let Some((suggested_from, suggested_to)) = suggestion else {
                        return Err(e);
                    };

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(suggested_from, suggested_to, contract_address, topic0)
                        .await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn latest_block_number(&self) -> Result<u64> {
        self.request(|provider| async move { provider.get_block_number().await })
            .await
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>> {
        let block = self
            .request(move |provider| async move {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
            })
            .await?;
        Ok(block.map(convert_block))
    }

    async fn block_by_hash(&self, hash: B256) -> Result<Option<ChainBlock>> {
        let block = self
            .request(move |provider| async move { provider.get_block_by_hash(hash).full().await })
            .await?;
        Ok(block.map(convert_block))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>> {
        let receipt = self
            .request(move |provider| async move { provider.get_transaction_receipt(hash).await })
            .await?;
        Ok(receipt.map(convert_receipt))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.request(move |provider| async move { provider.get_code_at(address).await })
            .await
    }

    async fn code_at_block(&self, address: Address, block_number: u64) -> Result<Bytes> {
        self.request(move |provider| async move {
            provider
                .get_code_at(address)
                .block_id(BlockNumberOrTag::Number(block_number).into())
                .await
        })
        .await
    }

    async fn pending_balance(&self, address: Address) -> Result<U256> {
        self.request(move |provider| async move {
            provider
                .get_balance(address)
                .block_id(BlockId::pending())
                .await
        })
        .await
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        self.call_internal(to, &calldata).await
    }

    async fn transfer_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<ChainLog>> {
        let logs = self.get_logs(from_block, to_block, address, topic0).await?;
        Ok(logs.into_iter().map(convert_log).collect())
    }
}

fn convert_block(block: Block) -> ChainBlock {
    let header = &block.header;
    let base_fee = header.base_fee_per_gas;
    let transactions = block
        .transactions
        .as_transactions()
        .map(|txs| {
            txs.iter()
                .map(|tx| convert_transaction(tx, base_fee))
                .collect()
        })
        .unwrap_or_default();

    ChainBlock {
        number: header.number,
        hash: header.hash,
        parent_hash: header.parent_hash,
        miner: header.beneficiary,
        gas_used: header.gas_used,
        gas_limit: header.gas_limit,
        base_fee_per_gas: base_fee,
        extra_data: header.extra_data.clone(),
        timestamp: header.timestamp,
        transactions,
    }
}

fn convert_transaction(tx: &Transaction, base_fee: Option<u64>) -> ChainTransaction {
    let gas_price = tx
        .effective_gas_price
        .unwrap_or_else(|| ConsensusTransaction::effective_gas_price(tx, base_fee));

    ChainTransaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value: ConsensusTransaction::value(tx),
        gas_price,
        gas_limit: ConsensusTransaction::gas_limit(tx),
        nonce: ConsensusTransaction::nonce(tx),
        input: ConsensusTransaction::input(tx).clone(),
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> ChainReceipt {
    ChainReceipt {
        contract_address: receipt.contract_address,
        status: receipt.status(),
        gas_used: receipt.gas_used,
    }
}

fn convert_log(log: Log) -> ChainLog {
    ChainLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    }
}
