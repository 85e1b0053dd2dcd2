use crate::chain::ChainSource;
use crate::events::{TRANSFER_TOPIC, TokenTransfer, decode_transfer_event};
use crate::retry::with_retries;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Block ranges queried for a scan from `start` up to `head`.
///
/// Window `i` starts at `start + i * limit` and ends at
/// `min(start + (i + 1) * limit, head)`, so consecutive windows share
/// their boundary block. Events in that block come back twice and are
/// de-duplicated by [`scan_transfers`].
pub fn log_windows(start: u64, head: u64, limit: u64) -> Vec<(u64, u64)> {
    let limit = limit.max(1);
    let mut windows = Vec::new();
    let mut from = start;

    while from <= head {
        windows.push((from, from.saturating_add(limit).min(head)));
        match from.checked_add(limit) {
            Some(next) => from = next,
            None => break,
        }
    }

    windows
}

#[derive(Debug, Default)]
pub struct TransferScan {
    /// Decoded events, unique by `(transaction_hash, log_index)`, in the
    /// order upstream returned them.
    pub events: Vec<TokenTransfer>,
    pub windows: usize,
    pub skipped: usize,
}

impl TransferScan {
    pub fn participants(&self) -> HashSet<Address> {
        self.events
            .iter()
            .flat_map(|event| [event.from, event.to])
            .collect()
    }
}

/// Fetches and decodes every Transfer log of `contract` in
/// `[start, head]`, one bounded window at a time. Each window query is
/// retried with back-off; exhausting the retries fails the whole scan.
pub async fn scan_transfers<C: ChainSource + ?Sized>(
    chain: &C,
    cancel: &CancellationToken,
    contract: Address,
    start: u64,
    head: u64,
    window_size: u64,
    retries: usize,
) -> Result<TransferScan> {
    let mut scan = TransferScan::default();
    let mut seen: HashSet<(B256, u64)> = HashSet::new();

    for (from, to) in log_windows(start, head, window_size) {
        if cancel.is_cancelled() {
            anyhow::bail!("transfer scan of {:?} cancelled at block {}", contract, from);
        }

        let label = format!("Transfer logs of {contract:?} in {from}-{to}");
        let logs = with_retries(cancel, retries, &label, || {
            chain.transfer_logs(contract, from, to, TRANSFER_TOPIC)
        })
        .await?;
        scan.windows += 1;
        debug!("Received {} logs for blocks {} to {}", logs.len(), from, to);

        for log in &logs {
            match decode_transfer_event(log) {
                Ok(event) => {
                    if seen.insert((event.transaction_hash, event.log_index)) {
                        scan.events.push(event);
                    }
                }
                Err(e) => {
                    warn!("Failed to decode transfer event of {:?}: {}", contract, e);
                    scan.skipped += 1;
                }
            }
        }
    }

    Ok(scan)
}
