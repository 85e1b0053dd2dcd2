//! Running total of burned fees, walked forward along the stored chain.

use crate::chain::ChainSource;
use crate::config::Config;
use crate::repository::{Block, BlockRepository};
use crate::retry::{sleep_or_cancel, with_retries};
use crate::syncer::ChainSyncer;
use alloy_primitives::U256;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FETCH_RETRIES: usize = 3;

/// Why a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// Nothing stored to start from.
    NoSeed,
    /// The next block is younger than the freshness threshold, or not
    /// produced yet.
    CaughtUp,
    /// The next block no longer links to the walked parent.
    Fork,
    /// The next block could not be fetched or carries no fee total.
    Unavailable,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    pub accumulated: u64,
    pub end: WalkEnd,
}

pub struct FeeAccumulator<C> {
    syncer: Arc<ChainSyncer<C>>,
    interval: Duration,
    freshness: Duration,
    start_block: Option<u64>,
}

impl<C: ChainSource> FeeAccumulator<C> {
    pub fn new(syncer: Arc<ChainSyncer<C>>, config: &Config) -> Self {
        Self {
            syncer,
            interval: config.fee_interval,
            freshness: config.fee_freshness,
            start_block: config.fee_start_block,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Fee accumulator started");

        while !cancel.is_cancelled() {
            match self.walk(crate::unix_now(), &cancel).await {
                Ok(summary) if summary.accumulated > 0 => info!(
                    "Accumulated burned fees over {} block(s), stopped: {:?}",
                    summary.accumulated, summary.end
                ),
                Ok(summary) => debug!("Fee walk made no progress: {:?}", summary.end),
                Err(e) => warn!("Fee walk failed: {:#}", e),
            }

            if !sleep_or_cancel(&cancel, self.interval).await {
                break;
            }
        }

        info!("Fee accumulator stopped");
        Ok(())
    }

    /// Extends the cumulative total one block at a time from the last block
    /// whose total is known good. `now` is unix seconds.
    pub async fn walk(&self, now: u64, cancel: &CancellationToken) -> Result<WalkSummary> {
        let mut accumulated = 0;
        let Some((mut parent, mut total)) = self.seed(cancel).await? else {
            return Ok(WalkSummary {
                accumulated,
                end: WalkEnd::NoSeed,
            });
        };

        let end = loop {
            if cancel.is_cancelled() {
                break WalkEnd::Cancelled;
            }

            let next_number = parent.number + 1;
            let next = match self.load_or_fetch(next_number, cancel).await {
                Ok(Some(block)) => block,
                Ok(None) => break WalkEnd::CaughtUp,
                Err(e) => {
                    warn!("Fee walk could not load block {}: {:#}", next_number, e);
                    break WalkEnd::Unavailable;
                }
            };

            if now.saturating_sub(next.timestamp) < self.freshness.as_secs() {
                break WalkEnd::CaughtUp;
            }
            if next.parent_hash != parent.hash {
                debug!(
                    "Block {} no longer builds on {:?}, abandoning fee walk",
                    next_number, parent.hash
                );
                break WalkEnd::Fork;
            }

            let next = match next.burned_fees {
                Some(_) => next,
                None => match self.reimport(next_number, cancel).await {
                    Some(block) if block.burned_fees.is_some() => block,
                    _ => break WalkEnd::Unavailable,
                },
            };
            if next.parent_hash != parent.hash {
                break WalkEnd::Fork;
            }

            total += next.burned_fees.unwrap_or_default();
            let written = self.syncer.db().with(|conn| {
                BlockRepository::new(conn).set_cumulative_fees(next.number, &next.hash, &total)
            })?;
            if !written {
                // re-imported under a new hash since we loaded it
                break WalkEnd::Fork;
            }

            accumulated += 1;
            parent = next;
        };

        Ok(WalkSummary { accumulated, end })
    }

    /// The block below the lowest gap in the totals, else the highest block
    /// carrying one, else the configured start, genesis or the lowest stored
    /// block seeded with its own burned fees.
    async fn seed(&self, cancel: &CancellationToken) -> Result<Option<(Block, U256)>> {
        let (resume, start) = self.syncer.db().with(|conn| {
            let repo = BlockRepository::new(conn);
            let resume = match repo.lowest_before_missing_cumulative_fees()? {
                Some(block) => Some(block),
                None => repo.highest_with_cumulative_fees()?,
            };
            if resume.is_some() {
                return Ok((resume, None));
            }
            let start = match self.start_block {
                Some(number) => repo.get_by_number(number)?,
                None => match repo.get_by_number(0)? {
                    Some(genesis) => Some(genesis),
                    None => repo.lowest()?,
                },
            };
            Ok((None, start))
        })?;

        if let Some(block) = resume {
            let total = block.cumulative_fees_burned.unwrap_or_default();
            return Ok(Some((block, total)));
        }

        let start = match (start, self.start_block) {
            (Some(block), _) => Some(block),
            (None, Some(number)) => self.load_or_fetch(number, cancel).await?,
            (None, None) => None,
        };
        let Some(block) = start else {
            return Ok(None);
        };

        let total = block.burned_fees.unwrap_or_default();
        self.syncer.db().with(|conn| {
            BlockRepository::new(conn).set_cumulative_fees(block.number, &block.hash, &total)
        })?;
        info!("Seeded cumulative burned fees at block {}", block.number);
        Ok(Some((block, total)))
    }

    async fn load_or_fetch(&self, number: u64, cancel: &CancellationToken) -> Result<Option<Block>> {
        if let Some(block) = self.syncer.stored_block(number)? {
            return Ok(Some(block));
        }
        let label = format!("fetch block {number}");
        with_retries(cancel, FETCH_RETRIES, &label, || {
            self.syncer.fetch_and_import(number)
        })
        .await
    }

    async fn reimport(&self, number: u64, cancel: &CancellationToken) -> Option<Block> {
        let label = format!("reimport block {number}");
        with_retries(cancel, FETCH_RETRIES, &label, || {
            self.syncer.fetch_and_import(number)
        })
        .await
        .inspect_err(|e| warn!("{:#}", e))
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainBlock;
    use crate::repository::Database;
    use crate::test_utils::{GENESIS_TIMESTAMP, MockChain, block};
    use alloy_primitives::B256;

    /// Each test block burns 10 * 100_000 wei.
    const BURN: u64 = 1_000_000;

    fn accumulator(chain: MockChain) -> FeeAccumulator<MockChain> {
        let syncer = Arc::new(ChainSyncer::new(
            Arc::new(chain),
            Database::new(":memory:").unwrap(),
        ));
        FeeAccumulator::new(syncer, &Config::default())
    }

    fn cumulative(acc: &FeeAccumulator<MockChain>, number: u64) -> Option<U256> {
        acc.syncer
            .stored_block(number)
            .unwrap()
            .and_then(|b| b.cumulative_fees_burned)
    }

    fn long_after_genesis() -> u64 {
        GENESIS_TIMESTAMP + 1_000_000
    }

    #[tokio::test]
    async fn walks_from_genesis_to_the_stored_tip() {
        let acc = accumulator(MockChain::default());
        for n in 0..=4 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }

        let summary = acc
            .walk(long_after_genesis(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.accumulated, 4);
        assert_eq!(summary.end, WalkEnd::CaughtUp);
        for n in 0..=4 {
            assert_eq!(cumulative(&acc, n), Some(U256::from(BURN * (n + 1))));
        }
    }

    #[tokio::test]
    async fn resumes_from_highest_total_and_fetches_missing_blocks() {
        let acc = accumulator(MockChain::default());
        for n in 0..=2 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        let first = acc.walk(long_after_genesis(), &cancel).await.unwrap();
        assert_eq!(first.accumulated, 2);

        for n in 3..=6 {
            acc.syncer.chain().insert_block(block(n, 0));
        }
        let summary = acc.walk(long_after_genesis(), &cancel).await.unwrap();
        assert_eq!(summary.accumulated, 4);
        assert_eq!(cumulative(&acc, 6), Some(U256::from(BURN * 7)));
    }

    #[tokio::test]
    async fn stops_at_fresh_blocks() {
        let acc = accumulator(MockChain::default());
        for n in 0..=10 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        // block 5 is 60 seconds before `now`
        let now = block(5, 0).timestamp + 59;

        let summary = acc.walk(now, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.end, WalkEnd::CaughtUp);
        assert_eq!(summary.accumulated, 4);
        assert_eq!(cumulative(&acc, 5), None);
    }

    #[tokio::test]
    async fn aborts_on_broken_linkage() {
        let acc = accumulator(MockChain::default());
        for n in 0..=2 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        acc.syncer.import_block(&block(3, 9)).await.unwrap();

        let summary = acc
            .walk(long_after_genesis(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.end, WalkEnd::Fork);
        assert_eq!(summary.accumulated, 2);
        assert_eq!(cumulative(&acc, 3), None);
    }

    #[tokio::test]
    async fn missing_fee_total_is_reimported() {
        let acc = accumulator(MockChain::with_blocks((0..=2).map(|n| block(n, 0))));
        for n in 0..=2 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        acc.syncer
            .db()
            .with(|conn| {
                conn.execute("UPDATE blocks SET burned_fees = NULL WHERE number = 2", [])?;
                Ok(())
            })
            .unwrap();

        let summary = acc
            .walk(long_after_genesis(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.accumulated, 2);
        assert_eq!(cumulative(&acc, 2), Some(U256::from(BURN * 3)));
    }

    #[tokio::test]
    async fn reorg_of_a_walked_block_clears_its_total() {
        let acc = accumulator(MockChain::default());
        for n in 0..=3 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        acc.walk(long_after_genesis(), &CancellationToken::new())
            .await
            .unwrap();

        acc.syncer.import_block(&block(3, 4)).await.unwrap();
        assert_eq!(cumulative(&acc, 3), None);
        assert_eq!(cumulative(&acc, 2), Some(U256::from(BURN * 3)));
    }

    #[tokio::test]
    async fn replaced_block_below_the_tip_is_recomputed() {
        let acc = accumulator(MockChain::default());
        for n in 0..=5 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        acc.walk(long_after_genesis(), &cancel).await.unwrap();
        assert_eq!(cumulative(&acc, 5), Some(U256::from(BURN * 6)));

        let replacement = ChainBlock {
            hash: B256::repeat_byte(0x33),
            ..block(3, 0)
        };
        acc.syncer.import_block(&replacement).await.unwrap();
        assert_eq!(cumulative(&acc, 4), None);
        assert_eq!(cumulative(&acc, 5), None);

        let summary = acc.walk(long_after_genesis(), &cancel).await.unwrap();
        assert_eq!(summary.accumulated, 1);
        // block 4 still points at the old block 3
        assert_eq!(summary.end, WalkEnd::Fork);
        assert_eq!(cumulative(&acc, 3), Some(U256::from(BURN * 4)));
    }

    #[tokio::test]
    async fn walk_resumes_below_a_gap_and_rewrites_stale_totals() {
        let acc = accumulator(MockChain::default());
        for n in 0..=5 {
            acc.syncer.import_block(&block(n, 0)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        acc.walk(long_after_genesis(), &cancel).await.unwrap();
        acc.syncer
            .db()
            .with(|conn| {
                conn.execute(
                    "UPDATE blocks SET cumulative_fees_burned = NULL WHERE number = 3",
                    [],
                )?;
                conn.execute(
                    "UPDATE blocks SET cumulative_fees_burned = '1' WHERE number = 5",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let summary = acc.walk(long_after_genesis(), &cancel).await.unwrap();
        assert_eq!(summary.accumulated, 3);
        assert_eq!(cumulative(&acc, 3), Some(U256::from(BURN * 4)));
        assert_eq!(cumulative(&acc, 5), Some(U256::from(BURN * 6)));
    }

    #[tokio::test]
    async fn empty_store_has_nothing_to_walk() {
        let acc = accumulator(MockChain::default());
        let summary = acc
            .walk(long_after_genesis(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.end, WalkEnd::NoSeed);
    }
}
