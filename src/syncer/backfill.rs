use super::ChainSyncer;
use crate::chain::ChainSource;
use crate::config::Config;
use crate::retry::sleep_or_cancel;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStep {
    /// The block was already stored.
    Present,
    /// The block was fetched and imported.
    Imported,
    /// Upstream has no such block; skipped this sweep.
    Missing,
}

/// Endless downward sweep that fills gaps and re-validates stored blocks.
pub struct Backfill<C> {
    syncer: Arc<ChainSyncer<C>>,
    start_block: Option<u64>,
    heal_depth: u64,
    delay: Duration,
    retry_delay: Duration,
}

impl<C: ChainSource> Backfill<C> {
    pub fn new(syncer: Arc<ChainSyncer<C>>, config: &Config) -> Self {
        Self {
            syncer,
            start_block: config.backfill_start_block,
            heal_depth: config.backfill_heal_depth,
            delay: config.backfill_delay,
            retry_delay: config.retry_delay,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut next = self.start_block;
        info!(
            "Backfill started from {}",
            next.map_or("head".to_string(), |n| n.to_string())
        );

        while !cancel.is_cancelled() {
            let number = match next {
                Some(number) => number,
                None => match self.syncer.chain().latest_block_number().await {
                    Ok(head) => {
                        info!("Backfill sweep starting at head {}", head);
                        head
                    }
                    Err(e) => {
                        warn!("Backfill could not read the chain head: {:#}", e);
                        if !sleep_or_cancel(&cancel, self.retry_delay).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            if let Err(e) = self.process_block(number).await {
                warn!("Backfill skipping block {}: {:#}", number, e);
                if !sleep_or_cancel(&cancel, self.retry_delay).await {
                    break;
                }
            }

            // after genesis the next sweep restarts from the head
            next = number.checked_sub(1);

            if !sleep_or_cancel(&cancel, self.delay).await {
                break;
            }
        }

        info!("Backfill stopped");
        Ok(())
    }

    /// Imports `number` if absent, then heals around it and checks its
    /// transaction count.
    pub async fn process_block(&self, number: u64) -> Result<BackfillStep> {
        let step = if self.syncer.block_exists(number)? {
            BackfillStep::Present
        } else if self.syncer.fetch_and_import(number).await?.is_some() {
            BackfillStep::Imported
        } else {
            warn!("Block {} not found upstream, skipping", number);
            return Ok(BackfillStep::Missing);
        };

        self.syncer.heal_parent(number, self.heal_depth).await?;
        self.syncer.transactions_consistent(number).await?;
        debug!("Backfill checked block {} ({:?})", number, step);
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::test_utils::{MockChain, block, block_hash};

    fn backfill(chain: MockChain, start_block: Option<u64>) -> Backfill<MockChain> {
        let syncer = Arc::new(ChainSyncer::new(
            Arc::new(chain),
            Database::new(":memory:").unwrap(),
        ));
        let config = Config {
            backfill_start_block: start_block,
            backfill_delay: Duration::from_millis(1),
            ..Config::default()
        };
        Backfill::new(syncer, &config)
    }

    #[tokio::test]
    async fn imports_missing_and_skips_unknown_blocks() {
        let backfill = backfill(MockChain::with_blocks((0..=3).map(|n| block(n, 0))), None);

        assert_eq!(
            backfill.process_block(3).await.unwrap(),
            BackfillStep::Imported
        );
        assert_eq!(
            backfill.process_block(3).await.unwrap(),
            BackfillStep::Present
        );
        assert_eq!(
            backfill.process_block(9).await.unwrap(),
            BackfillStep::Missing
        );
    }

    #[tokio::test]
    async fn present_block_with_stale_parent_is_healed() {
        let backfill = backfill(MockChain::with_blocks((0..=3).map(|n| block(n, 0))), None);
        backfill.syncer.import_block(&block(2, 5)).await.unwrap();
        backfill.syncer.import_block(&block(3, 0)).await.unwrap();

        backfill.process_block(3).await.unwrap();
        assert_eq!(
            backfill.syncer.stored_block(2).unwrap().map(|b| b.hash),
            Some(block_hash(2, 0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reaches_genesis_and_wraps_to_head() {
        let chain = MockChain::with_blocks((0..=4).map(|n| block(n, 0)));
        let backfill = Arc::new(backfill(chain, Some(2)));
        let cancel = CancellationToken::new();

        let worker = {
            let backfill = Arc::clone(&backfill);
            let cancel = cancel.clone();
            tokio::spawn(async move { backfill.run(cancel).await })
        };

        // one full sweep from 2 to 0, then a second one from the head at 4
        for _ in 0..50 {
            if backfill.syncer.block_exists(3).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();
        worker.await.unwrap().unwrap();

        for n in 0..=4 {
            assert!(backfill.syncer.block_exists(n).unwrap(), "block {n} missing");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_errors_are_skipped() {
        let chain = MockChain::with_blocks((0..=2).map(|n| block(n, 0)));
        chain.fail_next_block_fetches(1);
        let backfill = Arc::new(backfill(chain, Some(2)));
        let cancel = CancellationToken::new();

        let worker = {
            let backfill = Arc::clone(&backfill);
            let cancel = cancel.clone();
            tokio::spawn(async move { backfill.run(cancel).await })
        };

        for _ in 0..200 {
            if backfill.syncer.block_exists(0).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        cancel.cancel();
        worker.await.unwrap().unwrap();

        // 2 failed on the first pass, 1 and 0 were imported
        assert!(backfill.syncer.block_exists(1).unwrap());
        assert!(backfill.syncer.block_exists(0).unwrap());
    }
}
