use super::{BlockNotFound, ChainSyncer};
use crate::chain::ChainSource;
use crate::config::Config;
use crate::retry::{sleep_or_cancel, with_retries};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Polls the chain head and imports each new head block.
pub struct HeadListener<C> {
    syncer: Arc<ChainSyncer<C>>,
    poll_interval: Duration,
    fetch_retries: usize,
    heal_depth: u64,
    retry_delay: Duration,
}

impl<C: ChainSource> HeadListener<C> {
    pub fn new(syncer: Arc<ChainSyncer<C>>, config: &Config) -> Self {
        Self {
            syncer,
            poll_interval: config.head_poll_interval,
            fetch_retries: config.head_fetch_retries,
            heal_depth: config.listener_heal_depth,
            retry_delay: config.retry_delay,
        }
    }

    /// Runs until cancelled. Returns an error only when a head block stays
    /// missing upstream after every retry.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Head listener started");
        let mut last_seen = None;

        while !cancel.is_cancelled() {
            match self.poll(&cancel, last_seen).await {
                Ok(head) => last_seen = head.or(last_seen),
                Err(e) if e.downcast_ref::<BlockNotFound>().is_some() => {
                    error!("Head listener giving up: {:#}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Head listener iteration failed: {:#}", e);
                    if !sleep_or_cancel(&cancel, self.retry_delay).await {
                        break;
                    }
                    continue;
                }
            }

            if !sleep_or_cancel(&cancel, self.poll_interval).await {
                break;
            }
        }

        info!("Head listener stopped");
        Ok(())
    }

    /// One poll: imports the head when it moved past `last_seen` and heals
    /// backwards from it. Returns the head that was imported, if any.
    pub async fn poll(
        &self,
        cancel: &CancellationToken,
        last_seen: Option<u64>,
    ) -> Result<Option<u64>> {
        let head = self.syncer.chain().latest_block_number().await?;
        if Some(head) == last_seen {
            debug!("Head unchanged at {}", head);
            return Ok(None);
        }

        let chain = self.syncer.chain();
        let raw = with_retries(cancel, self.fetch_retries, "head block fetch", || async move {
            chain
                .block_by_number(head)
                .await?
                .ok_or_else(|| anyhow::Error::new(BlockNotFound(head)))
        })
        .await?;

        let block = self.syncer.import_block(&raw).await?;
        info!(
            "Imported head block {} with {} transactions",
            block.number, block.tx_count
        );

        self.syncer.heal_parent(head, self.heal_depth).await?;
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::test_utils::{MockChain, block, block_hash};

    fn listener(chain: MockChain) -> HeadListener<MockChain> {
        let syncer = Arc::new(ChainSyncer::new(
            Arc::new(chain),
            Database::new(":memory:").unwrap(),
        ));
        let config = Config {
            head_fetch_retries: 2,
            ..Config::default()
        };
        HeadListener::new(syncer, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn imports_new_head_and_heals_parent() {
        let listener = listener(MockChain::with_blocks((0..=5).map(|n| block(n, 0))));
        // stale parent from an abandoned branch
        listener.syncer.import_block(&block(4, 7)).await.unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(listener.poll(&cancel, None).await.unwrap(), Some(5));
        assert_eq!(
            listener.syncer.stored_block(4).unwrap().map(|b| b.hash),
            Some(block_hash(4, 0))
        );

        // unchanged head is a no-op
        assert_eq!(listener.poll(&cancel, Some(5)).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fetch_errors_are_retried() {
        let chain = MockChain::with_blocks([block(3, 0)]);
        chain.fail_next_block_fetches(1);
        let listener = listener(chain);

        let cancel = CancellationToken::new();
        assert_eq!(listener.poll(&cancel, None).await.unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_head_block_is_fatal() {
        let chain = MockChain::with_blocks([block(3, 0)]);
        chain.set_head(4);
        let listener = listener(chain);

        let result = listener.run(CancellationToken::new()).await;
        let err = result.unwrap_err();
        assert_eq!(err.downcast_ref::<BlockNotFound>(), Some(&BlockNotFound(4)));
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let listener = listener(MockChain::with_blocks([block(0, 0)]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        listener.run(cancel).await.unwrap();
    }
}
