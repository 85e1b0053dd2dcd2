use super::ChainSyncer;
use crate::chain::ChainSource;
use crate::repository::{BlockRepository, TransactionRepository};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

impl<C: ChainSource> ChainSyncer<C> {
    /// Local fork check: block `number` is missing, or its stored parent
    /// exists with a hash other than the recorded `parent_hash`.
    ///
    /// Never contacts upstream.
    pub fn needs_reload(&self, number: u64) -> Result<bool> {
        self.db.with(|conn| {
            let repo = BlockRepository::new(conn);
            let Some(block) = repo.get_by_number(number)? else {
                return Ok(true);
            };
            if number == 0 {
                return Ok(false);
            }
            Ok(match repo.get_by_number(number - 1)? {
                Some(parent) => parent.hash != block.parent_hash,
                None => false,
            })
        })
    }

    /// Repairs broken parent links around `number`, walking at most
    /// `max_depth` steps in either direction. Returns how many blocks
    /// were re-imported.
    pub async fn heal_parent(&self, number: u64, max_depth: u64) -> Result<u64> {
        let mut pending = vec![(number, max_depth)];
        let mut visited = HashSet::new();
        let mut reimported = 0;

        while let Some((n, depth)) = pending.pop() {
            if n == 0 || depth == 0 || !visited.insert(n) {
                continue;
            }
            if !self.needs_reload(n)? {
                continue;
            }

            warn!("Block {} does not link to its stored parent, refetching {}", n, n - 1);
            if self.fetch_and_import(n - 1).await?.is_some() {
                reimported += 1;
            }

            if self.needs_reload(n)? {
                // the parent was fine; n itself is stale
                if self.fetch_and_import(n).await?.is_some() {
                    reimported += 1;
                }
                if self.block_exists(n + 1)? {
                    pending.push((n + 1, depth - 1));
                }
            }

            pending.push((n - 1, depth - 1));
        }

        if reimported > 0 {
            info!("Healed {} block(s) around block {}", reimported, number);
        }
        Ok(reimported)
    }

    /// True when the stored transaction count of block `number` matches its
    /// `tx_count`. A mismatch re-imports the whole block and returns false.
    ///
    /// A missing block counts as consistent; `needs_reload` owns that case.
    pub async fn transactions_consistent(&self, number: u64) -> Result<bool> {
        let (expected, stored) = self.db.with(|conn| {
            let Some(block) = BlockRepository::new(conn).get_by_number(number)? else {
                return Ok((None, 0));
            };
            let stored = TransactionRepository::new(conn).count_for_block(number)?;
            Ok((Some(block.tx_count), stored))
        })?;

        match expected {
            Some(expected) if expected != stored => {
                warn!(
                    "Block {} records {} transactions but {} are stored, reimporting",
                    number, expected, stored
                );
                self.fetch_and_import(number).await?;
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::test_utils::{MockChain, block, block_hash, block_with_txs, transfer};
    use alloy_primitives::Address;
    use std::sync::Arc;

    fn syncer_over(chain: MockChain) -> ChainSyncer<MockChain> {
        ChainSyncer::new(Arc::new(chain), Database::new(":memory:").unwrap())
    }

    #[tokio::test]
    async fn linked_parent_needs_no_reload() {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let syncer = syncer_over(MockChain::default());

        syncer.import_block(&block(99, 0)).await.unwrap();
        syncer
            .import_block(&block_with_txs(
                100,
                0,
                vec![
                    transfer(1, alice, bob),
                    transfer(2, bob, alice),
                    transfer(3, alice, alice),
                ],
            ))
            .await
            .unwrap();

        assert!(!syncer.needs_reload(100).unwrap());
        assert!(syncer.transactions_consistent(100).await.unwrap());
    }

    #[tokio::test]
    async fn fork_detection_follows_stored_linkage() {
        let syncer = syncer_over(MockChain::default());

        // missing block
        assert!(syncer.needs_reload(5).unwrap());

        // present block without a stored parent
        syncer.import_block(&block(5, 0)).await.unwrap();
        assert!(!syncer.needs_reload(5).unwrap());

        // parent on another branch
        syncer.import_block(&block(4, 1)).await.unwrap();
        assert!(syncer.needs_reload(5).unwrap());

        syncer.import_block(&block(4, 0)).await.unwrap();
        assert!(!syncer.needs_reload(5).unwrap());
    }

    #[tokio::test]
    async fn heal_refetches_stale_parent() {
        // upstream: canonical branch 0 up to 101
        let chain = MockChain::with_blocks((95..=101).map(|n| block(n, 0)));
        let syncer = syncer_over(chain);

        for n in 95..=99 {
            syncer.import_block(&block(n, 0)).await.unwrap();
        }
        // stored 100 is from an abandoned branch
        syncer.import_block(&block(100, 1)).await.unwrap();
        syncer.import_block(&block(101, 0)).await.unwrap();
        assert!(syncer.needs_reload(101).unwrap());

        let reimported = syncer.heal_parent(101, 10).await.unwrap();

        assert!(reimported >= 1);
        assert!(!syncer.needs_reload(101).unwrap());
        assert!(!syncer.needs_reload(100).unwrap());
        assert_eq!(
            syncer.stored_block(100).unwrap().map(|b| b.hash),
            Some(block_hash(100, 0))
        );
    }

    #[tokio::test]
    async fn heal_refetches_stale_child_when_parent_is_canonical() {
        let chain = MockChain::with_blocks((0..=12).map(|n| block(n, 0)));
        let syncer = syncer_over(chain);

        for n in 0..=10 {
            syncer.import_block(&block(n, 0)).await.unwrap();
        }
        // 11 and 12 were stored from a branch upstream has since dropped
        syncer.import_block(&block(11, 1)).await.unwrap();
        syncer.import_block(&block(12, 1)).await.unwrap();

        syncer.heal_parent(11, 5).await.unwrap();

        for n in 1..=12 {
            assert!(!syncer.needs_reload(n).unwrap(), "block {n} still broken");
        }
        assert_eq!(
            syncer.stored_block(12).unwrap().map(|b| b.hash),
            Some(block_hash(12, 0))
        );
    }

    #[tokio::test]
    async fn heal_walk_is_bounded_by_depth() {
        // every stored block is on a stale branch
        let chain = MockChain::with_blocks((0..=50).map(|n| block(n, 0)));
        let syncer = syncer_over(chain);
        for n in 0..=50 {
            syncer
                .import_block(&block(n, if n % 2 == 0 { 1 } else { 2 }))
                .await
                .unwrap();
        }

        syncer.heal_parent(50, 3).await.unwrap();

        assert!(!syncer.needs_reload(50).unwrap());
        // far below the walk nothing was touched
        assert_eq!(
            syncer.stored_block(10).unwrap().map(|b| b.hash),
            Some(block_hash(10, 1))
        );
    }

    #[tokio::test]
    async fn heal_stops_at_genesis_and_zero_depth() {
        let syncer = syncer_over(MockChain::default());
        assert_eq!(syncer.heal_parent(0, 10).await.unwrap(), 0);
        assert_eq!(syncer.heal_parent(7, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transaction_count_mismatch_triggers_reimport() {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let raw = block_with_txs(20, 0, vec![transfer(1, alice, bob), transfer(2, bob, alice)]);
        let syncer = syncer_over(MockChain::with_blocks([raw.clone()]));
        syncer.import_block(&raw).await.unwrap();

        syncer
            .db
            .with(|conn| {
                conn.execute(
                    "DELETE FROM transactions WHERE hash = ?1",
                    [format!("{:?}", crate::test_utils::tx_hash(2))],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(!syncer.transactions_consistent(20).await.unwrap());
        assert!(syncer.transactions_consistent(20).await.unwrap());
    }

    #[tokio::test]
    async fn missing_block_is_consistent() {
        let syncer = syncer_over(MockChain::default());
        assert!(syncer.transactions_consistent(1234).await.unwrap());
    }
}
