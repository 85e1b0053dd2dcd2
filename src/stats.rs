use crate::repository::{Database, StatsRepository, StatsSnapshot, TransactionRepository};
use crate::retry::sleep_or_cancel;
use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DAY_SECS: u64 = 24 * 60 * 60;
const WEEK_SECS: u64 = 7 * DAY_SECS;

/// Periodically records transaction counts over all time, the last week and
/// the last day.
pub struct StatsSnapshotter {
    db: Database,
    interval: Duration,
}

impl StatsSnapshotter {
    pub fn new(db: Database, interval: Duration) -> Self {
        Self { db, interval }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Stats snapshotter started");

        while !cancel.is_cancelled() {
            match self.snapshot_at(crate::unix_now()) {
                Ok(snapshot) => info!(
                    "Stats: {} total, {} this week, {} today",
                    snapshot.total_txs, snapshot.weekly_txs, snapshot.daily_txs
                ),
                Err(e) => warn!("Failed to record stats snapshot: {:#}", e),
            }

            if !sleep_or_cancel(&cancel, self.interval).await {
                break;
            }
        }

        info!("Stats snapshotter stopped");
        Ok(())
    }

    /// Counts transactions as of `now` (unix seconds) and stores the result.
    pub fn snapshot_at(&self, now: u64) -> Result<StatsSnapshot> {
        self.db.with(|conn| {
            let txs = TransactionRepository::new(conn);
            let snapshot = StatsSnapshot {
                total_txs: txs.count_since(0)?,
                weekly_txs: txs.count_since(now.saturating_sub(WEEK_SECS))?,
                daily_txs: txs.count_since(now.saturating_sub(DAY_SECS))?,
                created_at: now,
            };
            StatsRepository::new(conn).insert(&snapshot)?;
            Ok(snapshot)
        })
    }
}
