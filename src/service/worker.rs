use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::state_machine::ChargeStateMachine;
use crate::{
    domain::{Charge, ChargeFilter, ChargeStatus},
    error::Result,
    repository::ChargeRepository,
};

/// Periodically advances every open charge so settlement does not depend on
/// clients polling.
pub struct SettlementWorker {
    machine: Arc<ChargeStateMachine>,
    charges: Arc<dyn ChargeRepository>,
    interval: Duration,
    batch_size: i64,
}

impl SettlementWorker {
    pub fn new(
        machine: Arc<ChargeStateMachine>,
        charges: Arc<dyn ChargeRepository>,
        interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            machine,
            charges,
            interval,
            batch_size,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!("settlement tick failed: {}", e);
                }
            }
        })
    }

    /// One pass over every open charge, advanced `batch_size` at a time.
    /// Returns how many changed status.
    pub async fn run_once(&self) -> Result<usize> {
        let open = self.open_charges().await?;

        let mut changed = 0;
        for batch in open.chunks(self.batch_size.max(1) as usize) {
            let results =
                join_all(batch.iter().map(|charge| self.machine.advance(charge.id))).await;
            for (before, result) in batch.iter().zip(results) {
                match result {
                    Ok(after) if after.status != before.status => changed += 1,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(charge_id = %before.id, "advance failed: {}", e),
                }
            }
        }

        if changed > 0 {
            tracing::debug!(scanned = open.len(), changed, "settlement tick");
        }
        Ok(changed)
    }

    /// Snapshot of all pending and processing charges, read page by page so
    /// charges that never settle cannot hide older ones.
    async fn open_charges(&self) -> Result<Vec<Charge>> {
        let mut open = Vec::new();
        for status in [ChargeStatus::Pending, ChargeStatus::Processing] {
            let mut offset = 0;
            loop {
                let filter = ChargeFilter {
                    status: Some(status),
                    limit: Some(self.batch_size),
                    offset: Some(offset),
                    ..Default::default()
                };
                let page = self.charges.list(&filter).await?;
                if page.is_empty() {
                    break;
                }
                offset += page.len() as i64;
                open.extend(page);
            }
        }
        Ok(open)
    }
}
