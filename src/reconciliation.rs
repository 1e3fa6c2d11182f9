//! Orphaned-round recovery.
//!
//! A blackjack round that was dealt but never finished still holds the
//! player's stake. After `orphan_timeout_secs` the reconciler refunds the
//! stake and closes the round as `Expired`. The worker runs this on an
//! interval off the request path.

use crate::config::ReconciliationConfig;
use crate::errors::{CasinoResult, ConfigurationError};
use crate::game_store;
use crate::games::BlackjackEngine;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundedRound {
    pub round_id: Uuid,
    pub user_id: u64,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Active rounds looked at
    pub scanned: usize,
    pub refunded: Vec<RefundedRound>,
    /// Still within the timeout, or settled by the player meanwhile
    pub skipped: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn KeyValueStore>,
    blackjack: Arc<BlackjackEngine>,
    config: ReconciliationConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn KeyValueStore>, blackjack: Arc<BlackjackEngine>, config: ReconciliationConfig) -> Self {
        Self {
            store,
            blackjack,
            config,
        }
    }

    /// Refund up to `batch_size` Active rounds older than the timeout,
    /// oldest first
    pub fn reconcile(&self, now: DateTime<Utc>) -> CasinoResult<ReconciliationReport> {
        let cutoff = self.cutoff(now)?;
        let mut report = ReconciliationReport::default();

        for entry in game_store::active_rounds(self.store.as_ref(), self.config.batch_size)? {
            report.scanned += 1;

            // Index is ordered by start time; the rest are younger still
            if entry.created_at > cutoff {
                report.skipped += 1;
                break;
            }

            match self.blackjack.expire(entry.round_id, entry.user_id, cutoff) {
                Ok(Some(amount)) => report.refunded.push(RefundedRound {
                    round_id: entry.round_id,
                    user_id: entry.user_id,
                    amount,
                }),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        round_id = %entry.round_id,
                        user_id = entry.user_id,
                        error = %e,
                        "Failed to refund orphaned round"
                    );
                    report.failed += 1;
                }
            }
        }

        if !report.refunded.is_empty() || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                refunded = report.refunded.len(),
                failed = report.failed,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    fn cutoff(&self, now: DateTime<Utc>) -> CasinoResult<DateTime<Utc>> {
        let secs = self.config.orphan_timeout_secs;
        let invalid = || ConfigurationError::InvalidValue {
            field: "reconciliation.orphan_timeout_secs".to_string(),
            value: secs.to_string(),
            reason: "timeout out of range".to_string(),
        };

        let timeout = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(invalid)?;
        Ok(now.checked_sub_signed(timeout).ok_or_else(invalid)?)
    }
}

/// Runs `Reconciler::reconcile` on a fixed interval until stopped
pub struct ReconciliationWorker {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl ReconciliationWorker {
    pub fn spawn(reconciler: Arc<Reconciler>, interval: Duration) -> Arc<Self> {
        let worker = Arc::new(Self {
            reconciler,
            interval,
            running: Arc::new(AtomicBool::new(true)),
        });

        worker.clone().spawn_task();
        worker
    }

    fn spawn_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                tick.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                // Storage calls block; keep them off the async workers
                let reconciler = self.reconciler.clone();
                match tokio::task::spawn_blocking(move || reconciler.reconcile(Utc::now())).await {
                    Ok(Ok(_report)) => {}
                    Ok(Err(e)) => tracing::warn!("Reconciliation pass failed: {}", e),
                    Err(e) => tracing::warn!("Reconciliation task panicked: {}", e),
                }
            }

            tracing::debug!("Reconciliation worker stopped");
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
