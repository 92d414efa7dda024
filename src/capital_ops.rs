use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::settlement::SettlementClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStatus {
    Idle,
    Merging,
    Completed,
    Failed,
}

#[derive(Clone, Debug)]
struct MarketMergeState {
    status: MergeStatus,
    tx_ref: Option<String>,
}

/// Decides when `min(up, down)` shares are worth burning for $1 each and
/// drives the settlement client, enforcing at most one merge in flight per
/// market. Holds its own small state table; does not touch OMS positions
/// directly, the strategy loop supplies them each check.
pub struct CapitalOps {
    settlement: Arc<dyn SettlementClient>,
    auto_merge_min_shares: f64,
    state: Mutex<HashMap<String, MarketMergeState>>,
}

impl CapitalOps {
    pub fn new(settlement: Arc<dyn SettlementClient>, auto_merge_min_shares: f64) -> Self {
        Self {
            settlement,
            auto_merge_min_shares,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn merge_status(&self, market_slug: &str) -> MergeStatus {
        self.state
            .lock()
            .unwrap()
            .get(market_slug)
            .map(|s| s.status)
            .unwrap_or(MergeStatus::Idle)
    }

    pub fn tx_ref(&self, market_slug: &str) -> Option<String> {
        self.state.lock().unwrap().get(market_slug).and_then(|s| s.tx_ref.clone())
    }

    /// True when `min(up, down) >= autoMergeMinShares` and no merge is
    /// already in flight for this market.
    pub fn should_trigger(&self, market_slug: &str, up_shares: f64, down_shares: f64) -> bool {
        let mergeable = up_shares.min(down_shares);
        if mergeable < self.auto_merge_min_shares {
            return false;
        }
        !matches!(self.merge_status(market_slug), MergeStatus::Merging)
    }

    /// Triggers a merge if eligible; no-op (returns `false`) otherwise.
    /// Shares are converted to pips (the settlement contract's integer
    /// notional unit) at the caller's configured decimals.
    pub async fn try_merge(&self, market_slug: &str, condition_id_hex: &str, up_shares: f64, down_shares: f64) -> bool {
        if !self.should_trigger(market_slug, up_shares, down_shares) {
            return false;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.insert(
                market_slug.to_string(),
                MarketMergeState {
                    status: MergeStatus::Merging,
                    tx_ref: None,
                },
            );
        }

        let mergeable_shares = up_shares.min(down_shares);
        let shares_pips = (mergeable_shares * 10_000.0).round() as u64;

        match self.settlement.auto_merge(market_slug, condition_id_hex, shares_pips).await {
            Ok(tx) => {
                info!(%market_slug, tx = %tx.transaction_hash, mergeable_shares, "auto-merge completed");
                let mut state = self.state.lock().unwrap();
                state.insert(
                    market_slug.to_string(),
                    MarketMergeState {
                        status: MergeStatus::Completed,
                        tx_ref: Some(tx.transaction_hash),
                    },
                );
                true
            }
            Err(e) => {
                warn!(%market_slug, error = %e, "auto-merge failed");
                let mut state = self.state.lock().unwrap();
                state.insert(
                    market_slug.to_string(),
                    MarketMergeState {
                        status: MergeStatus::Failed,
                        tx_ref: None,
                    },
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult};
    use crate::settlement::TxRef;
    use async_trait::async_trait;

    struct MockSettlement {
        fail: bool,
    }

    #[async_trait]
    impl SettlementClient for MockSettlement {
        async fn auto_merge(&self, _market_slug: &str, _condition_id_hex: &str, shares_pips: u64) -> EngineResult<TxRef> {
            if self.fail {
                Err(EngineError::Transient("mock fail".to_string()))
            } else {
                Ok(TxRef {
                    transaction_hash: format!("0xmock-{shares_pips}"),
                    block_number: 1,
                })
            }
        }
    }

    #[test]
    fn test_should_trigger_below_threshold() {
        let ops = CapitalOps::new(Arc::new(MockSettlement { fail: false }), 5.0);
        assert!(!ops.should_trigger("m", 4.9, 10.0));
    }

    #[test]
    fn test_should_trigger_at_threshold() {
        let ops = CapitalOps::new(Arc::new(MockSettlement { fail: false }), 5.0);
        assert!(ops.should_trigger("m", 5.0, 10.0));
    }

    #[tokio::test]
    async fn test_try_merge_completes_and_records_tx() {
        let ops = CapitalOps::new(Arc::new(MockSettlement { fail: false }), 5.0);
        let triggered = ops.try_merge("m", "0xabc", 10.0, 6.0).await;
        assert!(triggered);
        assert_eq!(ops.merge_status("m"), MergeStatus::Completed);
        assert!(ops.tx_ref("m").is_some());
    }

    #[tokio::test]
    async fn test_try_merge_failure_marks_failed() {
        let ops = CapitalOps::new(Arc::new(MockSettlement { fail: true }), 5.0);
        let triggered = ops.try_merge("m", "0xabc", 10.0, 6.0).await;
        assert!(!triggered);
        assert_eq!(ops.merge_status("m"), MergeStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_double_merge_while_in_flight() {
        let ops = CapitalOps::new(Arc::new(MockSettlement { fail: false }), 5.0);
        assert!(ops.should_trigger("m", 10.0, 6.0));
        ops.try_merge("m", "0xabc", 10.0, 6.0).await;
        // after completion status is Completed, not Merging, so a fresh
        // eligible balance can still trigger another merge
        assert!(ops.should_trigger("m", 10.0, 6.0));
    }
}
