use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{error, warn};

/// Current action the risk manager is taking for a given entry, published
/// on the dashboard snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskAction {
    Idle,
    Canceling,
    Reordering,
    AggressiveHedging,
    FakEating,
}

#[derive(Clone, Debug)]
pub struct RepriceLogEntry {
    pub entry_order_id: u64,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    pub strategy: String,
    pub profit_cents_after_reprice: i64,
}

#[derive(Clone, Debug, Default)]
pub struct RiskManagementStatus {
    pub open_exposures: usize,
    pub current_action: Option<RiskAction>,
    pub last_reprice: Option<RepriceLogEntry>,
    pub total_reorders: u64,
    pub total_aggressive_hedges: u64,
    pub total_fatal_exposures: u64,
}

impl RiskManagementStatus {
    pub fn new() -> Self {
        Self {
            current_action: Some(RiskAction::Idle),
            ..Default::default()
        }
    }
}

/// One tracked exposure as seen by the risk manager: just enough to decide
/// whether to escalate, independent of the OMS's own bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct ExposureSnapshot {
    pub entry_order_id: u64,
    pub entry_filled_at: Instant,
    pub hedge_filled: bool,
    pub entry_cost_cents: i64,
    pub opposing_bid_cents: i64,
}

impl ExposureSnapshot {
    pub fn exposure_seconds(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.entry_filled_at).as_secs_f64()
    }

    /// Loss if forced to hedge right now at the current opposing bid:
    /// buying the complement at `opposing_bid_cents` after already paying
    /// `entry_cost_cents` for the entry leg costs `entry + (100 - bid)`
    /// cents per pair versus the guaranteed $1 payout.
    pub fn max_loss_cents(&self) -> i64 {
        (self.entry_cost_cents + (100 - self.opposing_bid_cents)) - 100
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationDecision {
    Authorize,
    Hold,
}

/// Decide whether an exposure should be escalated to aggressive hedging,
/// per the risk manager's per-tick review.
pub fn evaluate_exposure(
    snapshot: &ExposureSnapshot,
    now: Instant,
    aggressive_hedge_timeout_s: f64,
    max_acceptable_loss_cents: i64,
) -> Option<EscalationDecision> {
    if snapshot.hedge_filled {
        return None;
    }
    if snapshot.exposure_seconds(now) < aggressive_hedge_timeout_s {
        return None;
    }
    if snapshot.max_loss_cents() <= max_acceptable_loss_cents {
        Some(EscalationDecision::Authorize)
    } else {
        Some(EscalationDecision::Hold)
    }
}

/// Ticks on a configurable interval reviewing every tracked exposure. Holds
/// only its own status snapshot under a mutex; it never touches the OMS's
/// internal maps directly, it only reads `ExposureSnapshot`s handed to it by
/// the strategy loop and returns escalation decisions for the loop to act on.
pub struct RiskManager {
    status: Mutex<RiskManagementStatus>,
    pub check_interval: Duration,
    pub aggressive_hedge_timeout_s: f64,
    pub max_acceptable_loss_cents: i64,
}

impl RiskManager {
    pub fn new(check_interval: Duration, aggressive_hedge_timeout_s: f64, max_acceptable_loss_cents: i64) -> Self {
        Self {
            status: Mutex::new(RiskManagementStatus::new()),
            check_interval,
            aggressive_hedge_timeout_s,
            max_acceptable_loss_cents,
        }
    }

    pub fn status(&self) -> RiskManagementStatus {
        self.status.lock().unwrap().clone()
    }

    /// Review one tick's worth of exposures, returning the subset that
    /// should be escalated. Holds for the `Hold` branch are logged as fatal
    /// exposure since the loss cap would be breached if forced to hedge now.
    pub fn review(&self, exposures: &[ExposureSnapshot], now: Instant) -> Vec<(u64, EscalationDecision)> {
        let mut results = Vec::new();
        let mut status = self.status.lock().unwrap();
        status.open_exposures = exposures.iter().filter(|e| !e.hedge_filled).count();

        let mut action = RiskAction::Idle;
        for exposure in exposures {
            match evaluate_exposure(exposure, now, self.aggressive_hedge_timeout_s, self.max_acceptable_loss_cents) {
                Some(EscalationDecision::Authorize) => {
                    action = RiskAction::AggressiveHedging;
                    status.total_aggressive_hedges += 1;
                    warn!(
                        entry_order_id = exposure.entry_order_id,
                        exposure_s = exposure.exposure_seconds(now),
                        "escalating to aggressive hedge"
                    );
                    results.push((exposure.entry_order_id, EscalationDecision::Authorize));
                }
                Some(EscalationDecision::Hold) => {
                    status.total_fatal_exposures += 1;
                    error!(
                        entry_order_id = exposure.entry_order_id,
                        loss_cents = exposure.max_loss_cents(),
                        "fatal exposure: holding, loss exceeds cap"
                    );
                    results.push((exposure.entry_order_id, EscalationDecision::Hold));
                }
                None => {}
            }
        }
        status.current_action = Some(action);
        results
    }

    pub fn record_reprice(&self, entry: RepriceLogEntry) {
        let mut status = self.status.lock().unwrap();
        status.total_reorders += 1;
        status.current_action = Some(RiskAction::Reordering);
        status.last_reprice = Some(entry);
    }
}
