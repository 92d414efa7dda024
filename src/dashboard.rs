use tokio::sync::watch;

use crate::risk::RiskAction;
use crate::strategies::GateOutcome;

/// Per-token quote plus the current velocity estimate, as last observed by
/// the strategy loop that owns this market.
#[derive(Clone, Debug, Default)]
pub struct TokenSnapshot {
    pub bid_cents: Option<i64>,
    pub ask_cents: Option<i64>,
    pub velocity: f64,
}

/// Coalesced view of one strategy's state, pushed to a single-slot channel
/// on every loop step. Consumers (a terminal renderer, a future web UI)
/// read only the latest value; pushing never blocks the strategy loop.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub market_slug: String,
    pub strategy: String,
    pub up: TokenSnapshot,
    pub down: TokenSnapshot,
    pub up_position: f64,
    pub down_position: f64,
    pub profit_if_up_cents: f64,
    pub profit_if_down_cents: f64,
    pub trades_this_cycle: u32,
    pub pending_hedges: u32,
    pub risk_action: Option<RiskAction>,
    pub gate_state: GateOutcome,
    pub cycle_end_s: i64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            market_slug: String::new(),
            strategy: String::new(),
            up: TokenSnapshot::default(),
            down: TokenSnapshot::default(),
            up_position: 0.0,
            down_position: 0.0,
            profit_if_up_cents: 0.0,
            profit_if_down_cents: 0.0,
            trades_this_cycle: 0,
            pending_hedges: 0,
            risk_action: None,
            gate_state: GateOutcome::Pass,
            cycle_end_s: 0,
        }
    }
}

/// Single-slot, latest-wins snapshot channel: O(1) push, never blocks.
pub fn new_channel() -> (watch::Sender<Snapshot>, watch::Receiver<Snapshot>) {
    watch::channel(Snapshot::default())
}

/// Overwrite the slot with the latest snapshot. Ignores the "no receivers"
/// error: a dashboard consumer is optional, the strategy loop must never
/// care whether one is attached.
pub fn push(tx: &watch::Sender<Snapshot>, snapshot: Snapshot) {
    let _ = tx.send(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_overwrites_and_latest_wins() {
        let (tx, mut rx) = new_channel();
        push(
            &tx,
            Snapshot {
                market_slug: "btc-updown-15m-1700000000".to_string(),
                trades_this_cycle: 1,
                ..Default::default()
            },
        );
        push(
            &tx,
            Snapshot {
                market_slug: "btc-updown-15m-1700000000".to_string(),
                trades_this_cycle: 2,
                ..Default::default()
            },
        );
        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.trades_this_cycle, 2);
    }

    #[test]
    fn test_push_never_errors_without_receivers() {
        let (tx, rx) = new_channel();
        drop(rx);
        push(&tx, Snapshot::default());
    }
}
