pub mod cyclehedge;
pub mod unifiedarb;
pub mod volmm;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use crate::config::{StrategyConfig, StrategyKind};
use crate::cycle;
use crate::types::{Order, PriceChangedEvent, TokenType};

/// Per-strategy cycle bookkeeping, owned exclusively by that strategy's loop
/// task.
#[derive(Clone, Debug)]
pub struct CycleState {
    pub market_slug: String,
    pub cycle_start_s: i64,
    pub warmup_deadline: Instant,
    pub last_trigger: Option<Instant>,
    pub trades_this_cycle: u32,
    pub first_seen_fill: Option<Instant>,
}

impl CycleState {
    pub fn new(market_slug: String, cycle_start_s: i64, warmup: Duration) -> Self {
        Self {
            market_slug,
            cycle_start_s,
            warmup_deadline: Instant::now() + warmup,
            last_trigger: None,
            trades_this_cycle: 0,
            first_seen_fill: None,
        }
    }

    pub fn reset_cycle(&mut self, new_slug: String, new_cycle_start_s: i64, warmup: Duration) {
        self.market_slug = new_slug;
        self.cycle_start_s = new_cycle_start_s;
        self.warmup_deadline = Instant::now() + warmup;
        self.last_trigger = None;
        self.trades_this_cycle = 0;
        self.first_seen_fill = None;
    }
}

/// Reason a loop step stopped before producing a decision. `None` means all
/// gates passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    CycleWarmup,
    Cooldown(String),
    TradesThisCycleLimit,
    MarketQuality(String),
    PriceStability,
    PendingHedge,
    InventorySkew,
    EndOfCycleProtection,
}

pub struct GateInputs<'a> {
    pub now: Instant,
    pub max_trades_per_cycle: u32,
    pub in_cooldown: bool,
    pub cooldown_reason: &'a str,
    pub market_tradable: bool,
    pub market_quality_reason: &'a str,
    pub price_stable: bool,
    pub has_pending_hedge: bool,
    pub inventory_within_skew_limit: bool,
    pub in_end_protection: bool,
    pub allow_hedging_only_in_end_protection: bool,
}

/// Runs the ordered gate sequence from the loop step algorithm. Stops at the
/// first failing gate. `allow_hedging_only_in_end_protection` lets hedge and
/// flatten decisions (which never open new entries) bypass the end-of-cycle
/// gate, since closeout only forbids new entries.
pub fn run_gates(state: &CycleState, inputs: &GateInputs) -> GateOutcome {
    if inputs.now < state.warmup_deadline {
        return GateOutcome::CycleWarmup;
    }
    if inputs.in_cooldown {
        return GateOutcome::Cooldown(inputs.cooldown_reason.to_string());
    }
    if state.trades_this_cycle >= inputs.max_trades_per_cycle {
        return GateOutcome::TradesThisCycleLimit;
    }
    if !inputs.market_tradable {
        return GateOutcome::MarketQuality(inputs.market_quality_reason.to_string());
    }
    if !inputs.price_stable {
        return GateOutcome::PriceStability;
    }
    if inputs.has_pending_hedge {
        return GateOutcome::PendingHedge;
    }
    if !inputs.inventory_within_skew_limit {
        return GateOutcome::InventorySkew;
    }
    if inputs.in_end_protection && !inputs.allow_hedging_only_in_end_protection {
        return GateOutcome::EndOfCycleProtection;
    }
    GateOutcome::Pass
}

/// A strategy-specific decision, handed to the OMS via `execute`.
#[derive(Clone, Debug)]
pub enum Decision {
    PlaceEntry {
        token_type: TokenType,
        price_cents: i64,
        size: f64,
    },
    PlaceCompleteSet {
        yes_bid_cents: i64,
        no_bid_cents: i64,
        size: f64,
    },
    RequoteMaker {
        token_type: TokenType,
        buy_price_pips: i64,
        sell_price_pips: i64,
        size: f64,
    },
    Flatten,
}

/// Implemented by each concrete strategy. `decide` is pure given the merged
/// market view; all OMS interaction happens in the loop driver after a
/// decision is returned.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Signal fan-in for one strategy's loop task: a coalescing notify plus a
/// merge map of latest per-token-type price events, matching the
/// single-slot-signal-channel + merge-map shape.
pub struct StrategySignal {
    pub notify: Notify,
    pub has_pending: AtomicBool,
    pub merge_map: Mutex<HashMap<TokenType, PriceChangedEvent>>,
}

impl StrategySignal {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            has_pending: AtomicBool::new(false),
            merge_map: Mutex::new(HashMap::new()),
        }
    }

    /// `OnPriceChanged` handler contract: overwrite then non-blocking
    /// notify. Latest-wins is guaranteed by the overwrite regardless of
    /// whether the notify coalesces.
    pub fn on_price_changed(&self, event: PriceChangedEvent) {
        self.merge_map.lock().unwrap().insert(event.token_type, event);
        self.has_pending.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn drain(&self) -> HashMap<TokenType, PriceChangedEvent> {
        self.has_pending.store(false, Ordering::Release);
        std::mem::take(&mut *self.merge_map.lock().unwrap())
    }
}

impl Default for StrategySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one strategy's loop task: waits on the signal, an optional
/// re-quote ticker, and incoming order updates, then runs the step
/// algorithm. `step` is supplied by the caller since concrete decision logic
/// lives in each strategy module; this function owns only the scheduling
/// shape common to every strategy.
pub async fn run_strategy_loop<F>(
    signal: Arc<StrategySignal>,
    mut order_updates: mpsc::Receiver<Order>,
    requote_interval: Option<Duration>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    mut step: F,
) where
    F: FnMut(HashMap<TokenType, PriceChangedEvent>, Vec<Order>),
{
    let mut ticker = requote_interval.map(tokio::time::interval);

    loop {
        let mut updates = Vec::new();

        tokio::select! {
            _ = signal.notify.notified() => {}
            maybe_order = order_updates.recv() => {
                match maybe_order {
                    Some(order) => updates.push(order),
                    None => break,
                }
            }
            _ = async {
                if let Some(t) = ticker.as_mut() {
                    t.tick().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }

        while let Ok(order) = order_updates.try_recv() {
            updates.push(order);
        }

        let merged = signal.drain();
        step(merged, updates);
    }
}

/// Builder-map from strategy kind to an instantiated strategy, enforcing
/// that `cyclehedge` and `unifiedarb` never both claim exclusive hedge
/// ownership of the same market slug prefix (an open question resolved in
/// the grounding ledger, not left undefined at runtime).
pub struct StrategyRegistry {
    claimed_prefixes: Mutex<HashMap<String, &'static str>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            claimed_prefixes: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, config: &StrategyConfig) -> Result<(), String> {
        let exclusive = matches!(config.kind, StrategyKind::CycleHedge | StrategyKind::UnifiedArb);
        if !exclusive {
            return Ok(());
        }

        let mut claimed = self.claimed_prefixes.lock().unwrap();
        let kind_name = match config.kind {
            StrategyKind::CycleHedge => "cyclehedge",
            StrategyKind::UnifiedArb => "unifiedarb",
            StrategyKind::VolMm => unreachable!(),
        };

        match claimed.get(&config.market_slug_prefix) {
            Some(existing) if *existing != kind_name => Err(format!(
                "market slug prefix '{}' is already claimed by '{}', cannot also register '{}': \
                 cyclehedge and unifiedarb both claim exclusive hedge ownership and cannot coexist \
                 on the same market",
                config.market_slug_prefix, existing, kind_name
            )),
            _ => {
                claimed.insert(config.market_slug_prefix.clone(), kind_name);
                info!(prefix = %config.market_slug_prefix, kind = kind_name, "strategy registered");
                Ok(())
            }
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_decision_gated(strategy: &str, outcome: &GateOutcome) {
    match outcome {
        GateOutcome::Pass => {}
        other => warn!(strategy, ?other, "loop step gated"),
    }
}

/// Reference used only by `run_gates`'s callers to check cycle-end
/// closeout, threading through `cycle::in_end_protection`.
pub fn in_end_protection(now_s: i64, cycle_start_s: i64, cycle_len_s: i64, cutoff_s: i64) -> bool {
    cycle::in_end_protection(now_s, cycle_start_s, cycle_len_s, cutoff_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> GateInputs<'static> {
        GateInputs {
            now: Instant::now() + Duration::from_secs(10),
            max_trades_per_cycle: 5,
            in_cooldown: false,
            cooldown_reason: "",
            market_tradable: true,
            market_quality_reason: "",
            price_stable: true,
            has_pending_hedge: false,
            inventory_within_skew_limit: true,
            in_end_protection: false,
            allow_hedging_only_in_end_protection: false,
        }
    }

    #[test]
    fn test_gates_pass_when_all_clear() {
        let state = CycleState::new("m".to_string(), 0, Duration::from_secs(0));
        let inputs = base_inputs();
        assert_eq!(run_gates(&state, &inputs), GateOutcome::Pass);
    }

    #[test]
    fn test_warmup_gate_blocks_before_deadline() {
        let state = CycleState::new("m".to_string(), 0, Duration::from_secs(60));
        let inputs = base_inputs();
        assert_eq!(run_gates(&state, &inputs), GateOutcome::CycleWarmup);
    }

    #[test]
    fn test_cooldown_gate_blocks_new_entries() {
        let state = CycleState::new("m".to_string(), 0, Duration::from_secs(0));
        let mut inputs = base_inputs();
        inputs.in_cooldown = true;
        inputs.cooldown_reason = "budget exhausted";
        assert_eq!(
            run_gates(&state, &inputs),
            GateOutcome::Cooldown("budget exhausted".to_string())
        );
    }

    #[test]
    fn test_trades_this_cycle_limit() {
        let mut state = CycleState::new("m".to_string(), 0, Duration::from_secs(0));
        state.trades_this_cycle = 5;
        let inputs = base_inputs();
        assert_eq!(run_gates(&state, &inputs), GateOutcome::TradesThisCycleLimit);
    }

    #[test]
    fn test_end_protection_blocks_unless_hedge_only() {
        let state = CycleState::new("m".to_string(), 0, Duration::from_secs(0));
        let mut inputs = base_inputs();
        inputs.in_end_protection = true;
        assert_eq!(run_gates(&state, &inputs), GateOutcome::EndOfCycleProtection);
        inputs.allow_hedging_only_in_end_protection = true;
        assert_eq!(run_gates(&state, &inputs), GateOutcome::Pass);
    }

    #[test]
    fn test_registry_rejects_conflicting_exclusive_strategies() {
        let registry = StrategyRegistry::new();
        let cyclehedge_cfg = StrategyConfig::test_default(StrategyKind::CycleHedge, "btc-updown-");
        let unifiedarb_cfg = StrategyConfig::test_default(StrategyKind::UnifiedArb, "btc-updown-");
        registry.register(&cyclehedge_cfg).unwrap();
        let result = registry.register(&unifiedarb_cfg);
        assert!(result.is_err());
    }

    #[test]
    fn test_registry_allows_same_kind_reregistration() {
        let registry = StrategyRegistry::new();
        let cfg = StrategyConfig::test_default(StrategyKind::CycleHedge, "eth-updown-");
        registry.register(&cfg).unwrap();
        assert!(registry.register(&cfg).is_ok());
    }

    #[test]
    fn test_registry_allows_volmm_alongside_cyclehedge_on_same_prefix() {
        let registry = StrategyRegistry::new();
        let cyclehedge_cfg = StrategyConfig::test_default(StrategyKind::CycleHedge, "sol-updown-");
        let volmm_cfg = StrategyConfig::test_default(StrategyKind::VolMm, "sol-updown-");
        registry.register(&cyclehedge_cfg).unwrap();
        assert!(registry.register(&volmm_cfg).is_ok());
    }
}
