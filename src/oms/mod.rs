pub mod entry_hedge;
pub mod limiter;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeClient;
use crate::types::{Order, OrderKind, OrderSide, OrderStatus, Pips, Position, TokenType};

use entry_hedge::{reprice_hedge, EntryBudgets, EntryHedgeState, RepriceDecision, TrackedEntry};
use limiter::InFlightLimiter;

/// Market cooldown record: forbids new entries until `until`, but never
/// blocks hedging/flatten actions for existing exposures (cooldowns are
/// advisory).
#[derive(Clone, Copy, Debug)]
struct Cooldown {
    until: Instant,
    reason: &'static str,
}

pub struct MultiLegRequest {
    pub legs: Vec<(TokenType, OrderSide, Pips, f64, OrderKind)>,
    pub market_slug: String,
    /// If true, legs are placed sequentially and a leg is only submitted
    /// once the previous one is acknowledged; otherwise legs race in
    /// parallel.
    pub sequential: bool,
}

/// Owns order state exclusively; only the loop task that drives a strategy
/// mutates it. Mutex sections below are short record-mutation handoffs,
/// never held across exchange I/O.
pub struct Oms {
    exchange: Arc<dyn ExchangeClient>,
    orders: Mutex<HashMap<u64, Order>>,
    tracked: Mutex<HashMap<u64, TrackedEntry>>,
    cooldowns: Mutex<HashMap<String, Cooldown>>,
    cancel_all_last: Mutex<HashMap<String, Instant>>,
    positions: Mutex<HashMap<(String, TokenType), Position>>,
    next_id: std::sync::atomic::AtomicU64,
    pub limiter: InFlightLimiter,
    cancel_all_throttle: Duration,
    per_entry_cooldown: Duration,
}

impl Oms {
    pub fn new(exchange: Arc<dyn ExchangeClient>, in_flight_max: usize, cancel_all_throttle: Duration, per_entry_cooldown: Duration) -> Self {
        Self {
            exchange,
            orders: Mutex::new(HashMap::new()),
            tracked: Mutex::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            cancel_all_last: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
            limiter: InFlightLimiter::new(in_flight_max),
            cancel_all_throttle,
            per_entry_cooldown,
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Submit a new order. On failure, the exchange client's error is
    /// classified (transient vs. rejected) by the client itself; the OMS
    /// releases the in-flight permit either way.
    pub async fn place(
        &self,
        market_slug: &str,
        token_type: TokenType,
        side: OrderSide,
        price: Pips,
        size: f64,
        kind: OrderKind,
        is_entry_order: bool,
    ) -> EngineResult<Order> {
        let _permit = self.limiter.try_acquire().ok_or_else(|| {
            EngineError::Transient("in-flight limiter saturated".to_string())
        })?;

        let id = self.alloc_id();
        let order = Order {
            id,
            market_slug: market_slug.to_string(),
            token_type,
            side,
            price,
            size,
            kind,
            status: OrderStatus::Pending,
            filled_size: 0.0,
            created_at: Instant::now(),
            hedge_order_id: None,
            is_entry_order,
        };

        let created = self.exchange.place_order(order).await?;
        self.orders.lock().unwrap().insert(id, created.clone());
        info!(order_id = id, %market_slug, ?token_type, ?side, price = created.price.0, "order placed");
        Ok(created)
    }

    pub async fn cancel(&self, order_id: u64) -> EngineResult<()> {
        let terminal = self
            .orders
            .lock()
            .unwrap()
            .get(&order_id)
            .map(|o| o.status.is_terminal())
            .unwrap_or(true);
        if terminal {
            return Ok(());
        }
        self.exchange.cancel_order(order_id).await?;
        if let Some(o) = self.orders.lock().unwrap().get_mut(&order_id) {
            o.status = OrderStatus::Canceled;
        }
        Ok(())
    }

    /// Throttled to at most once per `cancel_all_throttle` per market to
    /// avoid REST storms.
    pub async fn cancel_all_for_market(&self, market_slug: &str) -> EngineResult<()> {
        {
            let mut last = self.cancel_all_last.lock().unwrap();
            let now = Instant::now();
            if let Some(prev) = last.get(market_slug) {
                if now.duration_since(*prev) < self.cancel_all_throttle {
                    return Ok(());
                }
            }
            last.insert(market_slug.to_string(), now);
        }
        self.exchange.cancel_orders_for_market(market_slug).await?;
        let mut orders = self.orders.lock().unwrap();
        for o in orders.values_mut() {
            if o.market_slug == market_slug && !o.status.is_terminal() {
                o.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    /// Applied from the exchange stream. Filled-size deltas are clamped to
    /// be non-negative (decreases are treated as zero delta — no negative
    /// accounting) and re-applying the same update is a no-op. Any new
    /// fill delta is folded into the (market, token) position: buys add
    /// shares, sells (maker exits) remove them, both at the order's price.
    pub fn on_order_update(&self, update: Order) {
        let (market_slug, token_type, side, price) = (update.market_slug.clone(), update.token_type, update.side, update.price);
        let delta = {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(&update.id) {
                Some(existing) => {
                    let delta = (update.filled_size - existing.filled_size).max(0.0);
                    if update.filled_size > existing.filled_size {
                        existing.filled_size = update.filled_size;
                    }
                    existing.status = update.status;
                    delta
                }
                None => {
                    let delta = update.filled_size.max(0.0);
                    orders.insert(update.id, update);
                    delta
                }
            }
        };
        if delta > 0.0 {
            self.apply_fill(market_slug, token_type, delta, price, side);
        }
    }

    fn apply_fill(&self, market_slug: String, token_type: TokenType, size: f64, price: Pips, side: OrderSide) {
        let signed_size = match side {
            OrderSide::Buy => size,
            OrderSide::Sell => -size,
        };
        self.positions
            .lock()
            .unwrap()
            .entry((market_slug, token_type))
            .or_default()
            .on_fill(signed_size, price.to_decimal());
    }

    /// Net position for one (market, token), defaulting to empty.
    pub fn position_for(&self, market_slug: &str, token_type: TokenType) -> Position {
        self.positions
            .lock()
            .unwrap()
            .get(&(market_slug.to_string(), token_type))
            .copied()
            .unwrap_or_default()
    }

    /// `getOpenPositionsForMarket`: every non-empty UP/DOWN position held in
    /// this market, derived purely from fills the OMS has already applied
    /// (there's no separate exchange-side position query — the OMS is the
    /// single owner of this derived state, see `exchange::ExchangeClient`'s
    /// doc comment).
    pub fn open_positions_for_market(&self, market_slug: &str) -> Vec<(TokenType, Position)> {
        self.positions
            .lock()
            .unwrap()
            .iter()
            .filter(|((slug, _), pos)| slug == market_slug && pos.net_size > 0.0)
            .map(|((_, token), pos)| (*token, *pos))
            .collect()
    }

    pub fn begin_tracked_entry(
        &self,
        entry_order_id: u64,
        entry_cost_cents: i64,
        target_profit_cents: i64,
        max_hedge_reorders: u32,
        max_hedge_cancels: u32,
        max_hedge_fak: u32,
        max_age: Duration,
    ) {
        self.tracked.lock().unwrap().insert(
            entry_order_id,
            TrackedEntry {
                entry_order_id,
                hedge_order_id: None,
                state: EntryHedgeState::EntryLive,
                budgets: EntryBudgets::new(max_hedge_reorders, max_hedge_cancels, max_hedge_fak),
                entry_cost_cents,
                target_profit_cents,
                created_at: Instant::now(),
                entry_filled_at: None,
                max_age,
            },
        );
    }

    pub fn mark_entry_filled(&self, entry_order_id: u64) {
        let mut tracked = self.tracked.lock().unwrap();
        if let Some(t) = tracked.get_mut(&entry_order_id) {
            t.state = EntryHedgeState::EntryFilled;
            t.entry_filled_at = Some(Instant::now());
        }
    }

    pub fn attach_hedge_order(&self, entry_order_id: u64, hedge_order_id: u64) {
        let mut tracked = self.tracked.lock().unwrap();
        if let Some(t) = tracked.get_mut(&entry_order_id) {
            t.hedge_order_id = Some(hedge_order_id);
            t.state = EntryHedgeState::HedgePlacing;
        }
    }

    pub fn mark_hedge_live(&self, entry_order_id: u64) {
        let mut tracked = self.tracked.lock().unwrap();
        if let Some(t) = tracked.get_mut(&entry_order_id) {
            t.state = EntryHedgeState::HedgeLive;
        }
    }

    pub fn mark_hedged(&self, entry_order_id: u64) {
        let mut tracked = self.tracked.lock().unwrap();
        tracked.remove(&entry_order_id);
    }

    /// Whether any tracked entry for this market has an unfilled hedge.
    pub fn has_unhedged_risk(&self, market_slug: &str) -> bool {
        let orders = self.orders.lock().unwrap();
        self.tracked.lock().unwrap().values().any(|t| {
            t.is_unhedged()
                && orders
                    .get(&t.entry_order_id)
                    .map(|o| o.market_slug == market_slug)
                    .unwrap_or(false)
        })
    }

    /// Entry order id, hedge token, entry cost, and fill time for every
    /// tracked entry in `market_slug` that isn't fully hedged yet. Feeds the
    /// risk manager's per-tick review without handing it the tracked map
    /// directly.
    pub fn unhedged_exposures(&self, market_slug: &str) -> Vec<(u64, TokenType, i64, Instant)> {
        let orders = self.orders.lock().unwrap();
        self.tracked
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_unhedged())
            .filter_map(|t| {
                let entry = orders.get(&t.entry_order_id)?;
                if entry.market_slug != market_slug {
                    return None;
                }
                let filled_at = t.entry_filled_at?;
                Some((t.entry_order_id, entry.token_type.opposite(), t.entry_cost_cents, filled_at))
            })
            .collect()
    }

    pub fn is_market_in_cooldown(&self, market_slug: &str) -> (bool, f64, String) {
        match self.cooldowns.lock().unwrap().get(market_slug) {
            Some(c) => {
                let now = Instant::now();
                if now >= c.until {
                    (false, 0.0, String::new())
                } else {
                    (true, c.until.duration_since(now).as_secs_f64(), c.reason.to_string())
                }
            }
            None => (false, 0.0, String::new()),
        }
    }

    fn put_market_in_cooldown(&self, market_slug: &str, reason: &'static str) {
        warn!(%market_slug, reason, "market entering cooldown");
        self.cooldowns.lock().unwrap().insert(
            market_slug.to_string(),
            Cooldown {
                until: Instant::now() + self.per_entry_cooldown,
                reason,
            },
        );
    }

    /// On `hedgeReorderTimeoutSeconds`/`hedgeTimeoutFakSeconds` expiry:
    /// cancel the stale hedge, compute the next hedge action via
    /// `reprice_hedge`, and apply it if budget remains. Exceeding any budget
    /// places the market in cooldown.
    pub async fn reprice_or_escalate_hedge(
        &self,
        entry_order_id: u64,
        market_slug: &str,
        token_type: TokenType,
        opposing_ask_cents: i64,
        max_negative_profit_cents: i64,
        size: f64,
    ) -> EngineResult<Option<Order>> {
        let (entry_cost, target_profit, can_reorder, can_fak, hedge_order_id) = {
            let tracked = self.tracked.lock().unwrap();
            let t = match tracked.get(&entry_order_id) {
                Some(t) => t,
                None => return Ok(None),
            };
            (
                t.entry_cost_cents,
                t.target_profit_cents,
                t.budgets.can_reorder(),
                t.budgets.can_fak(),
                t.hedge_order_id,
            )
        };

        if let Some(hedge_id) = hedge_order_id {
            if self.tracked.lock().unwrap().get(&entry_order_id).map(|t| t.budgets.can_cancel()).unwrap_or(false) {
                self.cancel(hedge_id).await?;
                if let Some(t) = self.tracked.lock().unwrap().get_mut(&entry_order_id) {
                    t.budgets.record_cancel();
                }
            }
        }

        let decision = reprice_hedge(entry_cost, target_profit, opposing_ask_cents, max_negative_profit_cents);

        let (kind, price_cents, is_fak) = match decision {
            RepriceDecision::PostIdeal { price_cents } => {
                if !can_reorder {
                    self.put_market_in_cooldown(market_slug, "hedge reorder budget exhausted");
                    return Ok(None);
                }
                (OrderKind::Gtc, price_cents, false)
            }
            RepriceDecision::FallbackMaker { price_cents } => {
                if !can_reorder {
                    self.put_market_in_cooldown(market_slug, "hedge reorder budget exhausted");
                    return Ok(None);
                }
                (OrderKind::Gtc, price_cents, false)
            }
            RepriceDecision::EscalateFak { price_cents } => {
                if !can_fak {
                    self.put_market_in_cooldown(market_slug, "hedge FAK budget exhausted");
                    return Ok(None);
                }
                (OrderKind::Fak, price_cents, true)
            }
        };

        let new_hedge = self
            .place(
                market_slug,
                token_type,
                OrderSide::Buy,
                Pips::from_cents(price_cents),
                size,
                kind,
                false,
            )
            .await?;

        if let Some(t) = self.tracked.lock().unwrap().get_mut(&entry_order_id) {
            if is_fak {
                t.budgets.record_fak();
                t.state = EntryHedgeState::HedgeAggressive;
            } else {
                t.budgets.record_reorder();
                t.state = EntryHedgeState::HedgePlacing;
            }
            t.hedge_order_id = Some(new_hedge.id);
            if t.budgets.exhausted() {
                self.put_market_in_cooldown(market_slug, "per-entry budget exhausted");
            }
        }

        Ok(Some(new_hedge))
    }

    pub async fn execute_multi_leg(&self, request: MultiLegRequest) -> EngineResult<Vec<Order>> {
        let mut placed = Vec::with_capacity(request.legs.len());
        if request.sequential {
            for (token_type, side, price, size, kind) in request.legs {
                let order = self
                    .place(&request.market_slug, token_type, side, price, size, kind, true)
                    .await?;
                placed.push(order);
            }
        } else {
            use futures_util::future::join_all;
            let futs = request.legs.into_iter().map(|(token_type, side, price, size, kind)| {
                self.place(&request.market_slug, token_type, side, price, size, kind, true)
            });
            for result in join_all(futs).await {
                placed.push(result?);
            }
        }
        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::dry_run::DryRunExchange;

    fn test_oms() -> Oms {
        let ex = Arc::new(DryRunExchange::new());
        Oms::new(ex, 8, Duration::from_secs(2), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_place_and_cancel_roundtrip() {
        let oms = test_oms();
        let order = oms
            .place(
                "btc-updown-15m-1700000000",
                TokenType::Up,
                OrderSide::Buy,
                Pips::from_cents(50),
                10.0,
                OrderKind::Gtc,
                true,
            )
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        oms.cancel(order.id).await.unwrap();
        oms.cancel(order.id).await.unwrap(); // idempotent
    }

    #[tokio::test]
    async fn test_unhedged_risk_detection() {
        let oms = test_oms();
        let entry = oms
            .place(
                "btc-updown-15m-1700000000",
                TokenType::Up,
                OrderSide::Buy,
                Pips::from_cents(70),
                10.0,
                OrderKind::Fak,
                true,
            )
            .await
            .unwrap();
        oms.begin_tracked_entry(entry.id, 70, 1, 3, 6, 1, Duration::from_secs(120));
        oms.mark_entry_filled(entry.id);
        assert!(oms.has_unhedged_risk("btc-updown-15m-1700000000"));

        let hedge = oms
            .place(
                "btc-updown-15m-1700000000",
                TokenType::Down,
                OrderSide::Buy,
                Pips::from_cents(29),
                10.0,
                OrderKind::Gtc,
                false,
            )
            .await
            .unwrap();
        oms.attach_hedge_order(entry.id, hedge.id);
        oms.mark_hedged(entry.id);
        assert!(!oms.has_unhedged_risk("btc-updown-15m-1700000000"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_triggers_cooldown() {
        let oms = test_oms();
        let entry = oms
            .place(
                "btc-updown-15m-1700000000",
                TokenType::Up,
                OrderSide::Buy,
                Pips::from_cents(70),
                10.0,
                OrderKind::Fak,
                true,
            )
            .await
            .unwrap();
        // max_hedge_reorders=1 so the first reprice already exhausts budget
        oms.begin_tracked_entry(entry.id, 70, 1, 1, 6, 1, Duration::from_secs(120));
        oms.mark_entry_filled(entry.id);
        let hedge = oms
            .place(
                "btc-updown-15m-1700000000",
                TokenType::Down,
                OrderSide::Buy,
                Pips::from_cents(29),
                10.0,
                OrderKind::Gtc,
                false,
            )
            .await
            .unwrap();
        oms.attach_hedge_order(entry.id, hedge.id);
        oms.mark_hedge_live(entry.id);

        oms.reprice_or_escalate_hedge(entry.id, "btc-updown-15m-1700000000", TokenType::Down, 28, 5, 10.0)
            .await
            .unwrap();

        let (in_cooldown, _, _) = oms.is_market_in_cooldown("btc-updown-15m-1700000000");
        assert!(in_cooldown);
    }

    #[tokio::test]
    async fn test_cancel_all_for_market_clears_open_orders() {
        let oms = test_oms();
        let o1 = oms
            .place("m", TokenType::Up, OrderSide::Buy, Pips::from_cents(50), 1.0, OrderKind::Gtc, true)
            .await
            .unwrap();
        oms.cancel_all_for_market("m").await.unwrap();
        let orders = oms.orders.lock().unwrap();
        assert_eq!(orders.get(&o1.id).unwrap().status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_all_is_throttled() {
        let oms = test_oms();
        oms.cancel_all_for_market("m").await.unwrap();
        // immediate second call should be a no-op (throttled), not error
        oms.cancel_all_for_market("m").await.unwrap();
    }

    #[tokio::test]
    async fn test_fak_fill_accumulates_position() {
        let oms = test_oms();
        let order = oms
            .place("m", TokenType::Up, OrderSide::Buy, Pips::from_cents(60), 10.0, OrderKind::Fak, true)
            .await
            .unwrap();
        oms.on_order_update(order.clone());
        let pos = oms.position_for("m", TokenType::Up);
        assert_eq!(pos.net_size, 10.0);
        assert!((pos.avg_price() - 0.60).abs() < 1e-9);
        assert_eq!(oms.open_positions_for_market("m"), vec![(TokenType::Up, pos)]);
    }

    #[tokio::test]
    async fn test_reapplying_same_update_does_not_double_count() {
        let oms = test_oms();
        let order = oms
            .place("m", TokenType::Down, OrderSide::Buy, Pips::from_cents(40), 5.0, OrderKind::Fak, true)
            .await
            .unwrap();
        oms.on_order_update(order.clone());
        oms.on_order_update(order);
        assert_eq!(oms.position_for("m", TokenType::Down).net_size, 5.0);
    }

    #[tokio::test]
    async fn test_sell_fill_reduces_position() {
        let oms = test_oms();
        let buy = oms
            .place("m", TokenType::Up, OrderSide::Buy, Pips::from_cents(50), 10.0, OrderKind::Fak, true)
            .await
            .unwrap();
        oms.on_order_update(buy);
        let mut sell = oms
            .place("m", TokenType::Up, OrderSide::Sell, Pips::from_cents(55), 4.0, OrderKind::Gtc, false)
            .await
            .unwrap();
        sell.filled_size = 4.0;
        sell.status = OrderStatus::Filled;
        oms.on_order_update(sell);
        assert_eq!(oms.position_for("m", TokenType::Up).net_size, 6.0);
    }
}
