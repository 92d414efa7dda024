use std::sync::Mutex;

use crate::types::{Market, Order, PriceChangedEvent};

pub type PriceHandler = Box<dyn Fn(&PriceChangedEvent) + Send + Sync>;
pub type OrderUpdateHandler = Box<dyn Fn(&Order) + Send + Sync>;
pub type CycleHandler = Box<dyn Fn(Option<&Market>, &Market) + Send + Sync>;

/// Synchronous fan-out bus: events are delivered on the calling task, so
/// handlers must not block — they either hand off to a bounded channel and
/// signal, or drop. Per-market events arrive in source order; cross-market
/// ordering is not guaranteed (the bus makes no attempt to interleave fairly).
#[derive(Default)]
pub struct EventBus {
    price_handlers: Mutex<Vec<PriceHandler>>,
    order_handlers: Mutex<Vec<OrderUpdateHandler>>,
    cycle_handlers: Mutex<Vec<CycleHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_price_changed(&self, handler: PriceHandler) {
        self.price_handlers.lock().unwrap().push(handler);
    }

    pub fn subscribe_order_update(&self, handler: OrderUpdateHandler) {
        self.order_handlers.lock().unwrap().push(handler);
    }

    pub fn on_cycle(&self, handler: CycleHandler) {
        self.cycle_handlers.lock().unwrap().push(handler);
    }

    pub fn emit_price_changed(&self, event: &PriceChangedEvent) {
        for h in self.price_handlers.lock().unwrap().iter() {
            h(event);
        }
    }

    pub fn emit_order_update(&self, order: &Order) {
        for h in self.order_handlers.lock().unwrap().iter() {
            h(order);
        }
    }

    pub fn emit_cycle(&self, old: Option<&Market>, new: &Market) {
        for h in self.cycle_handlers.lock().unwrap().iter() {
            h(old, new);
        }
    }
}

/// Parse a market slug's cycle start. Two formats are accepted:
/// - `{symbol}-{kind}-{timeframe}-{unixCycleStart}` (trailing unix seconds)
/// - an hourly-ET textual slug (e.g. "bitcoin-up-or-down-february-16-3am-et"),
///   which carries no parseable timestamp in the slug itself — callers must
///   supply the cycle start out of band (from market discovery) for those.
pub fn parse_cycle_start(slug: &str) -> Option<i64> {
    let last = slug.rsplit('-').next()?;
    last.parse::<i64>().ok()
}

/// Detect whether `new_slug` represents a different cycle than `old_slug`.
/// A `None` for `old_slug` always counts as a cycle change (first market).
pub fn is_new_cycle(old_slug: Option<&str>, new_slug: &str) -> bool {
    match old_slug {
        None => true,
        Some(old) => old != new_slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_cycle_start_unix_slug() {
        assert_eq!(
            parse_cycle_start("btc-updown-15m-1700000000"),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_parse_cycle_start_et_slug_has_no_unix_suffix() {
        assert_eq!(
            parse_cycle_start("bitcoin-up-or-down-february-16-3am-et"),
            None
        );
    }

    #[test]
    fn test_is_new_cycle() {
        assert!(is_new_cycle(None, "btc-updown-15m-1700000000"));
        assert!(!is_new_cycle(
            Some("btc-updown-15m-1700000000"),
            "btc-updown-15m-1700000000"
        ));
        assert!(is_new_cycle(
            Some("btc-updown-15m-1700000000"),
            "btc-updown-15m-1700000900"
        ));
    }

    /// Scenario: two price handlers subscribed; one emit.
    /// Expected: both handlers observe exactly one call, in subscription order.
    #[test]
    fn test_price_fanout_delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            bus.subscribe_price_changed(Box::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        bus.emit_price_changed(&PriceChangedEvent {
            market_slug: "btc-updown-15m-1700000000".into(),
            token_type: crate::types::TokenType::Up,
            new_price: crate::types::Pips::from_cents(50),
            ts_ms: 0,
            top_of_book: Default::default(),
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cycle_handler_invoked_with_old_and_new() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        bus.on_cycle(Box::new(move |old, new| {
            *seen2.lock().unwrap() = Some((old.map(|m| m.slug.clone()), new.slug.clone()));
        }));
        let new_market = Market {
            slug: "btc-updown-15m-1700000900".into(),
            cycle_start_s: 1_700_000_900,
            up_asset_id: "u".into(),
            down_asset_id: "d".into(),
            tick_pips: 10,
            neg_risk: false,
            condition_id: "0xc".into(),
        };
        bus.emit_cycle(None, &new_market);
        assert_eq!(
            *seen.lock().unwrap(),
            Some((None, "btc-updown-15m-1700000900".to_string()))
        );
    }
}
