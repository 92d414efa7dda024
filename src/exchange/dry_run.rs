use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::error::EngineResult;
use crate::types::{Order, OrderKind, OrderStatus};

use super::ExchangeClient;

/// Simulated exchange, grounded in the dry-run path of the order gateway
/// this is adapted from. FAK orders resolve immediately (as they would
/// against a real book: filled or killed), GTC orders rest as `Open` until
/// a later `on_order_update` simulates a match.
pub struct DryRunExchange {
    fills: AtomicU64,
}

impl DryRunExchange {
    pub fn new() -> Self {
        Self {
            fills: AtomicU64::new(0),
        }
    }
}

impl Default for DryRunExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for DryRunExchange {
    async fn place_order(&self, mut order: Order) -> EngineResult<Order> {
        match order.kind {
            OrderKind::Fak => {
                order.filled_size = order.size;
                order.status = OrderStatus::Filled;
                self.fills.fetch_add(1, Ordering::Relaxed);
                debug!(order_id = order.id, "dry-run FAK fill simulated");
            }
            OrderKind::Gtc => {
                order.status = OrderStatus::Open;
            }
        }
        Ok(order)
    }

    async fn cancel_order(&self, _order_id: u64) -> EngineResult<()> {
        Ok(())
    }

    async fn cancel_orders_for_market(&self, _market_slug: &str) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderKind, OrderSide, Pips, TokenType};
    use std::time::Instant;

    fn sample_order() -> Order {
        Order {
            id: 1,
            market_slug: "btc-updown-15m-1700000000".to_string(),
            token_type: TokenType::Up,
            side: OrderSide::Buy,
            price: Pips::from_cents(50),
            size: 10.0,
            kind: OrderKind::Gtc,
            status: OrderStatus::Pending,
            filled_size: 0.0,
            created_at: Instant::now(),
            hedge_order_id: None,
            is_entry_order: true,
        }
    }

    #[tokio::test]
    async fn test_dry_run_fak_fills_immediately() {
        let ex = DryRunExchange::new();
        let mut order = sample_order();
        order.kind = OrderKind::Fak;
        let placed = ex.place_order(order).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Filled);
        assert_eq!(placed.filled_size, placed.size);
    }

    #[tokio::test]
    async fn test_dry_run_gtc_rests_open() {
        let ex = DryRunExchange::new();
        let placed = ex.place_order(sample_order()).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Open);
        assert_eq!(placed.filled_size, 0.0);
    }

    #[tokio::test]
    async fn test_dry_run_cancel_is_noop_ok() {
        let ex = DryRunExchange::new();
        ex.cancel_order(1).await.unwrap();
        ex.cancel_orders_for_market("m").await.unwrap();
    }
}
