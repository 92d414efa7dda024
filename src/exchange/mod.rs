pub mod clob;
pub mod dry_run;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::Order;

/// External collaborator boundary for order placement/cancellation. Both
/// the dry-run simulator and the live CLOB client implement this so the OMS
/// never has to branch on `dry_run`.
///
/// Open-position queries aren't part of this trait: unlike order placement,
/// they don't round-trip to the exchange. Positions are derived purely from
/// fills this process has already observed, so the OMS (the sole owner of
/// that derived state, per its own shared-resource policy) serves them
/// directly through `Oms::open_positions_for_market`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_order(&self, order: Order) -> EngineResult<Order>;
    async fn cancel_order(&self, order_id: u64) -> EngineResult<()>;
    async fn cancel_orders_for_market(&self, market_slug: &str) -> EngineResult<()>;
}
