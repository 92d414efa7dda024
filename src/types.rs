use std::time::Instant;

/// Integer price in pips. 1 cent = 100 pips, so a pip is 0.0001 USDC.
/// All pricing arithmetic in the engine happens in this type; conversion to
/// decimal only happens at the exchange/telemetry boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pips(pub i64);

impl Pips {
    pub const PIPS_PER_CENT: i64 = 100;
    pub const PIPS_PER_DOLLAR: i64 = 10_000;

    pub fn from_cents(cents: i64) -> Self {
        Pips(cents * Self::PIPS_PER_CENT)
    }

    pub fn from_decimal(dollars: f64) -> Self {
        Pips((dollars * Self::PIPS_PER_DOLLAR as f64).round() as i64)
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / Self::PIPS_PER_DOLLAR as f64
    }

    pub fn to_cents_f64(self) -> f64 {
        self.0 as f64 / Self::PIPS_PER_CENT as f64
    }

    pub fn checked_add(self, other: Pips) -> Pips {
        Pips(self.0 + other.0)
    }

    pub fn checked_sub(self, other: Pips) -> Pips {
        Pips(self.0 - other.0)
    }
}

impl std::ops::Add for Pips {
    type Output = Pips;
    fn add(self, rhs: Pips) -> Pips {
        Pips(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Pips {
    type Output = Pips;
    fn sub(self, rhs: Pips) -> Pips {
        Pips(self.0 - rhs.0)
    }
}

/// UP or DOWN token, i.e. the two complementary outcomes of a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenType {
    Up,
    Down,
}

impl TokenType {
    pub fn opposite(self) -> TokenType {
        match self {
            TokenType::Up => TokenType::Down,
            TokenType::Down => TokenType::Up,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Up => write!(f, "UP"),
            TokenType::Down => write!(f, "DOWN"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderKind {
    /// Good-till-canceled limit order.
    Gtc,
    /// Fill-and-kill: immediate-or-cancel.
    Fak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Open,
    Partial,
    Filled,
    Canceled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Failed
        )
    }
}

/// Market identity. Replaced atomically at each cycle boundary; never
/// mutated in place.
#[derive(Clone, Debug)]
pub struct Market {
    pub slug: String,
    pub cycle_start_s: i64,
    pub up_asset_id: String,
    pub down_asset_id: String,
    pub tick_pips: i64,
    pub neg_risk: bool,
    /// CTF condition id (hex), shared by both the UP and DOWN outcome
    /// tokens. Empty when discovery couldn't find one; auto-merge is
    /// skipped for that cycle rather than calling the settlement client
    /// with a bogus id.
    pub condition_id: String,
}

/// An order owned exclusively by the OMS. Read-only snapshots (`Order`
/// clones) may be shared with the dashboard and risk manager.
#[derive(Clone, Debug)]
pub struct Order {
    pub id: u64,
    pub market_slug: String,
    pub token_type: TokenType,
    pub side: OrderSide,
    pub price: Pips,
    pub size: f64,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub filled_size: f64,
    pub created_at: Instant,
    pub hedge_order_id: Option<u64>,
    pub is_entry_order: bool,
}

/// Per (market, token-type) net position. Size is non-negative; UP and DOWN
/// are tracked independently.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub net_size: f64,
    pub net_cost_usdc: f64,
}

impl Position {
    pub fn avg_price(&self) -> f64 {
        if self.net_size <= 0.0 {
            0.0
        } else {
            self.net_cost_usdc / self.net_size
        }
    }

    pub fn on_fill(&mut self, size: f64, price_usdc: f64) {
        self.net_size += size;
        self.net_cost_usdc += size * price_usdc;
    }
}

/// Complete-set size, the guaranteed-at-settlement quantity: min(up, down).
pub fn complete_set_size(up: Position, down: Position) -> f64 {
    up.net_size.min(down.net_size)
}

/// Price-change event emitted on the Event Bus.
#[derive(Clone, Debug)]
pub struct PriceChangedEvent {
    pub market_slug: String,
    pub token_type: TokenType,
    pub new_price: Pips,
    pub ts_ms: i64,
    pub top_of_book: TopOfBook,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TopOfBook {
    pub bid: Option<Pips>,
    pub ask: Option<Pips>,
}

/// A single velocity sample: timestamp plus price in pips. Append-only
/// within a cycle; pruned to the maximum of all configured lookback
/// windows.
#[derive(Clone, Copy, Debug)]
pub struct VelocitySample {
    pub ts_ms: i64,
    pub price_pips: i64,
}

/// Raw best-bid/ask snapshot off the Polymarket CLOB websocket, before it is
/// turned into a `PriceChangedEvent` and published on the Event Bus.
#[derive(Clone, Copy, Debug)]
pub struct PolymarketQuote {
    pub server_ts_ms: i64,
    pub recv_at: Instant,
    pub up_bid: Option<f64>,
    pub up_ask: Option<f64>,
    pub down_bid: Option<f64>,
    pub down_ask: Option<f64>,
}

/// A single trade off the reference (underlying) feed.
#[derive(Clone, Copy, Debug)]
pub struct BinanceTrade {
    pub exchange_ts_ms: i64,
    pub recv_at: Instant,
    pub price: f64,
    pub qty: f64,
    pub is_buy: bool,
}

/// Everything a feed producer task can hand to the task that owns market
/// state. Producers are pure: they hold only a channel sender and never
/// touch shared state directly.
#[derive(Clone, Copy, Debug)]
pub enum FeedEvent {
    PolymarketQuote(PolymarketQuote),
    BinanceTrade(BinanceTrade),
}
