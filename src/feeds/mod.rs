pub mod binance;
pub mod polymarket;
