use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::types::{BinanceTrade, FeedEvent};

/// Pure producer: connects to the reference trade feed, parses trades, sends
/// `FeedEvent`s. Owns no shared state, only a channel sender.
pub async fn binance_feed(feed_tx: mpsc::Sender<FeedEvent>, ws_url: String, ws_fallback: String) {
    let mut backoff_ms: u64 = 1000;

    loop {
        info!(url = %ws_url, "connecting to reference feed");

        let ws = match connect_async(&ws_url).await {
            Ok((ws, _)) => {
                info!("reference feed connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                warn!(error = %e, "reference feed primary failed, trying fallback");
                match connect_async(&ws_fallback).await {
                    Ok((ws, _)) => {
                        info!("reference feed connected via fallback");
                        backoff_ms = 1000;
                        ws
                    }
                    Err(e2) => {
                        warn!(error = %e2, backoff_ms, "reference feed fallback failed, retrying");
                        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(10_000);
                        continue;
                    }
                }
            }
        };

        let (_write, mut read) = ws.split();

        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "reference feed ws error, reconnecting");
                    break;
                }
            };

            if let Message::Text(text) = msg {
                let recv_at = Instant::now();
                if let Some(trade) = parse_trade(&text, recv_at) {
                    if feed_tx.send(FeedEvent::BinanceTrade(trade)).await.is_err() {
                        info!("reference feed channel closed, exiting");
                        return;
                    }
                }
            }
        }

        warn!(backoff_ms, "reference feed disconnected, reconnecting");
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

fn parse_trade(text: &str, recv_at: Instant) -> Option<BinanceTrade> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let price: f64 = v["p"].as_str()?.parse().ok()?;
    let qty: f64 = v["q"].as_str()?.parse().ok()?;
    let ts_ms = v["T"].as_i64()?;
    let is_buy = !v["m"].as_bool()?; // m=true means seller is maker, so buyer is taker

    Some(BinanceTrade {
        exchange_ts_ms: ts_ms,
        recv_at,
        price,
        qty,
        is_buy,
    })
}
