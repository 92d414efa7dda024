use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::types::{FeedEvent, PolymarketQuote};

/// Pure producer: connects to the Polymarket CLOB WS, parses best_bid_ask
/// updates. Owns no shared state, only a channel sender. Reconnects with
/// exponential backoff on any disconnect.
pub async fn polymarket_feed(
    feed_tx: mpsc::Sender<FeedEvent>,
    ws_url: String,
    up_token_id: String,
    down_token_id: String,
) {
    let mut backoff_ms: u64 = 1000;

    loop {
        info!(%ws_url, "connecting to polymarket feed");

        let ws = match connect_async(&ws_url).await {
            Ok((ws, _)) => {
                info!("polymarket feed connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                warn!(error = %e, backoff_ms, "polymarket feed connect failed, retrying");
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        let sub = serde_json::json!({
            "assets_ids": [&up_token_id, &down_token_id],
            "type": "market",
            "custom_feature_enabled": true
        });

        if let Err(e) = write.send(Message::Text(sub.to_string())).await {
            warn!(error = %e, "polymarket feed subscribe failed, reconnecting");
            continue;
        }
        debug!(up = %up_token_id, down = %down_token_id, "subscribed");

        let mut ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(10));

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            warn!(error = %e, "polymarket feed ws error, reconnecting");
                            break;
                        }
                        None => {
                            warn!("polymarket feed stream ended, reconnecting");
                            break;
                        }
                    };

                    if let Message::Text(text) = msg {
                        let recv_at = Instant::now();
                        if let Some(quote) = parse_clob_message(&text, recv_at, &up_token_id, &down_token_id) {
                            if feed_tx.send(FeedEvent::PolymarketQuote(quote)).await.is_err() {
                                info!("polymarket feed channel closed, exiting");
                                return;
                            }
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    let _ = write.send(Message::Ping(vec![])).await;
                }
            }
        }

        warn!(backoff_ms, "polymarket feed disconnected, reconnecting");
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

fn parse_clob_message(
    text: &str,
    recv_at: Instant,
    up_token_id: &str,
    down_token_id: &str,
) -> Option<PolymarketQuote> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;

    let events = if v.is_array() {
        v.as_array()?.clone()
    } else if v.is_object() {
        vec![v]
    } else {
        return None;
    };

    let mut up_bid: Option<f64> = None;
    let mut up_ask: Option<f64> = None;
    let mut down_bid: Option<f64> = None;
    let mut down_ask: Option<f64> = None;
    let mut ts_ms: i64 = chrono::Utc::now().timestamp_millis();
    let mut found_data = false;

    for event in &events {
        let event_type = event.get("event_type").and_then(|e| e.as_str()).unwrap_or("");

        if event_type == "best_bid_ask" || event_type == "price_change" || event_type == "book" {
            let asset_id = event.get("asset_id").and_then(|a| a.as_str()).unwrap_or("");

            let bid = event
                .get("best_bid")
                .or_else(|| event.get("price"))
                .and_then(parse_numeric_field);
            let ask = event.get("best_ask").and_then(parse_numeric_field);

            if let Some(t) = event.get("timestamp").and_then(|t| t.as_i64()) {
                ts_ms = t;
            }

            if asset_id == up_token_id {
                up_bid = bid.or(up_bid);
                up_ask = ask.or(up_ask);
                found_data = true;
            } else if asset_id == down_token_id {
                down_bid = bid.or(down_bid);
                down_ask = ask.or(down_ask);
                found_data = true;
            }
        }
    }

    if !found_data {
        return None;
    }

    Some(PolymarketQuote {
        server_ts_ms: ts_ms,
        recv_at,
        up_bid,
        up_ask,
        down_bid,
        down_ask,
    })
}

fn parse_numeric_field(v: &serde_json::Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_best_bid_ask_event() {
        let text = serde_json::json!([{
            "event_type": "best_bid_ask",
            "asset_id": "up-token",
            "best_bid": "0.47",
            "best_ask": "0.52",
            "timestamp": 1_700_000_000_123i64,
        }])
        .to_string();

        let quote = parse_clob_message(&text, Instant::now(), "up-token", "down-token").unwrap();
        assert_eq!(quote.up_bid, Some(0.47));
        assert_eq!(quote.up_ask, Some(0.52));
        assert_eq!(quote.down_bid, None);
        assert_eq!(quote.server_ts_ms, 1_700_000_000_123);
    }

    #[test]
    fn test_parse_ignores_unknown_asset_id() {
        let text = serde_json::json!([{
            "event_type": "best_bid_ask",
            "asset_id": "some-other-market",
            "best_bid": "0.10",
            "best_ask": "0.20",
        }])
        .to_string();

        assert!(parse_clob_message(&text, Instant::now(), "up-token", "down-token").is_none());
    }

    #[test]
    fn test_parse_non_json_returns_none() {
        assert!(parse_clob_message("not json", Instant::now(), "up-token", "down-token").is_none());
    }
}
