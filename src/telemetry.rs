use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::strategies::Decision;

/// One line of the per-cycle-per-strategy JSONL report.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Decision {
        ts_ms: i64,
        strategy: String,
        market_slug: String,
        decision: String,
    },
    OrderSent {
        ts_ms: i64,
        order_id: u64,
        strategy: String,
        market_slug: String,
        price_cents: i64,
        size: f64,
    },
    OrderResult {
        ts_ms: i64,
        order_id: u64,
        strategy: String,
        status: String,
        filled_size: f64,
    },
    CycleStart {
        ts_ms: i64,
        market_slug: String,
        cycle_start_s: i64,
    },
    CycleEnd {
        ts_ms: i64,
        market_slug: String,
        gross_pnl_usdc: f64,
        total_orders: u64,
        total_filled: u64,
    },
}

impl TelemetryEvent {
    /// One-line summary used for the `Decision` variant, so the JSONL stays
    /// self-describing without needing the full `Decision` type to derive
    /// `Serialize` (it carries `TokenType`, which is engine-internal).
    pub fn decision(ts_ms: i64, strategy: &str, market_slug: &str, decision: &Decision) -> Self {
        let summary = match decision {
            Decision::PlaceEntry { token_type, price_cents, size } => {
                format!("place_entry token={token_type} price_cents={price_cents} size={size}")
            }
            Decision::PlaceCompleteSet { yes_bid_cents, no_bid_cents, size } => {
                format!("place_complete_set yes={yes_bid_cents} no={no_bid_cents} size={size}")
            }
            Decision::RequoteMaker {
                token_type,
                buy_price_pips,
                sell_price_pips,
                size,
            } => format!(
                "requote_maker token={token_type} buy_pips={buy_price_pips} sell_pips={sell_price_pips} size={size}"
            ),
            Decision::Flatten => "flatten".to_string(),
        };
        TelemetryEvent::Decision {
            ts_ms,
            strategy: strategy.to_string(),
            market_slug: market_slug.to_string(),
            decision: summary,
        }
    }
}

/// Single background task that owns all report I/O, off the hot path: one
/// JSONL file per market under `{report_dir}/{market_slug}.jsonl`.
pub async fn telemetry_writer(mut rx: mpsc::Receiver<TelemetryEvent>, report_dir: PathBuf) {
    if let Err(e) = fs::create_dir_all(&report_dir) {
        warn!(error = %e, dir = %report_dir.display(), "failed to create report directory, telemetry disabled");
        return;
    }

    let mut current_slug = String::new();
    let mut file = None;

    while let Some(event) = rx.recv().await {
        let slug = event_market_slug(&event);
        if slug != current_slug {
            current_slug = slug.clone();
            let path = report_dir.join(format!("{slug}.jsonl"));
            file = OpenOptions::new().create(true).append(true).open(&path).ok();
            if file.is_none() {
                warn!(path = %path.display(), "failed to open report file");
            }
        }

        if let Some(f) = file.as_mut() {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if writeln!(f, "{line}").is_err() {
                        warn!("failed to write telemetry line");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize telemetry event"),
            }
        }
    }

    if let Some(f) = file.as_mut() {
        let _ = f.flush();
    }
    info!("telemetry writer stopped");
}

fn event_market_slug(event: &TelemetryEvent) -> String {
    match event {
        TelemetryEvent::Decision { market_slug, .. } => market_slug.clone(),
        TelemetryEvent::OrderSent { market_slug, .. } => market_slug.clone(),
        TelemetryEvent::OrderResult { .. } => current_slug_unknown(),
        TelemetryEvent::CycleStart { market_slug, .. } => market_slug.clone(),
        TelemetryEvent::CycleEnd { market_slug, .. } => market_slug.clone(),
    }
}

/// `OrderResult` doesn't carry a market slug (orders are addressed by id);
/// callers that need per-market files should route order results alongside
/// a preceding event for the same market within the same channel to keep
/// `current_slug` correct, or accept them landing in the previous file.
fn current_slug_unknown() -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenType;

    #[tokio::test]
    async fn test_telemetry_writer_creates_one_file_per_market() {
        let dir = std::env::temp_dir().join(format!("telemetry-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(telemetry_writer(rx, dir.clone()));

        tx.send(TelemetryEvent::CycleStart {
            ts_ms: 1,
            market_slug: "btc-updown-15m-1700000000".to_string(),
            cycle_start_s: 1_700_000_000,
        })
        .await
        .unwrap();
        tx.send(TelemetryEvent::decision(
            2,
            "cyclehedge",
            "btc-updown-15m-1700000000",
            &Decision::PlaceEntry {
                token_type: TokenType::Up,
                price_cents: 47,
                size: 10.0,
            },
        ))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let path = dir.join("btc-updown-15m-1700000000.jsonl");
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
