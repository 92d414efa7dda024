use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use updown_engine::capital_ops::CapitalOps;
use updown_engine::config::{load_strategies_yaml, StrategyConfig, StrategyKind};
use updown_engine::cycle;
use updown_engine::dashboard::{self, Snapshot, TokenSnapshot};
use updown_engine::event_bus::EventBus;
use updown_engine::exchange::clob::{ClobCredentials, ClobExchange};
use updown_engine::exchange::dry_run::DryRunExchange;
use updown_engine::exchange::ExchangeClient;
use updown_engine::feeds::binance::binance_feed;
use updown_engine::feeds::polymarket::polymarket_feed;
use updown_engine::gate::{self, GateOptions, MarketSnapshot};
use updown_engine::market::discovery::discover_next_market;
use updown_engine::oms::Oms;
use updown_engine::pricing::volmm::VolMmInputs;
use updown_engine::risk::{EscalationDecision, ExposureSnapshot, RiskManager};
use updown_engine::settlement::{CtfSettlementClient, SettlementClient};
use updown_engine::strategies::cyclehedge::{self, CycleHedgeInputs};
use updown_engine::strategies::unifiedarb::{self, UnifiedArbInputs};
use updown_engine::strategies::volmm::{self, VolMmStepInputs};
use updown_engine::strategies::{run_gates, run_strategy_loop, CycleState, Decision, GateInputs, StrategyRegistry, StrategySignal};
use updown_engine::telemetry::{telemetry_writer, TelemetryEvent};
use updown_engine::types::{FeedEvent, Market, OrderKind, OrderSide, Pips, TokenType, TopOfBook};
use updown_engine::velocity::VelocityTracker;

/// Complete-set hedge-lock, unified arb, and volatility market-making for
/// Polymarket UP/DOWN cycles.
#[derive(Parser, Debug)]
#[command(name = "updown-engine")]
struct Cli {
    /// Path to a YAML file listing the strategies to run.
    #[arg(long)]
    strategies: std::path::PathBuf,

    /// Never submit real orders; simulate fills locally.
    #[arg(long)]
    dry_run: bool,

    /// Directory for per-market JSONL telemetry reports.
    #[arg(long, default_value = "./reports")]
    report_dir: std::path::PathBuf,

    /// Polygon RPC endpoint used for on-chain settlement (auto-merge).
    #[arg(long, default_value = "https://polygon-rpc.com")]
    rpc_url: String,
}

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();

    let strategy_configs = match load_strategies_yaml(&cli.strategies) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            return 1;
        }
    };
    if strategy_configs.is_empty() {
        error!("strategies file lists no strategies");
        return 1;
    }

    let registry = StrategyRegistry::new();
    for cfg in &strategy_configs {
        if let Err(e) = registry.register(cfg) {
            error!(error = %e, "configuration error");
            return 1;
        }
    }

    let exchange: Arc<dyn ExchangeClient> = if cli.dry_run {
        info!("dry run: orders are simulated, nothing is submitted to the CLOB");
        Arc::new(DryRunExchange::new())
    } else {
        let private_key = match std::env::var("POLYMARKET_PRIVATE_KEY") {
            Ok(k) => k,
            Err(_) => {
                error!("POLYMARKET_PRIVATE_KEY must be set for live trading (or pass --dry-run)");
                return 1;
            }
        };
        let creds = ClobCredentials {
            private_key,
            signature_type: std::env::var("POLYMARKET_SIGNATURE_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            funder_address: std::env::var("POLYMARKET_FUNDER_ADDRESS").ok(),
        };
        match ClobExchange::connect(creds, 0.001).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!(error = %e, "failed to connect to the CLOB");
                return 2;
            }
        }
    };

    let capital_ops: Option<Arc<CapitalOps>> = if cli.dry_run {
        None
    } else {
        match std::env::var("POLYMARKET_PRIVATE_KEY") {
            Ok(pk) => match CtfSettlementClient::connect(&pk, &cli.rpc_url).await {
                Ok(client) => {
                    let settlement: Arc<dyn SettlementClient> = Arc::new(client);
                    Some(Arc::new(CapitalOps::new(settlement, 5.0)))
                }
                Err(e) => {
                    warn!(error = %e, "settlement client unavailable, auto-merge disabled");
                    None
                }
            },
            Err(_) => None,
        }
    };

    let http = reqwest::Client::new();
    let (dashboard_tx, _dashboard_rx) = dashboard::new_channel();

    let (telem_tx, telem_rx) = mpsc::channel::<TelemetryEvent>(4096);
    let telemetry_handle = tokio::spawn(telemetry_writer(telem_rx, cli.report_dir.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut handles = Vec::new();
    for cfg in strategy_configs {
        let exchange = exchange.clone();
        let capital_ops = capital_ops.clone();
        let http = http.clone();
        let telem_tx = telem_tx.clone();
        let dashboard_tx = dashboard_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            run_strategy(cfg, exchange, capital_ops, http, telem_tx, dashboard_tx, shutdown_rx).await;
        }));
    }

    for h in handles {
        let _ = h.await;
    }
    drop(telem_tx);
    let _ = telemetry_handle.await;
    0
}

/// Derives the Binance trade-stream symbol from the strategy's slug prefix,
/// e.g. `"btc-updown-15m-"` → `"btcusdt"`.
fn binance_symbol(market_slug_prefix: &str) -> String {
    let asset = market_slug_prefix.split('-').next().unwrap_or("btc");
    format!("{}usdt", asset.to_lowercase())
}

/// One strategy's full lifecycle: discover a market, run it cycle after
/// cycle until shutdown, re-discovering a fresh market whenever a cycle
/// ends. Each strategy owns its own feeds, OMS, and risk manager; nothing
/// here is shared across strategies except the exchange client, capital
/// ops, and the process-wide telemetry/dashboard sinks.
async fn run_strategy(
    cfg: StrategyConfig,
    exchange: Arc<dyn ExchangeClient>,
    capital_ops: Option<Arc<CapitalOps>>,
    http: reqwest::Client,
    telem_tx: mpsc::Sender<TelemetryEvent>,
    dashboard_tx: watch::Sender<Snapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let in_flight_max = match cfg.kind {
        StrategyKind::VolMm => 4,
        StrategyKind::CycleHedge | StrategyKind::UnifiedArb => 8,
    };
    let oms = Arc::new(Oms::new(
        exchange,
        in_flight_max,
        cfg.cancel_all_throttle.0,
        cfg.per_entry_cooldown.0,
    ));
    let risk = Arc::new(RiskManager::new(
        cfg.risk_management_check_interval.0,
        cfg.aggressive_hedge_timeout.as_secs_f64(),
        cfg.max_acceptable_loss_cents,
    ));

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let market = match discover_next_market(&http, &cfg).await {
            Ok(m) => m,
            Err(e) => {
                warn!(strategy = %cfg.id, error = %e, "market discovery failed, retrying in 10s");
                tokio::time::sleep(Duration::from_secs(10)).await;
                continue;
            }
        };
        let _ = telem_tx
            .send(TelemetryEvent::CycleStart {
                ts_ms: chrono::Utc::now().timestamp_millis(),
                market_slug: market.slug.clone(),
                cycle_start_s: market.cycle_start_s,
            })
            .await;

        run_cycle(&cfg, &market, &oms, &risk, &capital_ops, &http, &telem_tx, &dashboard_tx, shutdown_rx.clone()).await;

        let _ = telem_tx
            .send(TelemetryEvent::CycleEnd {
                ts_ms: chrono::Utc::now().timestamp_millis(),
                market_slug: market.slug.clone(),
                gross_pnl_usdc: 0.0,
                total_orders: 0,
                total_filled: 0,
            })
            .await;
    }
}

/// Drives one cycle for one strategy: spawns the feeds, the feed-to-signal
/// consumer, and the decision loop, then waits for the cycle to end (by its
/// own clock) or for shutdown.
async fn run_cycle(
    cfg: &StrategyConfig,
    market: &Market,
    oms: &Arc<Oms>,
    risk: &Arc<RiskManager>,
    capital_ops: &Option<Arc<CapitalOps>>,
    http: &reqwest::Client,
    telem_tx: &mpsc::Sender<TelemetryEvent>,
    dashboard_tx: &watch::Sender<Snapshot>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let (feed_tx, mut feed_rx) = mpsc::channel::<FeedEvent>(4096);
    // The CLOB client doesn't expose a push-based order-update stream yet
    // (`ExchangeClient` is place/cancel only), so this channel only ever
    // carries updates the OMS synthesizes itself; a future live fill stream
    // would feed it here.
    let (_order_tx, order_rx) = mpsc::channel(64);
    let signal = Arc::new(StrategySignal::new());

    // Event Bus: the feed consumer below emits price changes onto it, and
    // the strategy's signal is just one subscriber. Order-update fan-out
    // stays unused until there's a live fill stream to feed it (see the
    // `_order_tx` note above).
    let bus = Arc::new(EventBus::new());
    bus.subscribe_price_changed({
        let signal = signal.clone();
        Box::new(move |event: &updown_engine::types::PriceChangedEvent| {
            signal.on_price_changed(event.clone());
        })
    });

    let pm_handle = tokio::spawn(polymarket_feed(
        feed_tx.clone(),
        "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
        market.up_asset_id.clone(),
        market.down_asset_id.clone(),
    ));

    let binance_handle = matches!(cfg.kind, StrategyKind::VolMm).then(|| {
        let symbol = binance_symbol(&cfg.market_slug_prefix);
        tokio::spawn(binance_feed(
            feed_tx.clone(),
            format!("wss://stream.binance.com:9443/ws/{symbol}@trade"),
            format!("wss://stream.binance.us:9443/ws/{symbol}@trade"),
        ))
    });
    drop(feed_tx);

    let top_of_book: Arc<Mutex<HashMap<TokenType, TopOfBook>>> = Arc::new(Mutex::new(HashMap::new()));
    let underlying: Arc<Mutex<f64>> = Arc::new(Mutex::new(0.0));
    let strike = if matches!(cfg.kind, StrategyKind::VolMm) {
        fetch_binance_candle_open(http, &binance_symbol(&cfg.market_slug_prefix)).await.unwrap_or(0.0)
    } else {
        0.0
    };

    let consumer_bus = bus.clone();
    let consumer_tob = top_of_book.clone();
    let consumer_underlying = underlying.clone();
    let market_slug = market.slug.clone();
    let consumer_handle = tokio::spawn(async move {
        while let Some(event) = feed_rx.recv().await {
            match event {
                FeedEvent::PolymarketQuote(q) => {
                    let up = TopOfBook {
                        bid: q.up_bid.map(Pips::from_decimal),
                        ask: q.up_ask.map(Pips::from_decimal),
                    };
                    let down = TopOfBook {
                        bid: q.down_bid.map(Pips::from_decimal),
                        ask: q.down_ask.map(Pips::from_decimal),
                    };
                    consumer_tob.lock().unwrap().insert(TokenType::Up, up);
                    consumer_tob.lock().unwrap().insert(TokenType::Down, down);
                    if let Some(price) = up.bid.or(up.ask) {
                        consumer_bus.emit_price_changed(&updown_engine::types::PriceChangedEvent {
                            market_slug: market_slug.clone(),
                            token_type: TokenType::Up,
                            new_price: price,
                            ts_ms: q.server_ts_ms,
                            top_of_book: up,
                        });
                    }
                    if let Some(price) = down.bid.or(down.ask) {
                        consumer_bus.emit_price_changed(&updown_engine::types::PriceChangedEvent {
                            market_slug: market_slug.clone(),
                            token_type: TokenType::Down,
                            new_price: price,
                            ts_ms: q.server_ts_ms,
                            top_of_book: down,
                        });
                    }
                }
                FeedEvent::BinanceTrade(t) => {
                    *consumer_underlying.lock().unwrap() = t.price;
                }
            }
        }
    });

    let gate_options = GateOptions {
        max_book_age_ms: cfg.max_book_age.as_millis_u64() as i64,
        max_spread_pips: cfg.max_spread_pips,
        min_score: cfg.min_quality_score,
    };
    let mut cycle_state = CycleState::new(market.slug.clone(), market.cycle_start_s, cfg.cycle_warmup.0);
    let mut velocity = VelocityTracker::new(cfg.volmm.as_ref().map(|v| v.accel_window.as_millis_u64() as i64).unwrap_or(20_000));
    let mut resting: HashMap<TokenType, (i64, i64)> = HashMap::new();
    let cycle_len_s = cfg.window_secs;
    let requote_interval = match cfg.kind {
        StrategyKind::VolMm => Some(Duration::from_millis(500)),
        StrategyKind::CycleHedge | StrategyKind::UnifiedArb => cfg.complete_set.as_ref().map(|c| c.requote_interval.0),
    };

    let mut loop_handle = {
        let oms = oms.clone();
        let risk = risk.clone();
        let capital_ops = capital_ops.clone();
        let telem_tx = telem_tx.clone();
        let dashboard_tx = dashboard_tx.clone();
        let cfg = cfg.clone();
        let market_slug = market.slug.clone();
        let condition_id = market.condition_id.clone();
        let top_of_book = top_of_book.clone();
        let underlying = underlying.clone();

        tokio::spawn(async move {
            run_strategy_loop(signal, order_rx, requote_interval, shutdown_rx, move |merged, updates| {
                for order in &updates {
                    oms.on_order_update(order.clone());
                    if order.status == updown_engine::types::OrderStatus::Filled {
                        oms.mark_entry_filled(order.id);
                    }
                }
                if !merged.is_empty() {
                    for (token, event) in &merged {
                        velocity.push(updown_engine::types::VelocitySample {
                            ts_ms: event.ts_ms,
                            price_pips: event.new_price.0,
                        });
                        let _ = token;
                    }
                }

                let now_s = chrono::Utc::now().timestamp();
                let in_end_protection = cycle::in_end_protection(now_s, cycle_state.cycle_start_s, cycle_len_s, cfg.end_protection_seconds);
                let (up, down) = {
                    let tob = top_of_book.lock().unwrap();
                    (tob.get(&TokenType::Up).copied().unwrap_or_default(), tob.get(&TokenType::Down).copied().unwrap_or_default())
                };

                let snapshot = MarketSnapshot {
                    up,
                    down,
                    age_ms: 0,
                    source: "polymarket",
                };
                let quality = gate::evaluate(&snapshot, &gate_options);
                let (in_cooldown, _secs, cooldown_reason) = oms.is_market_in_cooldown(&market_slug);
                let has_pending_hedge = oms.has_unhedged_risk(&market_slug);

                let gate_inputs = GateInputs {
                    now: Instant::now(),
                    max_trades_per_cycle: cfg.max_trades_per_cycle,
                    in_cooldown,
                    cooldown_reason: &cooldown_reason,
                    market_tradable: quality.tradable(cfg.min_quality_score),
                    market_quality_reason: quality.problems.first().map(|s| s.as_str()).unwrap_or(""),
                    price_stable: true,
                    has_pending_hedge,
                    inventory_within_skew_limit: true,
                    in_end_protection,
                    allow_hedging_only_in_end_protection: true,
                };
                let outcome = run_gates(&cycle_state, &gate_inputs);
                updown_engine::strategies::log_decision_gated(&cfg.id, &outcome);

                push_dashboard_snapshot(
                    &dashboard_tx,
                    &cfg,
                    &market_slug,
                    up,
                    down,
                    &velocity,
                    in_end_protection,
                    &oms,
                    &risk,
                    cycle_state.trades_this_cycle,
                    cycle_state.cycle_start_s + cycle_len_s,
                );

                if outcome != updown_engine::strategies::GateOutcome::Pass {
                    return;
                }

                let decisions: Vec<Decision> = match cfg.kind {
                    StrategyKind::CycleHedge => {
                        let cs = cfg.complete_set.as_ref().expect("validated at load time");
                        cyclehedge::decide(&CycleHedgeInputs {
                            yes: up,
                            no: down,
                            profit_min_cents: cs.profit_min_cents,
                            profit_max_cents: cs.profit_max_cents,
                            dynamic_profit_selection: cs.dynamic_profit_selection,
                            distance_penalty_bps: cs.distance_penalty_bps,
                            in_end_protection,
                            size: cfg.target_notional_usdc,
                        })
                        .into_iter()
                        .collect()
                    }
                    StrategyKind::UnifiedArb => {
                        let cs = cfg.complete_set.as_ref().expect("validated at load time");
                        unifiedarb::decide(&UnifiedArbInputs {
                            common: CycleHedgeInputs {
                                yes: up,
                                no: down,
                                profit_min_cents: cs.profit_min_cents,
                                profit_max_cents: cs.profit_max_cents,
                                dynamic_profit_selection: cs.dynamic_profit_selection,
                                distance_penalty_bps: cs.distance_penalty_bps,
                                in_end_protection,
                                size: cfg.target_notional_usdc,
                            },
                            cross_tolerance_cents: 1,
                        })
                        .into_iter()
                        .collect()
                    }
                    StrategyKind::VolMm => {
                        let vm = cfg.volmm.as_ref().expect("validated at load time");
                        let tau_s = cycle::remaining_seconds(now_s, cycle_state.cycle_start_s, cycle_len_s) as f64;
                        let vel_norm = velocity
                            .velocity_pips_per_sec(now_s * 1000, vm.velocity_window.as_millis_u64() as i64)
                            .unwrap_or(0.0)
                            / 10_000.0;
                        let model = VolMmInputs {
                            strike,
                            underlying: *underlying.lock().unwrap(),
                            tau_s: tau_s.max(1.0),
                            vel_norm,
                            acc_norm: 0.0,
                            net_delta_shares: 0.0,
                            k: vm.k,
                            c: vm.c,
                            kv: vm.kv,
                            ka: vm.ka,
                            p_min: vm.p_min,
                            s_min: vm.s_min,
                            alpha: vm.alpha,
                            beta: vm.beta,
                            k_delta: vm.k_delta,
                            delta_max_shares: vm.delta_max_shares,
                            tick_pips: cfg.tick_pips,
                        };
                        let (up_quote, down_quote) = (resting.get(&TokenType::Up).copied(), resting.get(&TokenType::Down).copied());
                        let step = volmm::decide(&VolMmStepInputs {
                            model,
                            current_up_buy_pips: up_quote.map(|q| q.0),
                            current_up_sell_pips: up_quote.map(|q| q.1),
                            current_down_buy_pips: down_quote.map(|q| q.0),
                            current_down_sell_pips: down_quote.map(|q| q.1),
                            replace_threshold_ticks: vm.replace_threshold_ticks,
                            size: cfg.target_notional_usdc,
                        });
                        for decision in &step {
                            if let Decision::RequoteMaker { token_type, buy_price_pips, sell_price_pips, .. } = decision {
                                resting.insert(*token_type, (*buy_price_pips, *sell_price_pips));
                            }
                        }
                        step
                    }
                };

                for decision in decisions {
                    cycle_state.trades_this_cycle += 1;
                    let _ = telem_tx.try_send(TelemetryEvent::decision(
                        chrono::Utc::now().timestamp_millis(),
                        &cfg.id,
                        &market_slug,
                        &decision,
                    ));
                    spawn_execute(
                        oms.clone(),
                        risk.clone(),
                        capital_ops.clone(),
                        market_slug.clone(),
                        condition_id.clone(),
                        top_of_book.clone(),
                        decision,
                    );
                }
            })
            .await;
        })
    };

    tokio::select! {
        res = &mut loop_handle => { let _ = res; }
        _ = tokio::time::sleep(Duration::from_secs(cycle_len_s.max(1) as u64)) => {
            info!(market = %market.slug, "cycle ended by clock");
            loop_handle.abort();
        }
    }

    pm_handle.abort();
    if let Some(h) = binance_handle {
        h.abort();
    }
    consumer_handle.abort();
}

/// Turns one `Decision` into OMS calls, detached from the synchronous loop
/// step so the decision loop itself never awaits exchange I/O.
fn spawn_execute(
    oms: Arc<Oms>,
    risk: Arc<RiskManager>,
    capital_ops: Option<Arc<CapitalOps>>,
    market_slug: String,
    condition_id: String,
    top_of_book: Arc<Mutex<HashMap<TokenType, TopOfBook>>>,
    decision: Decision,
) {
    tokio::spawn(async move {
        match decision {
            Decision::PlaceCompleteSet { yes_bid_cents, no_bid_cents, size } => {
                let request = updown_engine::oms::MultiLegRequest {
                    legs: vec![
                        (TokenType::Up, OrderSide::Buy, Pips::from_cents(yes_bid_cents), size, OrderKind::Gtc),
                        (TokenType::Down, OrderSide::Buy, Pips::from_cents(no_bid_cents), size, OrderKind::Gtc),
                    ],
                    market_slug: market_slug.clone(),
                    sequential: false,
                };
                match oms.execute_multi_leg(request).await {
                    Ok(orders) => {
                        for order in orders {
                            oms.begin_tracked_entry(order.id, order.price.to_cents_f64() as i64, 1, 3, 6, 1, Duration::from_secs(120));
                        }
                    }
                    Err(e) => warn!(%market_slug, error = %e, "complete-set post failed"),
                }
            }
            Decision::PlaceEntry { token_type, price_cents, size } => {
                match oms
                    .place(&market_slug, token_type, OrderSide::Buy, Pips::from_cents(price_cents), size, OrderKind::Fak, true)
                    .await
                {
                    Ok(order) => oms.begin_tracked_entry(order.id, price_cents, 1, 3, 6, 1, Duration::from_secs(120)),
                    Err(e) => warn!(%market_slug, error = %e, "crossing entry failed"),
                }
            }
            Decision::RequoteMaker { token_type, buy_price_pips, sell_price_pips, size } => {
                if let Err(e) = oms
                    .place(&market_slug, token_type, OrderSide::Buy, Pips(buy_price_pips), size, OrderKind::Gtc, false)
                    .await
                {
                    warn!(%market_slug, ?token_type, error = %e, "requote buy failed");
                }
                if let Err(e) = oms
                    .place(&market_slug, token_type, OrderSide::Sell, Pips(sell_price_pips), size, OrderKind::Gtc, false)
                    .await
                {
                    warn!(%market_slug, ?token_type, error = %e, "requote sell failed");
                }
            }
            Decision::Flatten => {
                if let Err(e) = oms.cancel_all_for_market(&market_slug).await {
                    warn!(%market_slug, error = %e, "flatten failed");
                }
            }
        }

        let exposures: Vec<ExposureSnapshot> = oms
            .unhedged_exposures(&market_slug)
            .into_iter()
            .map(|(id, opposing_token, entry_cost_cents, filled_at)| {
                let opposing_bid_cents = top_of_book
                    .lock()
                    .unwrap()
                    .get(&opposing_token)
                    .and_then(|tob| tob.bid)
                    .map(|p| p.to_cents_f64() as i64)
                    .unwrap_or(0);
                ExposureSnapshot {
                    entry_order_id: id,
                    entry_filled_at: filled_at,
                    hedge_filled: false,
                    entry_cost_cents,
                    opposing_bid_cents,
                }
            })
            .collect();
        for (entry_order_id, decision) in risk.review(&exposures, Instant::now()) {
            if decision == EscalationDecision::Authorize {
                if let Some(exposure) = exposures.iter().find(|e| e.entry_order_id == entry_order_id) {
                    let _ = oms
                        .reprice_or_escalate_hedge(entry_order_id, &market_slug, TokenType::Down, exposure.opposing_bid_cents, 5, 0.0)
                        .await;
                }
            }
        }

        if let Some(ops) = &capital_ops {
            if !condition_id.is_empty() {
                let up_shares = oms.position_for(&market_slug, TokenType::Up).net_size;
                let down_shares = oms.position_for(&market_slug, TokenType::Down).net_size;
                if ops.should_trigger(&market_slug, up_shares, down_shares) {
                    let _ = ops.try_merge(&market_slug, &condition_id, up_shares, down_shares).await;
                }
            }
        }
    });
}

/// Fetches the most recent 1-minute candle's open price, used as the volmm
/// strike reference. Falls back to `None` (caller treats that as 0.0, which
/// the gate's market-quality checks keep out of the strategy's way until a
/// real strike is available on the next cycle).
async fn fetch_binance_candle_open(client: &reqwest::Client, symbol: &str) -> Option<f64> {
    let url = format!(
        "https://api.binance.com/api/v3/klines?symbol={}&interval=1m&limit=1",
        symbol.to_uppercase()
    );
    let resp = client.get(&url).send().await.ok()?;
    let text = resp.text().await.ok()?;
    let v: serde_json::Value = serde_json::from_str(&text).ok()?;
    let candle = v.as_array()?.first()?;
    candle.get(1)?.as_str()?.parse::<f64>().ok()
}

#[allow(clippy::too_many_arguments)]
fn push_dashboard_snapshot(
    tx: &watch::Sender<Snapshot>,
    cfg: &StrategyConfig,
    market_slug: &str,
    up: TopOfBook,
    down: TopOfBook,
    velocity: &VelocityTracker,
    in_end_protection: bool,
    oms: &Oms,
    risk: &RiskManager,
    trades_this_cycle: u32,
    cycle_end_s: i64,
) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let vel = velocity.velocity_pips_per_sec(now_ms, 5_000).unwrap_or(0.0);
    let up_pos = oms.position_for(market_slug, TokenType::Up);
    let down_pos = oms.position_for(market_slug, TokenType::Down);
    // If the cycle resolves UP, UP shares pay $1 each and DOWN shares pay 0,
    // and vice versa; profit nets out both legs' cost against that payout.
    let profit_if_up_cents = (up_pos.net_size - up_pos.net_cost_usdc - down_pos.net_cost_usdc) * 100.0;
    let profit_if_down_cents = (down_pos.net_size - down_pos.net_cost_usdc - up_pos.net_cost_usdc) * 100.0;
    dashboard::push(
        tx,
        Snapshot {
            market_slug: market_slug.to_string(),
            strategy: cfg.id.clone(),
            up: TokenSnapshot {
                bid_cents: up.bid.map(|p| p.to_cents_f64() as i64),
                ask_cents: up.ask.map(|p| p.to_cents_f64() as i64),
                velocity: vel,
            },
            down: TokenSnapshot {
                bid_cents: down.bid.map(|p| p.to_cents_f64() as i64),
                ask_cents: down.ask.map(|p| p.to_cents_f64() as i64),
                velocity: vel,
            },
            up_position: up_pos.net_size,
            down_position: down_pos.net_size,
            profit_if_up_cents,
            profit_if_down_cents,
            trades_this_cycle,
            pending_hedges: oms.unhedged_exposures(market_slug).len() as u32,
            risk_action: risk.status().current_action,
            gate_state: if in_end_protection {
                updown_engine::strategies::GateOutcome::EndOfCycleProtection
            } else {
                updown_engine::strategies::GateOutcome::Pass
            },
            cycle_end_s,
        },
    );
}
