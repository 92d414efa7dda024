use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::types::Market;

/// Discover the current or next UP/DOWN market via the Gamma API.
///
/// Strategy: compute the expected slug from the current timestamp plus the
/// strategy's window length, try the current window first (might be
/// mid-cycle), then the next window. Markets whose slug carries no unix
/// timestamp (e.g. hourly markets with human-readable slugs) never resolve
/// this way, so fall back to a series_id search.
pub async fn discover_next_market(client: &reqwest::Client, config: &StrategyConfig) -> Result<Market, String> {
    let now_s = chrono::Utc::now().timestamp();
    let ws = config.window_secs.max(1);

    let current_window_start = (now_s / ws) * ws;
    let next_window_start = current_window_start + ws;

    for &window_start in &[current_window_start, next_window_start] {
        let slug = format!("{}{}", config.market_slug_prefix, window_start);
        debug!(%slug, "trying market discovery slug");

        match fetch_event_by_slug(client, &config.gamma_api_url, &slug, config).await {
            Ok(Some(market)) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                if market.cycle_start_s * 1000 + ws * 1000 < now_ms {
                    debug!(%slug, "market already ended, skipping");
                    continue;
                }
                info!(slug = %market.slug, "market discovered");
                return Ok(market);
            }
            Ok(None) => debug!(%slug, "slug not found"),
            Err(e) => warn!(%slug, error = %e, "discovery fetch error"),
        }
    }

    if config.series_id.is_empty() {
        return Err(format!(
            "no market found for prefix '{}' and no series_id configured for fallback",
            config.market_slug_prefix
        ));
    }

    warn!(series_id = %config.series_id, "slug lookup failed, falling back to series_id search");
    discover_via_series(client, config).await
}

async fn fetch_event_by_slug(
    client: &reqwest::Client,
    gamma_api_url: &str,
    slug: &str,
    config: &StrategyConfig,
) -> Result<Option<Market>, String> {
    let url = format!("{gamma_api_url}/events?slug={slug}");
    let resp = client.get(&url).send().await.map_err(|e| format!("HTTP error: {e}"))?;
    let text = resp.text().await.map_err(|e| format!("body error: {e}"))?;
    let events: serde_json::Value = serde_json::from_str(&text).map_err(|e| format!("JSON error: {e}"))?;

    let events_arr = match events.as_array() {
        Some(arr) if !arr.is_empty() => arr,
        _ => return Ok(None),
    };

    parse_event_to_market(&events_arr[0], slug, config)
}

fn parse_event_to_market(event: &serde_json::Value, slug: &str, config: &StrategyConfig) -> Result<Option<Market>, String> {
    let markets = match event.get("markets").and_then(|m| m.as_array()) {
        Some(m) if !m.is_empty() => m,
        _ => return Ok(None),
    };

    let cycle_start_s = slug
        .rsplit('-')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    if cycle_start_s == 0 {
        return Ok(None);
    }

    let (up_token, down_token) = extract_token_ids(markets);
    if up_token.is_empty() || down_token.is_empty() {
        debug!(%slug, "skipping, can't find UP/DOWN tokens");
        return Ok(None);
    }

    Ok(Some(Market {
        slug: slug.to_string(),
        cycle_start_s,
        up_asset_id: up_token,
        down_asset_id: down_token,
        tick_pips: config.tick_pips,
        neg_risk: config.neg_risk,
        condition_id: extract_condition_id(markets),
    }))
}

/// UP and DOWN outcomes of the same cycle share one CTF condition id; either
/// market entry carries it.
fn extract_condition_id(markets: &[serde_json::Value]) -> String {
    markets
        .iter()
        .find_map(|m| m.get("conditionId").and_then(|c| c.as_str()))
        .unwrap_or("")
        .to_string()
}

/// Extract UP and DOWN token IDs from the markets array. Handles both the
/// two-market format (one market per outcome) and the single-market format
/// with outcomes/clobTokenIds carried as JSON-encoded array strings.
fn extract_token_ids(markets: &[serde_json::Value]) -> (String, String) {
    let mut up_token = String::new();
    let mut down_token = String::new();

    if markets.len() == 2 {
        for market in markets {
            let outcome = market
                .get("groupItemTitle")
                .or_else(|| market.get("outcome"))
                .and_then(|o| o.as_str())
                .unwrap_or("")
                .to_lowercase();
            let token_id = extract_first_token_id(market);

            if outcome.contains("up") || outcome.contains("yes") || outcome.contains("higher") {
                up_token = token_id;
            } else if outcome.contains("down") || outcome.contains("no") || outcome.contains("lower") {
                down_token = token_id;
            }
        }
    }

    if up_token.is_empty() || down_token.is_empty() {
        for market in markets {
            let outcomes_str = market.get("outcomes").and_then(|o| o.as_str()).unwrap_or("");
            let tokens_str = market.get("clobTokenIds").and_then(|t| t.as_str()).unwrap_or("");

            if let (Ok(outcomes), Ok(tokens)) = (
                serde_json::from_str::<Vec<String>>(outcomes_str),
                serde_json::from_str::<Vec<String>>(tokens_str),
            ) {
                for (outcome, token) in outcomes.iter().zip(tokens.iter()) {
                    let lower = outcome.to_lowercase();
                    if lower.contains("up") || lower.contains("yes") || lower.contains("higher") {
                        up_token = token.clone();
                    } else if lower.contains("down") || lower.contains("no") || lower.contains("lower") {
                        down_token = token.clone();
                    }
                }
            }
        }
    }

    (up_token, down_token)
}

fn extract_first_token_id(market: &serde_json::Value) -> String {
    let Some(raw) = market.get("clobTokenIds") else {
        return String::new();
    };
    if let Some(s) = raw.as_str() {
        if s.starts_with('[') {
            if let Ok(tokens) = serde_json::from_str::<Vec<String>>(s) {
                return tokens.into_iter().next().unwrap_or_default();
            }
        }
        return s.to_string();
    }
    if let Some(arr) = raw.as_array() {
        return arr.first().and_then(|v| v.as_str()).unwrap_or("").to_string();
    }
    String::new()
}

async fn discover_via_series(client: &reqwest::Client, config: &StrategyConfig) -> Result<Market, String> {
    let url = format!(
        "{}/events?series_id={}&active=true&closed=false&limit=100&order=endDate&ascending=false",
        config.gamma_api_url, config.series_id
    );
    let resp = client.get(&url).send().await.map_err(|e| format!("HTTP error: {e}"))?;
    let text = resp.text().await.map_err(|e| format!("body error: {e}"))?;
    let events: serde_json::Value = serde_json::from_str(&text).map_err(|e| format!("JSON error: {e}"))?;
    let events_arr = events.as_array().ok_or("expected array of events")?;

    let now_s = chrono::Utc::now().timestamp();
    let mut best: Option<Market> = None;
    let mut best_start = i64::MAX;

    for event in events_arr {
        let slug = event.get("slug").and_then(|s| s.as_str()).unwrap_or("");
        match parse_event_to_market(event, slug, config) {
            Ok(Some(market)) if market.cycle_start_s + config.window_secs >= now_s && market.cycle_start_s < best_start => {
                best_start = market.cycle_start_s;
                best = Some(market);
            }
            _ => continue,
        }
    }

    best.ok_or_else(|| format!("no active market found for series_id '{}'", config.series_id))
}
