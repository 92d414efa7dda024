use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::TopOfBook;

#[derive(Clone, Copy, Debug)]
pub struct GateOptions {
    pub max_book_age_ms: i64,
    pub max_spread_pips: i64,
    pub min_score: u8,
}

#[derive(Clone, Debug)]
pub struct MarketSnapshot {
    pub up: TopOfBook,
    pub down: TopOfBook,
    pub age_ms: i64,
    pub source: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GateDecision {
    pub score: u8,
    pub complete: bool,
    pub fresh: bool,
    pub source: String,
    pub up_spread_pips: Option<i64>,
    pub down_spread_pips: Option<i64>,
    pub problems: Vec<String>,
}

impl GateDecision {
    pub fn tradable(&self, min_score: u8) -> bool {
        self.score >= min_score && self.complete && self.fresh
    }
}

/// Scores top-of-book quality deterministically: completeness (both sides
/// present, ask > bid), freshness (linear decay past the age limit), and
/// spread proximity to the configured limit. Identical inputs always produce
/// an identical decision.
pub fn evaluate(snapshot: &MarketSnapshot, options: &GateOptions) -> GateDecision {
    let mut problems = Vec::new();

    let up_spread = spread_pips(snapshot.up);
    let down_spread = spread_pips(snapshot.down);

    let complete = up_spread.is_some() && down_spread.is_some();
    if up_spread.is_none() {
        problems.push("up side incomplete or crossed".to_string());
    }
    if down_spread.is_none() {
        problems.push("down side incomplete or crossed".to_string());
    }

    let fresh = snapshot.age_ms <= options.max_book_age_ms;
    if !fresh {
        problems.push(format!(
            "book age {}ms exceeds limit {}ms",
            snapshot.age_ms, options.max_book_age_ms
        ));
    }

    let freshness_score = if snapshot.age_ms <= options.max_book_age_ms {
        100.0
    } else {
        // Linear decay: fully stale (score 0) at 3x the age limit.
        let decay_window = (options.max_book_age_ms * 2).max(1) as f64;
        let over = (snapshot.age_ms - options.max_book_age_ms) as f64;
        (100.0 - 100.0 * over / decay_window).clamp(0.0, 100.0)
    };

    let spread_score = match (up_spread, down_spread) {
        (Some(u), Some(d)) => {
            let worst = u.max(d) as f64;
            let limit = options.max_spread_pips.max(1) as f64;
            (100.0 - 100.0 * worst / limit).clamp(0.0, 100.0)
        }
        _ => 0.0,
    };

    let completeness_score = if complete { 100.0 } else { 0.0 };

    let score = ((freshness_score + spread_score + completeness_score) / 3.0).round() as u8;

    if score < options.min_score {
        problems.push(format!(
            "score {score} below min_score {}",
            options.min_score
        ));
    }

    GateDecision {
        score,
        complete,
        fresh,
        source: snapshot.source.to_string(),
        up_spread_pips: up_spread,
        down_spread_pips: down_spread,
        problems,
    }
}

fn spread_pips(tob: TopOfBook) -> Option<i64> {
    match (tob.bid, tob.ask) {
        (Some(bid), Some(ask)) if ask.0 > bid.0 => Some(ask.0 - bid.0),
        _ => None,
    }
}

/// Caches the last allow/deny decision per market slug so read-only
/// consumers (the dashboard) can display gate status without re-evaluating.
#[derive(Default)]
pub struct MarketQualityGate {
    last: Mutex<HashMap<String, (GateDecision, u8)>>,
}

impl MarketQualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate_and_cache(
        &self,
        market_slug: &str,
        snapshot: &MarketSnapshot,
        options: &GateOptions,
    ) -> GateDecision {
        let decision = evaluate(snapshot, options);
        self.last
            .lock()
            .unwrap()
            .insert(market_slug.to_string(), (decision.clone(), options.min_score));
        decision
    }

    /// Returns (allowed, reason, exists).
    pub fn last_decision(&self, market_slug: &str) -> (bool, String, bool) {
        match self.last.lock().unwrap().get(market_slug) {
            Some((decision, min_score)) => {
                let allowed = decision.tradable(*min_score);
                let reason = if allowed {
                    "ok".to_string()
                } else if !decision.problems.is_empty() {
                    decision.problems.join("; ")
                } else {
                    "not tradable".to_string()
                };
                (allowed, reason, true)
            }
            None => (false, "no decision yet".to_string(), false),
        }
    }
}
