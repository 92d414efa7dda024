use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{EngineError, EngineResult};

/// A duration that deserializes from either a string (`"15m"`, `"900s"`,
/// `"800ms"`) or a plain integer number of seconds, per the small
/// strongly-typed duration parser called for in the design notes. Ambiguous
/// input is rejected at config load rather than silently guessed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigDuration(pub Duration);

impl ConfigDuration {
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn as_millis_u64(self) -> u64 {
        self.0.as_millis() as u64
    }
}

fn parse_duration_str(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let (num_part, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, "m")
    } else if let Some(n) = s.strip_suffix('h') {
        (n, "h")
    } else {
        return Err(format!("duration '{s}' has no recognized unit (ms/s/m/h)"));
    };
    let value: f64 = num_part
        .parse()
        .map_err(|_| format!("duration '{s}' has a non-numeric magnitude"))?;
    if value < 0.0 {
        return Err(format!("duration '{s}' must not be negative"));
    }
    let millis = match unit {
        "ms" => value,
        "s" => value * 1000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        _ => unreachable!(),
    };
    Ok(Duration::from_millis(millis.round() as u64))
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurVisitor;
        impl<'de> Visitor<'de> for DurVisitor {
            type Value = ConfigDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a duration string (\"15m\", \"900s\") or an integer of seconds")
            }

            fn visit_str<E>(self, v: &str) -> Result<ConfigDuration, E>
            where
                E: de::Error,
            {
                parse_duration_str(v)
                    .map(ConfigDuration)
                    .map_err(de::Error::custom)
            }

            fn visit_u64<E>(self, v: u64) -> Result<ConfigDuration, E>
            where
                E: de::Error,
            {
                Ok(ConfigDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<ConfigDuration, E>
            where
                E: de::Error,
            {
                if v < 0 {
                    return Err(de::Error::custom("duration seconds must not be negative"));
                }
                Ok(ConfigDuration(Duration::from_secs(v as u64)))
            }
        }
        deserializer.deserialize_any(DurVisitor)
    }
}

fn default_hedge_reorder_timeout() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(15))
}
fn default_hedge_timeout_fak() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(25))
}
fn default_aggressive_hedge_timeout() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(25))
}
fn default_max_hedge_reorders() -> u32 {
    3
}
fn default_max_hedge_cancels() -> u32 {
    6
}
fn default_max_hedge_fak() -> u32 {
    1
}
fn default_max_entry_age() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(120))
}
fn default_per_entry_cooldown() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(30))
}
fn default_max_negative_profit_cents() -> i64 {
    5
}
fn default_risk_check_interval() -> ConfigDuration {
    ConfigDuration(Duration::from_millis(5000))
}
fn default_max_acceptable_loss_cents() -> i64 {
    200
}
fn default_cancel_all_throttle() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(2))
}
fn default_in_flight_max_arb() -> usize {
    8
}
fn default_in_flight_max_one_shot() -> usize {
    1
}
fn default_auto_merge_min_shares() -> f64 {
    5.0
}
fn default_min_score() -> u8 {
    60
}
fn default_max_book_age() -> ConfigDuration {
    ConfigDuration(Duration::from_millis(2500))
}
fn default_max_spread_pips() -> i64 {
    500
}
fn default_end_protection_secs() -> i64 {
    30
}
fn default_warmup() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(5))
}
fn default_cooldown_between_trades() -> ConfigDuration {
    ConfigDuration(Duration::from_secs(0))
}
fn default_max_trades_per_cycle() -> u32 {
    1_000_000
}
fn default_gamma_api_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_window_secs() -> i64 {
    900
}
fn default_tick_pips() -> i64 {
    100
}

/// Shared budgets and timing knobs for the entry/hedge state machine, the
/// complete-set pricing engine, and the gates in the strategy decision loop.
/// Every field documents its own default; `validate()` rejects out-of-range
/// values after deserialization rather than clamping them silently.
#[derive(Clone, Debug, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub kind: StrategyKind,
    pub market_slug_prefix: String,

    /// Series id used as the market-discovery fallback when slug-based
    /// lookup finds nothing (e.g. hourly markets with human-readable slugs).
    #[serde(default)]
    pub series_id: String,
    #[serde(default = "default_gamma_api_url")]
    pub gamma_api_url: String,
    /// Cycle length in seconds, used to compute the current/next window
    /// boundary when deriving the expected slug.
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
    #[serde(default = "default_tick_pips")]
    pub tick_pips: i64,
    #[serde(default)]
    pub neg_risk: bool,

    #[serde(default = "default_warmup")]
    pub cycle_warmup: ConfigDuration,
    #[serde(default = "default_cooldown_between_trades")]
    pub cooldown_between_trades: ConfigDuration,
    #[serde(default = "default_max_trades_per_cycle")]
    pub max_trades_per_cycle: u32,
    #[serde(default = "default_end_protection_secs")]
    pub end_protection_seconds: i64,

    #[serde(default = "default_min_score")]
    pub min_quality_score: u8,
    #[serde(default = "default_max_book_age")]
    pub max_book_age: ConfigDuration,
    #[serde(default = "default_max_spread_pips")]
    pub max_spread_pips: i64,

    #[serde(default = "default_hedge_reorder_timeout")]
    pub hedge_reorder_timeout: ConfigDuration,
    #[serde(default = "default_hedge_timeout_fak")]
    pub hedge_timeout_fak: ConfigDuration,
    #[serde(default = "default_aggressive_hedge_timeout")]
    pub aggressive_hedge_timeout: ConfigDuration,
    #[serde(default = "default_max_hedge_reorders")]
    pub per_entry_max_hedge_reorders: u32,
    #[serde(default = "default_max_hedge_cancels")]
    pub per_entry_max_hedge_cancels: u32,
    #[serde(default = "default_max_hedge_fak")]
    pub per_entry_max_hedge_fak: u32,
    #[serde(default = "default_max_entry_age")]
    pub per_entry_max_age: ConfigDuration,
    #[serde(default = "default_per_entry_cooldown")]
    pub per_entry_cooldown: ConfigDuration,
    #[serde(default = "default_max_negative_profit_cents")]
    pub max_negative_profit_cents: i64,
    #[serde(default = "default_cancel_all_throttle")]
    pub cancel_all_throttle: ConfigDuration,

    #[serde(default = "default_risk_check_interval")]
    pub risk_management_check_interval: ConfigDuration,
    #[serde(default = "default_max_acceptable_loss_cents")]
    pub max_acceptable_loss_cents: i64,

    #[serde(default = "default_auto_merge_min_shares")]
    pub auto_merge_min_shares: f64,

    /// Complete-set pricing parameters (cyclehedge / unifiedarb only).
    #[serde(default)]
    pub complete_set: Option<CompleteSetConfig>,

    /// Volatility market-making parameters (volmm family only).
    #[serde(default)]
    pub volmm: Option<VolMmConfig>,

    #[serde(default)]
    pub target_notional_usdc: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CycleHedge,
    UnifiedArb,
    VolMm,
}

fn default_profit_min() -> i64 {
    1
}
fn default_profit_max() -> i64 {
    5
}
fn default_distance_penalty_bps() -> i64 {
    50
}
fn default_requote_interval() -> ConfigDuration {
    ConfigDuration(Duration::from_millis(800))
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompleteSetConfig {
    #[serde(default = "default_profit_min")]
    pub profit_min_cents: i64,
    #[serde(default = "default_profit_max")]
    pub profit_max_cents: i64,
    #[serde(default)]
    pub dynamic_profit_selection: bool,
    #[serde(default = "default_distance_penalty_bps")]
    pub distance_penalty_bps: i64,
    #[serde(default = "default_requote_interval")]
    pub requote_interval: ConfigDuration,
}

fn default_k() -> f64 {
    4.0
}
fn default_c() -> f64 {
    0.0
}
fn default_p_min() -> f64 {
    0.02
}
fn default_s_min() -> f64 {
    0.003
}
fn default_alpha() -> f64 {
    0.5
}
fn default_beta() -> f64 {
    0.05
}
fn default_k_delta() -> f64 {
    0.3
}
fn default_delta_max_shares() -> f64 {
    100.0
}
fn default_replace_threshold_ticks() -> i64 {
    3
}

#[derive(Clone, Debug, Deserialize)]
pub struct VolMmConfig {
    #[serde(default = "default_k")]
    pub k: f64,
    #[serde(default = "default_c")]
    pub c: f64,
    #[serde(default)]
    pub kv: f64,
    #[serde(default)]
    pub ka: f64,
    #[serde(default = "default_p_min")]
    pub p_min: f64,
    #[serde(default = "default_s_min")]
    pub s_min: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_k_delta")]
    pub k_delta: f64,
    #[serde(default = "default_delta_max_shares")]
    pub delta_max_shares: f64,
    #[serde(default = "default_replace_threshold_ticks")]
    pub replace_threshold_ticks: i64,
    pub velocity_window: ConfigDuration,
    pub accel_window: ConfigDuration,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct StrategiesFile {
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl StrategyConfig {
    /// Validates ranges not expressible through the type system, matching
    /// §7's "configuration error... process exits with code 1" contract:
    /// the caller maps any `Err` here to a process exit.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Configuration("strategy id must not be empty".into()));
        }
        if !validate_slug_prefix(&self.market_slug_prefix) {
            return Err(EngineError::Configuration(format!(
                "market_slug_prefix '{}' must look like '{{symbol}}-{{kind}}-{{timeframe}}-'",
                self.market_slug_prefix
            )));
        }
        if self.min_quality_score > 100 {
            return Err(EngineError::Configuration(
                "min_quality_score must be between 0 and 100".into(),
            ));
        }
        if self.max_spread_pips < 0 {
            return Err(EngineError::Configuration("max_spread_pips must be >= 0".into()));
        }
        if self.per_entry_max_hedge_reorders == 0 {
            return Err(EngineError::Configuration(
                "per_entry_max_hedge_reorders must be >= 1".into(),
            ));
        }
        if self.max_acceptable_loss_cents < 0 {
            return Err(EngineError::Configuration(
                "max_acceptable_loss_cents must be >= 0".into(),
            ));
        }
        if self.auto_merge_min_shares < 0.0 {
            return Err(EngineError::Configuration(
                "auto_merge_min_shares must be >= 0".into(),
            ));
        }
        match self.kind {
            StrategyKind::CycleHedge | StrategyKind::UnifiedArb => {
                let cs = self.complete_set.as_ref().ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "strategy '{}' is {:?} and requires a complete_set section",
                        self.id, self.kind
                    ))
                })?;
                if cs.profit_min_cents < 0 || cs.profit_max_cents < cs.profit_min_cents {
                    return Err(EngineError::Configuration(
                        "complete_set.profit_min_cents/profit_max_cents out of range".into(),
                    ));
                }
                if self.target_notional_usdc <= 0.0 {
                    return Err(EngineError::Configuration(
                        "target_notional_usdc must be > 0 for complete-set strategies".into(),
                    ));
                }
            }
            StrategyKind::VolMm => {
                let vm = self.volmm.as_ref().ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "strategy '{}' is volmm and requires a volmm section",
                        self.id
                    ))
                })?;
                if !(0.0..0.5).contains(&vm.p_min) {
                    return Err(EngineError::Configuration(
                        "volmm.p_min must be in [0, 0.5)".into(),
                    ));
                }
                if vm.replace_threshold_ticks < 0 {
                    return Err(EngineError::Configuration(
                        "volmm.replace_threshold_ticks must be >= 0".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Minimal valid config for a given kind, used by other modules' tests
    /// that need a `StrategyConfig` but aren't testing config parsing itself.
    pub fn test_default(kind: StrategyKind, market_slug_prefix: &str) -> Self {
        let complete_set = matches!(kind, StrategyKind::CycleHedge | StrategyKind::UnifiedArb).then(|| CompleteSetConfig {
            profit_min_cents: default_profit_min(),
            profit_max_cents: default_profit_max(),
            dynamic_profit_selection: false,
            distance_penalty_bps: default_distance_penalty_bps(),
            requote_interval: default_requote_interval(),
        });
        let volmm = matches!(kind, StrategyKind::VolMm).then(|| VolMmConfig {
            k: default_k(),
            c: default_c(),
            kv: 0.0,
            ka: 0.0,
            p_min: default_p_min(),
            s_min: default_s_min(),
            alpha: default_alpha(),
            beta: default_beta(),
            k_delta: default_k_delta(),
            delta_max_shares: default_delta_max_shares(),
            replace_threshold_ticks: default_replace_threshold_ticks(),
            velocity_window: ConfigDuration(Duration::from_secs(10)),
            accel_window: ConfigDuration(Duration::from_secs(20)),
        });
        Self {
            id: "test".to_string(),
            kind,
            market_slug_prefix: market_slug_prefix.to_string(),
            series_id: String::new(),
            gamma_api_url: default_gamma_api_url(),
            window_secs: default_window_secs(),
            tick_pips: default_tick_pips(),
            neg_risk: false,
            cycle_warmup: default_warmup(),
            cooldown_between_trades: default_cooldown_between_trades(),
            max_trades_per_cycle: default_max_trades_per_cycle(),
            end_protection_seconds: default_end_protection_secs(),
            min_quality_score: default_min_score(),
            max_book_age: default_max_book_age(),
            max_spread_pips: default_max_spread_pips(),
            hedge_reorder_timeout: default_hedge_reorder_timeout(),
            hedge_timeout_fak: default_hedge_timeout_fak(),
            aggressive_hedge_timeout: default_aggressive_hedge_timeout(),
            per_entry_max_hedge_reorders: default_max_hedge_reorders(),
            per_entry_max_hedge_cancels: default_max_hedge_cancels(),
            per_entry_max_hedge_fak: default_max_hedge_fak(),
            per_entry_max_age: default_max_entry_age(),
            per_entry_cooldown: default_per_entry_cooldown(),
            max_negative_profit_cents: default_max_negative_profit_cents(),
            cancel_all_throttle: default_cancel_all_throttle(),
            risk_management_check_interval: default_risk_check_interval(),
            max_acceptable_loss_cents: default_max_acceptable_loss_cents(),
            auto_merge_min_shares: default_auto_merge_min_shares(),
            complete_set,
            volmm,
            target_notional_usdc: 50.0,
        }
    }
}

/// Market slug format: `{symbol}-{kind}-{timeframe}-{unixCycleStart}`.
/// A bare prefix config field must end with a trailing `-` so the cycle
/// parser can safely split off the trailing unix timestamp.
pub fn validate_slug_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.ends_with('-') && prefix.matches('-').count() >= 3
}

pub fn load_strategies_yaml(path: &std::path::Path) -> EngineResult<Vec<StrategyConfig>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Configuration(format!("reading {}: {e}", path.display())))?;
    let file: StrategiesFile = serde_yaml::from_str(&text)
        .map_err(|e| EngineError::Configuration(format!("parsing {}: {e}", path.display())))?;
    for s in &file.strategies {
        s.validate()?;
    }
    Ok(file.strategies)
}
