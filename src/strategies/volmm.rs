use crate::pricing::volmm::{desired_quotes, should_replace, VolMmInputs, VolMmQuotes};
use crate::types::TokenType;

use super::{Decision, Strategy};

/// Volatility market-making strategy: quotes both sides of both tokens off a
/// model fair price rather than locking a complete-set arb, and re-quotes
/// only when the target has drifted far enough off the current resting
/// price to be worth the cancel/replace.
pub struct VolMm;

impl Strategy for VolMm {
    fn name(&self) -> &'static str {
        "volmm"
    }
}

pub struct VolMmStepInputs {
    pub model: VolMmInputs,
    pub current_up_buy_pips: Option<i64>,
    pub current_up_sell_pips: Option<i64>,
    pub current_down_buy_pips: Option<i64>,
    pub current_down_sell_pips: Option<i64>,
    pub replace_threshold_ticks: i64,
    pub size: f64,
}

/// One requote decision per side that actually needs replacing. Absent
/// current quotes always trigger the quote (nothing resting yet).
pub fn decide(inputs: &VolMmStepInputs) -> Vec<Decision> {
    let target: VolMmQuotes = desired_quotes(&inputs.model);
    let tick = inputs.model.tick_pips;
    let mut decisions = Vec::new();

    let up_needs_replace = match (inputs.current_up_buy_pips, inputs.current_up_sell_pips) {
        (Some(buy), Some(sell)) => {
            should_replace(target.up_buy_pips, buy, inputs.replace_threshold_ticks, tick)
                || should_replace(target.up_sell_pips, sell, inputs.replace_threshold_ticks, tick)
        }
        _ => true,
    };
    if up_needs_replace {
        decisions.push(Decision::RequoteMaker {
            token_type: TokenType::Up,
            buy_price_pips: target.up_buy_pips,
            sell_price_pips: target.up_sell_pips,
            size: inputs.size,
        });
    }

    let down_needs_replace = match (inputs.current_down_buy_pips, inputs.current_down_sell_pips) {
        (Some(buy), Some(sell)) => {
            should_replace(target.down_buy_pips, buy, inputs.replace_threshold_ticks, tick)
                || should_replace(target.down_sell_pips, sell, inputs.replace_threshold_ticks, tick)
        }
        _ => true,
    };
    if down_needs_replace {
        decisions.push(Decision::RequoteMaker {
            token_type: TokenType::Down,
            buy_price_pips: target.down_buy_pips,
            sell_price_pips: target.down_sell_pips,
            size: inputs.size,
        });
    }

    decisions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_model() -> VolMmInputs {
        VolMmInputs {
            strike: 60_000.0,
            underlying: 60_000.0,
            tau_s: 600.0,
            vel_norm: 0.0,
            acc_norm: 0.0,
            net_delta_shares: 0.0,
            k: 4.0,
            c: 0.0,
            kv: 0.1,
            ka: 0.05,
            p_min: 0.02,
            s_min: 0.003,
            alpha: 0.5,
            beta: 0.05,
            k_delta: 0.3,
            delta_max_shares: 100.0,
            tick_pips: 10,
        }
    }

    #[test]
    fn test_quotes_both_sides_when_nothing_resting() {
        let inputs = VolMmStepInputs {
            model: base_model(),
            current_up_buy_pips: None,
            current_up_sell_pips: None,
            current_down_buy_pips: None,
            current_down_sell_pips: None,
            replace_threshold_ticks: 3,
            size: 10.0,
        };
        let decisions = decide(&inputs);
        assert_eq!(decisions.len(), 2);
    }

    #[test]
    fn test_no_requote_when_within_threshold() {
        let model = base_model();
        let target = desired_quotes(&model);
        let inputs = VolMmStepInputs {
            model,
            current_up_buy_pips: Some(target.up_buy_pips),
            current_up_sell_pips: Some(target.up_sell_pips),
            current_down_buy_pips: Some(target.down_buy_pips),
            current_down_sell_pips: Some(target.down_sell_pips),
            replace_threshold_ticks: 3,
            size: 10.0,
        };
        assert!(decide(&inputs).is_empty());
    }

    #[test]
    fn test_requotes_side_that_drifted_past_threshold() {
        let model = base_model();
        let target = desired_quotes(&model);
        let inputs = VolMmStepInputs {
            model,
            current_up_buy_pips: Some(target.up_buy_pips - 1000), // far off, forces replace
            current_up_sell_pips: Some(target.up_sell_pips),
            current_down_buy_pips: Some(target.down_buy_pips),
            current_down_sell_pips: Some(target.down_sell_pips),
            replace_threshold_ticks: 3,
            size: 10.0,
        };
        let decisions = decide(&inputs);
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::RequoteMaker { token_type, .. } => assert_eq!(*token_type, TokenType::Up),
            other => panic!("expected RequoteMaker, got {other:?}"),
        }
    }
}
