use crate::pricing::complete_set::{price_complete_set_legs, select_profit, CompleteSetQuote};
use crate::types::TopOfBook;

use super::{cyclehedge::CycleHedgeInputs, Decision, Strategy};

/// Same complete-set machinery as `cyclehedge`, but additionally willing to
/// cross the spread (take liquidity with a FAK) on the leg that is already
/// at or through the target price, rather than only ever resting as maker.
/// Both strategies claim exclusive hedge ownership of their market slug
/// prefix; `StrategyRegistry` enforces that only one runs per market.
pub struct UnifiedArb;

impl Strategy for UnifiedArb {
    fn name(&self) -> &'static str {
        "unifiedarb"
    }
}

pub struct UnifiedArbInputs {
    pub common: CycleHedgeInputs,
    /// If a leg's current best ask is already at or below the chosen quote
    /// price plus this many cents, take it immediately instead of resting.
    pub cross_tolerance_cents: i64,
}

pub fn decide(inputs: &UnifiedArbInputs) -> Option<Decision> {
    let yes: TopOfBook = inputs.common.yes;
    let no: TopOfBook = inputs.common.no;
    let (yes_bid, yes_ask) = (yes.bid?.to_cents_f64() as i64, yes.ask?.to_cents_f64() as i64);
    let (no_bid, no_ask) = (no.bid?.to_cents_f64() as i64, no.ask?.to_cents_f64() as i64);

    let quote: CompleteSetQuote = if inputs.common.dynamic_profit_selection {
        select_profit(
            yes_bid,
            yes_ask,
            no_bid,
            no_ask,
            inputs.common.profit_min_cents,
            inputs.common.profit_max_cents,
            inputs.common.distance_penalty_bps,
            inputs.common.in_end_protection,
        )?
    } else {
        price_complete_set_legs(yes_bid, yes_ask, no_bid, no_ask, inputs.common.profit_min_cents)?
    };

    // If the YES ask has already drifted down to our chosen price (within
    // tolerance), take it directly rather than resting and risking a fill
    // race on the cheaper leg.
    if yes_ask - inputs.cross_tolerance_cents <= quote.yes_bid_cents {
        return Some(Decision::PlaceEntry {
            token_type: crate::types::TokenType::Up,
            price_cents: yes_ask,
            size: inputs.common.size,
        });
    }
    if no_ask - inputs.cross_tolerance_cents <= quote.no_bid_cents {
        return Some(Decision::PlaceEntry {
            token_type: crate::types::TokenType::Down,
            price_cents: no_ask,
            size: inputs.common.size,
        });
    }

    Some(Decision::PlaceCompleteSet {
        yes_bid_cents: quote.yes_bid_cents,
        no_bid_cents: quote.no_bid_cents,
        size: inputs.common.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pips;

    fn book(bid_cents: i64, ask_cents: i64) -> TopOfBook {
        TopOfBook {
            bid: Some(Pips::from_cents(bid_cents)),
            ask: Some(Pips::from_cents(ask_cents)),
        }
    }

    fn base_common() -> CycleHedgeInputs {
        CycleHedgeInputs {
            yes: book(47, 52),
            no: book(48, 53),
            profit_min_cents: 5,
            profit_max_cents: 5,
            dynamic_profit_selection: false,
            distance_penalty_bps: 50,
            in_end_protection: false,
            size: 10.0,
        }
    }

    #[test]
    fn test_rests_as_maker_when_no_leg_is_crossable() {
        let inputs = UnifiedArbInputs {
            common: base_common(),
            cross_tolerance_cents: 0,
        };
        let decision = decide(&inputs).unwrap();
        assert!(matches!(decision, Decision::PlaceCompleteSet { .. }));
    }

    #[test]
    fn test_crosses_yes_leg_when_ask_within_tolerance() {
        let mut common = base_common();
        common.yes = book(47, 48); // ask has drifted down near the chosen bid
        let inputs = UnifiedArbInputs {
            common,
            cross_tolerance_cents: 1,
        };
        let decision = decide(&inputs).unwrap();
        match decision {
            Decision::PlaceEntry { token_type, .. } => assert_eq!(token_type, crate::types::TokenType::Up),
            other => panic!("expected PlaceEntry, got {other:?}"),
        }
    }
}
