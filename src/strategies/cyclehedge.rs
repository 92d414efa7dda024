use crate::pricing::complete_set::{price_complete_set_legs, select_profit, CompleteSetQuote};
use crate::types::TopOfBook;

use super::{Decision, Strategy};

/// Maker-only complete-set hedge-lock strategy: never crosses the spread,
/// only posts both legs as resting maker orders and relies on the OMS's
/// entry-hedge lifecycle to fill and then hedge them.
pub struct CycleHedge;

impl Strategy for CycleHedge {
    fn name(&self) -> &'static str {
        "cyclehedge"
    }
}

pub struct CycleHedgeInputs {
    pub yes: TopOfBook,
    pub no: TopOfBook,
    pub profit_min_cents: i64,
    pub profit_max_cents: i64,
    pub dynamic_profit_selection: bool,
    pub distance_penalty_bps: i64,
    pub in_end_protection: bool,
    pub size: f64,
}

/// Chooses the complete-set quote (static target profit, or dynamic
/// best-scoring profit across the configured range) and turns it into a
/// `Decision`, or `None` if the book is incomplete or no feasible quote
/// exists at any profit level.
pub fn decide(inputs: &CycleHedgeInputs) -> Option<Decision> {
    let (yes_bid, yes_ask) = (inputs.yes.bid?.to_cents_f64() as i64, inputs.yes.ask?.to_cents_f64() as i64);
    let (no_bid, no_ask) = (inputs.no.bid?.to_cents_f64() as i64, inputs.no.ask?.to_cents_f64() as i64);

    let quote: CompleteSetQuote = if inputs.dynamic_profit_selection {
        select_profit(
            yes_bid,
            yes_ask,
            no_bid,
            no_ask,
            inputs.profit_min_cents,
            inputs.profit_max_cents,
            inputs.distance_penalty_bps,
            inputs.in_end_protection,
        )?
    } else {
        price_complete_set_legs(yes_bid, yes_ask, no_bid, no_ask, inputs.profit_min_cents)?
    };

    Some(Decision::PlaceCompleteSet {
        yes_bid_cents: quote.yes_bid_cents,
        no_bid_cents: quote.no_bid_cents,
        size: inputs.size,
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

    #[test]
    fn test_decide_produces_complete_set_for_the_worked_example() {
        let inputs = CycleHedgeInputs {
            yes: book(47, 52),
            no: book(48, 53),
            profit_min_cents: 5,
            profit_max_cents: 5,
            dynamic_profit_selection: false,
            distance_penalty_bps: 50,
            in_end_protection: false,
            size: 10.0,
        };
        let decision = decide(&inputs).unwrap();
        match decision {
            Decision::PlaceCompleteSet { yes_bid_cents, no_bid_cents, size } => {
                assert_eq!(yes_bid_cents, 47);
                assert_eq!(no_bid_cents, 48);
                assert_eq!(size, 10.0);
            }
            _ => panic!("expected PlaceCompleteSet"),
        }
    }

    #[test]
    fn test_decide_returns_none_on_missing_book_side() {
        let inputs = CycleHedgeInputs {
            yes: TopOfBook::default(),
            no: book(48, 53),
            profit_min_cents: 5,
            profit_max_cents: 5,
            dynamic_profit_selection: false,
            distance_penalty_bps: 50,
            in_end_protection: false,
            size: 10.0,
        };
        assert!(decide(&inputs).is_none());
    }

    #[test]
    fn test_decide_returns_none_when_infeasible() {
        let inputs = CycleHedgeInputs {
            yes: book(20, 22),
            no: book(20, 22),
            profit_min_cents: 50,
            profit_max_cents: 50,
            dynamic_profit_selection: false,
            distance_penalty_bps: 50,
            in_end_protection: false,
            size: 10.0,
        };
        assert!(decide(&inputs).is_none());
    }

    #[test]
    fn test_dynamic_profit_selection_enabled() {
        let inputs = CycleHedgeInputs {
            yes: book(47, 52),
            no: book(48, 53),
            profit_min_cents: 1,
            profit_max_cents: 5,
            dynamic_profit_selection: true,
            distance_penalty_bps: 50,
            in_end_protection: false,
            size: 10.0,
        };
        assert!(decide(&inputs).is_some());
    }
}
