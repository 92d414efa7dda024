/// Complete-set leg pricing for `cyclehedge` / `unifiedarb`. All prices are
/// in cents (integers) to match the spec's worked example exactly; callers
/// convert to/from pips at the OMS boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompleteSetQuote {
    pub yes_bid_cents: i64,
    pub no_bid_cents: i64,
    pub profit_cents: i64,
}

/// Choose `(chosenYesBid, chosenNoBid)` for a fixed profit target such that
/// their sum locks exactly `profit_cents`, both stay strictly maker (below
/// the opposing ask), and both stay at or above their own observed best bid.
/// Returns `None` if no feasible pair exists.
pub fn price_complete_set_legs(
    yes_bid_cents: i64,
    yes_ask_cents: i64,
    no_bid_cents: i64,
    no_ask_cents: i64,
    profit_cents: i64,
) -> Option<CompleteSetQuote> {
    let total = 100 - profit_cents;

    let yes_lower = yes_bid_cents.max(1);
    let yes_upper_from_yes_ask = yes_ask_cents - 1;
    let yes_upper_from_no_bid = total - no_bid_cents.max(1);
    let yes_lower_from_no_ask = total - (no_ask_cents - 1);

    let feasible_lo = yes_lower.max(yes_lower_from_no_ask);
    let feasible_hi = yes_upper_from_yes_ask.min(yes_upper_from_no_bid);

    if feasible_lo > feasible_hi {
        return None;
    }

    // Tie-break: prefer YES at its feasible lower bound, raising only as far
    // as required to keep NO within its own constraints.
    let chosen_yes = feasible_lo;
    let chosen_no = total - chosen_yes;

    if chosen_yes < 1 || chosen_no < 1 {
        return None;
    }
    if chosen_yes > yes_ask_cents - 1 || chosen_no > no_ask_cents - 1 {
        return None;
    }

    Some(CompleteSetQuote {
        yes_bid_cents: chosen_yes,
        no_bid_cents: chosen_no,
        profit_cents,
    })
}

/// Dynamic profit selection: iterate `p` from `profit_min` to `profit_max`
/// and score each feasible price by how far it sits from the current best
/// bids, penalized more heavily in end protection (to favor prices that
/// fill over prices that pay more).
pub fn select_profit(
    yes_bid_cents: i64,
    yes_ask_cents: i64,
    no_bid_cents: i64,
    no_ask_cents: i64,
    profit_min: i64,
    profit_max: i64,
    distance_penalty_bps: i64,
    in_end_protection: bool,
) -> Option<CompleteSetQuote> {
    let penalty_multiplier = if in_end_protection { 2.5 } else { 1.0 };
    let mut best: Option<(f64, CompleteSetQuote)> = None;

    for p in profit_min..=profit_max {
        if let Some(quote) =
            price_complete_set_legs(yes_bid_cents, yes_ask_cents, no_bid_cents, no_ask_cents, p)
        {
            let distance = (yes_bid_cents - quote.yes_bid_cents)
                .abs()
                .max((no_bid_cents - quote.no_bid_cents).abs()) as f64;
            let score =
                p as f64 - (distance_penalty_bps as f64 / 100.0) * penalty_multiplier * distance;
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, quote));
            }
        }
    }

    best.map(|(_, q)| q)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario from the spec's worked example: yesBid=47, yesAsk=52,
    /// noBid=48, noAsk=53, profit=5.
    /// Expected: chosenYes=47, chosenNo=48 (sum=95=100-5).
    #[test]
    fn test_worked_example_profit_5() {
        let q = price_complete_set_legs(47, 52, 48, 53, 5).unwrap();
        assert_eq!(q.yes_bid_cents, 47);
        assert_eq!(q.no_bid_cents, 48);
        assert_eq!(q.yes_bid_cents + q.no_bid_cents, 95);
    }

    #[test]
    fn test_infeasible_when_spreads_too_tight() {
        // yesAsk-1 + noAsk-1 < 100 - profit is impossible to satisfy
        let q = price_complete_set_legs(50, 51, 50, 51, 1);
        assert!(q.is_none());
    }

    #[test]
    fn test_never_crosses_opposing_ask() {
        let q = price_complete_set_legs(47, 52, 48, 53, 3).unwrap();
        assert!(q.yes_bid_cents <= 52 - 1);
        assert!(q.no_bid_cents <= 53 - 1);
    }

    #[test]
    fn test_never_below_one_cent() {
        let q = price_complete_set_legs(1, 10, 1, 10, 5).unwrap();
        assert!(q.yes_bid_cents >= 1);
        assert!(q.no_bid_cents >= 1);
    }

    /// Scenario from the spec's worked example: dynamic selection over
    /// profitMin=1..profitMax=5 at the same top-of-book.
    /// Expected: p=5 is selected (feasible and highest score since its
    /// distance penalty term is unchanged at this book).
    #[test]
    fn test_dynamic_profit_selects_five_in_worked_example() {
        let q = select_profit(47, 52, 48, 53, 1, 5, 50, false).unwrap();
        assert_eq!(q.profit_cents, 5);
    }

    #[test]
    fn test_end_protection_increases_distance_penalty_weight() {
        // Construct a book where higher profit p requires moving further
        // from the current bid, so the penalty multiplier changes which p
        // scores best once amplified.
        let normal = select_profit(40, 60, 40, 60, 1, 15, 200, false).unwrap();
        let protected = select_profit(40, 60, 40, 60, 1, 15, 200, true).unwrap();
        // Under heavier end-protection penalty, the selected profit should
        // never exceed the normal selection (favors staying close to market).
        assert!(protected.profit_cents <= normal.profit_cents);
    }

    #[test]
    fn test_select_profit_infeasible_everywhere_returns_none() {
        let q = select_profit(50, 51, 50, 51, 1, 5, 50, false);
        assert!(q.is_none());
    }
}
