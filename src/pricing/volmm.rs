use crate::math::normal::cdf;

#[derive(Clone, Copy, Debug)]
pub struct VolMmInputs {
    pub strike: f64,
    pub underlying: f64,
    pub tau_s: f64,
    pub vel_norm: f64,
    pub acc_norm: f64,
    pub net_delta_shares: f64,
    pub k: f64,
    pub c: f64,
    pub kv: f64,
    pub ka: f64,
    pub p_min: f64,
    pub s_min: f64,
    pub alpha: f64,
    pub beta: f64,
    pub k_delta: f64,
    pub delta_max_shares: f64,
    pub tick_pips: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolMmQuotes {
    pub up_buy_pips: i64,
    pub up_sell_pips: i64,
    pub down_buy_pips: i64,
    pub down_sell_pips: i64,
}

const PIPS_FULL: i64 = 10_000;

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn round_to_tick(pips: f64, tick: i64) -> i64 {
    let tick = tick.max(1);
    let rounded = ((pips / tick as f64).round() as i64) * tick;
    rounded.clamp(tick, PIPS_FULL - tick)
}

/// Fair probability of UP: `z = K*(underlying-strike)/sqrt(tau) + C +
/// Kv*velNorm + Ka*accNorm`, `p_up = Phi(z)` clamped to `[pMin, 1-pMin]`.
pub fn fair_p_up(inputs: &VolMmInputs) -> f64 {
    let tau = inputs.tau_s.max(1e-6);
    let z = inputs.k * (inputs.underlying - inputs.strike) / tau.sqrt()
        + inputs.c
        + inputs.kv * inputs.vel_norm
        + inputs.ka * inputs.acc_norm;
    clip(cdf(z), inputs.p_min, 1.0 - inputs.p_min)
}

/// Half-spread: `s = max(sMin, alpha*|velNorm|, beta/sqrt(tau))`.
pub fn half_spread(inputs: &VolMmInputs) -> f64 {
    let tau = inputs.tau_s.max(1e-6);
    inputs
        .s_min
        .max(inputs.alpha * inputs.vel_norm.abs())
        .max(inputs.beta / tau.sqrt())
}

/// Inventory skew: `kDelta * clip(netDelta/deltaMaxShares, -1, 1) * s`.
pub fn inventory_skew(inputs: &VolMmInputs, s: f64) -> f64 {
    let ratio = if inputs.delta_max_shares > 0.0 {
        clip(inputs.net_delta_shares / inputs.delta_max_shares, -1.0, 1.0)
    } else {
        0.0
    };
    inputs.k_delta * ratio * s
}

/// Four desired maker quotes clamped to tick grid and `[tick, 10000-tick]`.
pub fn desired_quotes(inputs: &VolMmInputs) -> VolMmQuotes {
    let p_up = fair_p_up(inputs);
    let s = half_spread(inputs);
    let skew = inventory_skew(inputs, s);

    let up_buy = p_up - s - skew;
    let up_sell = p_up + s - skew;
    let down_buy = (1.0 - p_up) - s + skew;
    let down_sell = (1.0 - p_up) + s + skew;

    VolMmQuotes {
        up_buy_pips: round_to_tick(up_buy * PIPS_FULL as f64, inputs.tick_pips),
        up_sell_pips: round_to_tick(up_sell * PIPS_FULL as f64, inputs.tick_pips),
        down_buy_pips: round_to_tick(down_buy * PIPS_FULL as f64, inputs.tick_pips),
        down_sell_pips: round_to_tick(down_sell * PIPS_FULL as f64, inputs.tick_pips),
    }
}

/// Re-quote only when `|target - current|` in pips is at least
/// `replace_threshold_ticks * tick`.
pub fn should_replace(target_pips: i64, current_pips: i64, replace_threshold_ticks: i64, tick_pips: i64) -> bool {
    let threshold = replace_threshold_ticks * tick_pips;
    (target_pips - current_pips).abs() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> VolMmInputs {
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

    /// Scenario: underlying == strike, no velocity/acceleration/inventory.
    /// Expected: z=0, p_up=Phi(0)=0.5, quotes symmetric around 0.5.
    #[test]
    fn test_fair_p_up_at_the_money_is_half() {
        let inputs = base_inputs();
        let p = fair_p_up(&inputs);
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fair_p_up_clamped_to_p_min_bounds() {
        let mut inputs = base_inputs();
        inputs.underlying = 200_000.0; // far ITM for UP
        let p = fair_p_up(&inputs);
        assert!(p <= 1.0 - inputs.p_min);
        inputs.underlying = 1.0; // far OTM for UP
        let p = fair_p_up(&inputs);
        assert!(p >= inputs.p_min);
    }

    #[test]
    fn test_quotes_are_tick_aligned_and_in_range() {
        let inputs = base_inputs();
        let q = desired_quotes(&inputs);
        for px in [q.up_buy_pips, q.up_sell_pips, q.down_buy_pips, q.down_sell_pips] {
            assert_eq!(px % inputs.tick_pips, 0);
            assert!(px >= inputs.tick_pips);
            assert!(px <= PIPS_FULL - inputs.tick_pips);
        }
    }

    #[test]
    fn test_skew_shifts_quotes_down_with_long_up_inventory() {
        let mut inputs = base_inputs();
        inputs.net_delta_shares = 100.0; // max long UP exposure
        let skewed = desired_quotes(&inputs);
        inputs.net_delta_shares = 0.0;
        let neutral = desired_quotes(&inputs);
        // Positive inventory skew should push UP quotes down (sell inventory).
        assert!(skewed.up_buy_pips <= neutral.up_buy_pips);
    }

    /// Scenario from the spec's worked example: existing UP buy at 527 pips,
    /// target 530, threshold=3 ticks * 10 pips = 30 pips.
    /// Expected: |530-527|=3 < 30, no replace; target moves to 558,
    /// delta=31 >= 30, replace.
    #[test]
    fn test_requote_threshold_worked_example() {
        assert!(!should_replace(530, 527, 3, 10));
        assert!(should_replace(558, 527, 3, 10));
    }

    #[test]
    fn test_half_spread_floor_is_respected() {
        let inputs = base_inputs();
        let s = half_spread(&inputs);
        assert!(s >= inputs.s_min);
    }
}
