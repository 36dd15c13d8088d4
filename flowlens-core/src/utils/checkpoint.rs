//! Checkpoint arithmetic.
//!
//! Every continuously changing quantity in the projector (a token balance
//! under a net flow, the amount streamed by a flow) is stored as a
//! checkpoint `(amount, rate, timestamp)`. The functions here project a
//! checkpoint to an arbitrary instant. They are recomputed from the
//! checkpoint on every call, so calling them at any cadence never drifts.
//!
//! All arithmetic is 256-bit and saturating.

use alloy::primitives::{I256, U256};

/// Reinterpret an on-chain unsigned amount as a signed one.
///
/// Values above `I256::MAX` cannot be produced by a real token and saturate.
pub fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

fn seconds(value: u64) -> I256 {
    I256::from_raw(U256::from(value))
}

/// Project `checkpoint_amount` forward by `rate_per_second` from
/// `checkpoint_timestamp` to `now`.
///
/// A `now` earlier than the checkpoint counts as zero elapsed time.
pub fn current_amount(
    checkpoint_amount: I256,
    rate_per_second: I256,
    checkpoint_timestamp: u64,
    now: u64,
) -> I256 {
    let elapsed = now.saturating_sub(checkpoint_timestamp);
    if elapsed == 0 {
        return checkpoint_amount;
    }
    checkpoint_amount.saturating_add(rate_per_second.saturating_mul(seconds(elapsed)))
}

/// Collateral a flow of `flow_rate` must lock for `liquidation_period_seconds`.
pub fn required_deposit(flow_rate: I256, liquidation_period_seconds: u64) -> I256 {
    flow_rate.saturating_mul(seconds(liquidation_period_seconds))
}

/// The unix second at which `balance`, draining at `net_flow_rate` since
/// `last_update_timestamp`, reaches zero.
///
/// Returns `None` when the balance never depletes (`net_flow_rate >= 0`).
/// The result is rounded down to the whole second, so the projected balance
/// at the returned instant is below one second's worth of outflow.
pub fn depletion_date(
    balance: I256,
    net_flow_rate: I256,
    now: u64,
    last_update_timestamp: u64,
) -> Option<u64> {
    if !net_flow_rate.is_negative() {
        return None;
    }
    let outflow = net_flow_rate.unsigned_abs();
    let anchor = now.max(last_update_timestamp);
    let remaining = current_amount(balance, net_flow_rate, last_update_timestamp, anchor);
    if !remaining.is_positive() {
        // Already depleted: solve from the checkpoint instead.
        let budget = balance.max(I256::ZERO).into_raw();
        let lasted = u64::try_from(budget / outflow).unwrap_or(u64::MAX);
        return Some(last_update_timestamp.saturating_add(lasted));
    }
    let lasts = u64::try_from(remaining.into_raw() / outflow).unwrap_or(u64::MAX);
    Some(anchor.saturating_add(lasts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> I256 {
        I256::try_from(value).unwrap_or_default()
    }

    #[test]
    fn test_current_amount_projects_linearly() {
        assert_eq!(current_amount(int(500_000), int(-10), 1500, 1600), int(499_000));
        assert_eq!(current_amount(int(0), int(1000), 1000, 1500), int(500_000));
    }

    #[test]
    fn test_current_amount_clamps_past_instants() {
        assert_eq!(current_amount(int(42), int(7), 1000, 1000), int(42));
        assert_eq!(current_amount(int(42), int(7), 1000, 10), int(42));
        assert_eq!(current_amount(int(42), int(-7), 1000, 999), int(42));
    }

    #[test]
    fn test_current_amount_beyond_64_bits() {
        // 10^24 wei streamed at 10^18 per second for a day.
        let start = I256::from_dec_str("1000000000000000000000000").unwrap_or_default();
        let rate = I256::from_dec_str("1000000000000000000").unwrap_or_default();
        let expected = I256::from_dec_str("1086400000000000000000000").unwrap_or_default();
        assert_eq!(current_amount(start, rate, 0, 86_400), expected);
    }

    #[test]
    fn test_required_deposit() {
        assert_eq!(required_deposit(int(1000), 14_400), int(14_400_000));
        assert_eq!(required_deposit(int(0), 14_400), int(0));
    }

    #[test]
    fn test_depletion_date_never_for_non_negative_flow() {
        assert_eq!(depletion_date(int(1000), int(0), 10, 0), None);
        assert_eq!(depletion_date(int(1000), int(5), 10, 0), None);
    }

    #[test]
    fn test_depletion_date_reaches_zero() {
        let date = depletion_date(int(1000), int(-10), 0, 0);
        assert_eq!(date, Some(100));
        assert_eq!(current_amount(int(1000), int(-10), 0, 100), int(0));
    }

    #[test]
    fn test_depletion_date_rounds_down_to_the_second() {
        let date = depletion_date(int(1005), int(-10), 50, 50).unwrap_or_default();
        assert_eq!(date, 150);
        let left = current_amount(int(1005), int(-10), 50, date);
        assert!(left >= int(0) && left < int(10));
    }

    #[test]
    fn test_depletion_date_is_independent_of_now() {
        let from_checkpoint = depletion_date(int(10_000), int(-3), 1000, 1000);
        let later = depletion_date(int(10_000), int(-3), 2500, 1000);
        let before_checkpoint = depletion_date(int(10_000), int(-3), 10, 1000);
        assert_eq!(from_checkpoint, later);
        assert_eq!(from_checkpoint, before_checkpoint);
    }

    #[test]
    fn test_depletion_date_in_the_past() {
        assert_eq!(depletion_date(int(100), int(-10), 5000, 1000), Some(1010));
    }

    #[test]
    fn test_to_signed_saturates() {
        assert_eq!(to_signed(U256::from(7u64)), int(7));
        assert_eq!(to_signed(U256::MAX), I256::MAX);
    }
}
