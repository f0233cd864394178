// src/rebalance/fees.rs
//! Tiered protocol-fee schedule. Pure function of its inputs; the quote
//! negotiation loop re-evaluates it on every iteration.

use super::RebalanceDirection;

/// Net worth at or below which the maximum boost fee applies.
const MIN_POSITION_SIZE_USD: f64 = 10_000.0;
/// Net worth at or above which the minimum boost fee applies.
const MAX_POSITION_SIZE_USD: f64 = 250_000.0;
const MAX_BOOST_FEE_BPS: f64 = 200.0;
const MIN_BOOST_FEE_BPS: f64 = 50.0;
/// Interpolation exponent between the two size boundaries.
const SIZE_CURVE_EXPONENT: f64 = 1.5;

/// Fee for rebalancing to an explicitly-supplied zero target (closing out).
const ZERO_TARGET_FEE_BPS: u16 = 25;
/// Fee for any other explicit target, and for repays.
const FIXED_FEE_BPS: u16 = 50;

/// Fraction knocked off the total fee when the position was referred.
const REFERRAL_DISCOUNT: f64 = 0.10;
/// Fraction of the discounted total paid out to the referrer.
const REFERRER_SHARE: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub protocol_bps: u16,
    pub referrer_bps: u16,
    pub total_bps: u16,
}

/// Protocol-fee basis points for one rebalance.
///
/// Explicit targets use the fixed tiers; boosts without an explicit target
/// log-interpolate on position size so large positions pay the floor rate.
pub fn fee_bps(
    direction: RebalanceDirection,
    is_referred: bool,
    target_rate_bps: Option<u16>,
    position_net_worth_usd: f64,
) -> FeeBreakdown {
    let mut total = match target_rate_bps {
        Some(0) => ZERO_TARGET_FEE_BPS as f64,
        Some(_) => FIXED_FEE_BPS as f64,
        None if direction == RebalanceDirection::Repay => FIXED_FEE_BPS as f64,
        None => boost_fee_bps(position_net_worth_usd),
    };

    let referrer = if is_referred {
        total = (total * (1.0 - REFERRAL_DISCOUNT)).round();
        (total * REFERRER_SHARE).floor()
    } else {
        0.0
    };

    FeeBreakdown {
        protocol_bps: (total - referrer) as u16,
        referrer_bps: referrer as u16,
        total_bps: total as u16,
    }
}

fn boost_fee_bps(position_net_worth_usd: f64) -> f64 {
    if position_net_worth_usd <= MIN_POSITION_SIZE_USD {
        return MAX_BOOST_FEE_BPS;
    }
    if position_net_worth_usd >= MAX_POSITION_SIZE_USD {
        return MIN_BOOST_FEE_BPS;
    }
    let t = (position_net_worth_usd.ln() - MIN_POSITION_SIZE_USD.ln())
        / (MAX_POSITION_SIZE_USD.ln() - MIN_POSITION_SIZE_USD.ln());
    (MIN_BOOST_FEE_BPS + (MAX_BOOST_FEE_BPS - MIN_BOOST_FEE_BPS) * (1.0 - t.powf(SIZE_CURVE_EXPONENT)))
        .round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_targets() {
        let zero_out = fee_bps(RebalanceDirection::Repay, false, Some(0), 50_000.0);
        assert_eq!(zero_out.total_bps, 25);
        assert_eq!(zero_out.referrer_bps, 0);
        assert_eq!(zero_out.protocol_bps, 25);

        let arbitrary = fee_bps(RebalanceDirection::Boost, false, Some(6000), 50_000.0);
        assert_eq!(arbitrary.total_bps, 50);
    }

    #[test]
    fn test_repay_is_flat() {
        for worth in [1_000.0, 50_000.0, 1_000_000.0] {
            let fees = fee_bps(RebalanceDirection::Repay, false, None, worth);
            assert_eq!(fees.total_bps, 50);
        }
    }

    #[test]
    fn test_boost_fee_clamped_at_size_boundaries() {
        let small = fee_bps(RebalanceDirection::Boost, false, None, 5_000.0);
        assert_eq!(small.total_bps, 200);
        let large = fee_bps(RebalanceDirection::Boost, false, None, 400_000.0);
        assert_eq!(large.total_bps, 50);
    }

    #[test]
    fn test_boost_fee_non_increasing_in_size() {
        let mut prev = u16::MAX;
        for worth in (1..=50).map(|i| i as f64 * 10_000.0) {
            let fees = fee_bps(RebalanceDirection::Boost, false, None, worth);
            assert!(
                fees.total_bps <= prev,
                "fee increased at worth {}: {} -> {}",
                worth,
                prev,
                fees.total_bps
            );
            prev = fees.total_bps;
        }
    }

    #[test]
    fn test_referral_split() {
        let fees = fee_bps(RebalanceDirection::Boost, true, None, 5_000.0);
        // 200 discounted by 10% = 180; referrer floor(180 * 0.15) = 27
        assert_eq!(fees.total_bps, 180);
        assert_eq!(fees.referrer_bps, 27);
        assert_eq!(fees.protocol_bps, 153);
        assert!(fees.referrer_bps > 0);
        assert!(fees.protocol_bps < fees.total_bps);
    }

    #[test]
    fn test_referred_always_pays_referrer() {
        for (dir, target) in [
            (RebalanceDirection::Boost, None),
            (RebalanceDirection::Repay, None),
            (RebalanceDirection::Repay, Some(0)),
            (RebalanceDirection::Boost, Some(4000)),
        ] {
            let fees = fee_bps(dir, true, target, 75_000.0);
            assert!(fees.referrer_bps > 0, "{:?}/{:?}", dir, target);
            assert_eq!(fees.protocol_bps + fees.referrer_bps, fees.total_bps);
        }
    }
}
