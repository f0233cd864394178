// src/rebalance/calculator.rs
//! Pure utilization-rate and debt-adjustment math. Everything here is a
//! function of its inputs; the negotiation loop depends on that.

use super::{DebtAdjustment, RebalanceDirection, RebalanceFees};
use crate::position::PositionValues;
use crate::utils::{from_bps, BPS_SCALE};

/// Safety offset (bps) held back from max LTV when deriving boost bounds.
pub const MAX_LTV_SAFETY_OFFSET_BPS: u16 = 50;
/// Cushion (bps) subtracted from the liquidation threshold for repay bounds.
pub const REPAY_THRESHOLD_CUSHION_BPS: u16 = 1000;
/// Hard cap on how close to liquidation a repay trigger may sit.
pub const MAX_REPAY_FROM_CAP_BPS: u16 = 9000;

/// Debt value as a basis-point fraction of (supply value x liquidation
/// threshold). Zero for an empty supply side.
pub fn liq_utilization_rate_bps(supply_usd: f64, debt_usd: f64, liq_threshold_bps: u16) -> u16 {
    if supply_usd == 0.0 {
        return 0;
    }
    let rate = debt_usd / (supply_usd * from_bps(liq_threshold_bps));
    (rate * BPS_SCALE).round().clamp(0.0, u16::MAX as f64) as u16
}

/// Utilization rate at which debt reaches (max LTV - offset) of supply.
pub fn max_liq_utilization_rate_bps(
    max_ltv_bps: u16,
    liq_threshold_bps: u16,
    offset_bps: u16,
) -> u16 {
    if liq_threshold_bps == 0 {
        return 0;
    }
    let ltv = max_ltv_bps.saturating_sub(offset_bps) as f64;
    ((ltv / liq_threshold_bps as f64) * BPS_SCALE)
        .round()
        .min(BPS_SCALE) as u16
}

/// Highest allowed repay trigger for the platform's risk parameters.
pub fn max_repay_from_bps(max_ltv_bps: u16, liq_threshold_bps: u16) -> u16 {
    max_liq_utilization_rate_bps(
        max_ltv_bps,
        liq_threshold_bps.saturating_sub(REPAY_THRESHOLD_CUSHION_BPS),
        0,
    )
    .min(MAX_REPAY_FROM_CAP_BPS)
}

/// Highest allowed boost target for the platform's risk parameters.
pub fn max_boost_to_bps(max_ltv_bps: u16, liq_threshold_bps: u16) -> u16 {
    max_liq_utilization_rate_bps(max_ltv_bps, liq_threshold_bps, MAX_LTV_SAFETY_OFFSET_BPS)
}

/// Applies a signed USD debt adjustment to a position under the given fee
/// layers. Returns the end position and the intermediary utilization rate
/// observed after the flash-loan-financed leg but before the fee-adjusted
/// leg lands.
pub fn apply_debt_adjustment_usd(
    debt_adjustment_usd: f64,
    pos: &PositionValues,
    liq_threshold_bps: u16,
    fees: &RebalanceFees,
) -> (PositionValues, u16) {
    let is_boost = debt_adjustment_usd > 0.0;
    let da_minus_protocol_fee = debt_adjustment_usd * (1.0 - fees.protocol);
    let da_with_flash_loan = debt_adjustment_usd * (1.0 + fees.flash_loan);

    let mut new_pos = *pos;
    let intermediary;
    if is_boost {
        new_pos.debt_usd += da_with_flash_loan * (1.0 + fees.lp_borrow);
        intermediary =
            liq_utilization_rate_bps(new_pos.supply_usd, new_pos.debt_usd, liq_threshold_bps);
        new_pos.supply_usd += da_minus_protocol_fee;
    } else {
        new_pos.supply_usd += da_with_flash_loan;
        intermediary =
            liq_utilization_rate_bps(new_pos.supply_usd, new_pos.debt_usd, liq_threshold_bps);
        new_pos.debt_usd += da_minus_protocol_fee;
    }
    (new_pos, intermediary)
}

/// Signed USD amount to move so that the position lands on
/// `target_rate_bps` once all fee layers are honored.
pub fn debt_adjustment(
    pos: &PositionValues,
    liq_threshold_bps: u16,
    max_ltv_bps: u16,
    target_rate_bps: u16,
    fees: &RebalanceFees,
) -> DebtAdjustment {
    let current_rate = liq_utilization_rate_bps(pos.supply_usd, pos.debt_usd, liq_threshold_bps);
    let is_boost = current_rate < target_rate_bps;
    let direction = if is_boost {
        RebalanceDirection::Boost
    } else {
        RebalanceDirection::Repay
    };

    let target = from_bps(target_rate_bps);
    let lt = from_bps(liq_threshold_bps);
    let numerator = target * lt * pos.supply_usd - pos.debt_usd;

    let debt_adjustment_usd = if is_boost {
        numerator
            / (1.0 + fees.lp_borrow + fees.flash_loan - target * (1.0 - fees.protocol) * lt)
    } else {
        numerator / ((1.0 - fees.protocol) - target * lt * (1.0 + fees.flash_loan))
    };

    let (end_result, intermediary_liq_utilization_rate_bps) =
        apply_debt_adjustment_usd(debt_adjustment_usd, pos, liq_threshold_bps, fees);

    let repaying_close_to_max_ltv = !is_boost
        && current_rate
            >= max_liq_utilization_rate_bps(
                max_ltv_bps,
                liq_threshold_bps,
                MAX_LTV_SAFETY_OFFSET_BPS,
            );

    DebtAdjustment {
        direction,
        debt_adjustment_usd,
        end_result,
        intermediary_liq_utilization_rate_bps,
        repaying_close_to_max_ltv,
    }
}

/// Convenience wrapper returning the end-state rate of an adjustment.
pub fn end_rate_bps(adjustment: &DebtAdjustment, liq_threshold_bps: u16) -> u16 {
    liq_utilization_rate_bps(
        adjustment.end_result.supply_usd,
        adjustment.end_result.debt_usd,
        liq_threshold_bps,
    )
}
