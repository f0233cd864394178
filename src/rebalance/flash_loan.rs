// src/rebalance/flash_loan.rs
//! Flash-loan liquidity-source selection. Prefers protocol-owned liquidity;
//! from the third retry attempt the signer's own wallet balances become a
//! fallback source.

use super::RebalanceDirection;
use crate::error::{LeverageError, Result};
use log::{debug, warn};

/// Which side of the position the flash loan draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquiditySource {
    Supply,
    Debt,
}

/// USD value available on each side of a liquidity pool (or wallet).
#[derive(Debug, Clone, Copy, Default)]
pub struct SideLiquidity {
    pub supply_usd: f64,
    pub debt_usd: f64,
}

/// Flash-loan fee (bps) charged per side.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlashLoanFees {
    pub supply_fee_bps: u16,
    pub debt_fee_bps: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct FlashLoanRequirement {
    pub liquidity_source: LiquiditySource,
    pub signer_flash_loan: bool,
    pub fee_bps: u16,
}

/// Margin applied to available liquidity before comparing against the
/// required amount.
const LIQUIDITY_SAFETY_MARGIN: f64 = 0.95;

/// Retry attempt at which the signer's wallet becomes an eligible source.
const SIGNER_FALLBACK_ATTEMPT: u32 = 3;

fn pick_side(
    needed_usd: f64,
    liquidity: &SideLiquidity,
    direction: RebalanceDirection,
) -> Option<LiquiditySource> {
    let supply_ok = liquidity.supply_usd * LIQUIDITY_SAFETY_MARGIN >= needed_usd;
    let debt_ok = liquidity.debt_usd * LIQUIDITY_SAFETY_MARGIN >= needed_usd;

    let prefer_debt = direction == RebalanceDirection::Boost || !supply_ok;
    if prefer_debt && debt_ok {
        Some(LiquiditySource::Debt)
    } else if supply_ok {
        Some(LiquiditySource::Supply)
    } else {
        None
    }
}

/// Chooses a flash-loan source for `needed_usd`, or fails with
/// `InsufficientLiquidity` (fatal, never retried) when no side qualifies.
pub fn select_source(
    needed_usd: f64,
    protocol_liquidity: &SideLiquidity,
    signer_balances: &SideLiquidity,
    direction: RebalanceDirection,
    attempt: u32,
    fees: &FlashLoanFees,
) -> Result<FlashLoanRequirement> {
    if needed_usd <= 0.0 {
        return Err(LeverageError::InvalidInput(format!(
            "flash loan amount must be positive, got {}",
            needed_usd
        )));
    }

    if let Some(source) = pick_side(needed_usd, protocol_liquidity, direction) {
        debug!(
            "Flash loan source: protocol {:?} side for ${:.2}",
            source, needed_usd
        );
        return Ok(FlashLoanRequirement {
            liquidity_source: source,
            signer_flash_loan: false,
            fee_bps: fee_for(source, fees),
        });
    }

    if attempt >= SIGNER_FALLBACK_ATTEMPT {
        if let Some(source) = pick_side(needed_usd, signer_balances, direction) {
            warn!(
                "Protocol liquidity exhausted; using signer wallet {:?} side for ${:.2} (attempt {})",
                source, needed_usd, attempt
            );
            return Ok(FlashLoanRequirement {
                liquidity_source: source,
                signer_flash_loan: true,
                fee_bps: 0,
            });
        }
    }

    Err(LeverageError::InsufficientLiquidity(format!(
        "no flash loan source can cover ${:.2} (protocol supply ${:.2} / debt ${:.2})",
        needed_usd, protocol_liquidity.supply_usd, protocol_liquidity.debt_usd
    )))
}

fn fee_for(source: LiquiditySource, fees: &FlashLoanFees) -> u16 {
    match source {
        LiquiditySource::Supply => fees.supply_fee_bps,
        LiquiditySource::Debt => fees.debt_fee_bps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fees() -> FlashLoanFees {
        FlashLoanFees {
            supply_fee_bps: 9,
            debt_fee_bps: 5,
        }
    }

    #[test]
    fn test_boost_prefers_debt_side() {
        let protocol = SideLiquidity {
            supply_usd: 10_000.0,
            debt_usd: 10_000.0,
        };
        let req = select_source(
            1_000.0,
            &protocol,
            &SideLiquidity::default(),
            RebalanceDirection::Boost,
            0,
            &fees(),
        )
        .unwrap();
        assert_eq!(req.liquidity_source, LiquiditySource::Debt);
        assert!(!req.signer_flash_loan);
        assert_eq!(req.fee_bps, 5);
    }

    #[test]
    fn test_repay_prefers_supply_side() {
        let protocol = SideLiquidity {
            supply_usd: 10_000.0,
            debt_usd: 10_000.0,
        };
        let req = select_source(
            1_000.0,
            &protocol,
            &SideLiquidity::default(),
            RebalanceDirection::Repay,
            0,
            &fees(),
        )
        .unwrap();
        assert_eq!(req.liquidity_source, LiquiditySource::Supply);
        assert_eq!(req.fee_bps, 9);
    }

    #[test]
    fn test_thin_supply_flips_repay_to_debt_side() {
        // 1000 needed, 1020 available: the 0.95 margin disqualifies supply
        let protocol = SideLiquidity {
            supply_usd: 1_020.0,
            debt_usd: 10_000.0,
        };
        let req = select_source(
            1_000.0,
            &protocol,
            &SideLiquidity::default(),
            RebalanceDirection::Repay,
            0,
            &fees(),
        )
        .unwrap();
        assert_eq!(req.liquidity_source, LiquiditySource::Debt);
    }

    #[test]
    fn test_signer_fallback_gated_on_attempt() {
        let protocol = SideLiquidity::default();
        let wallet = SideLiquidity {
            supply_usd: 5_000.0,
            debt_usd: 5_000.0,
        };

        let early = select_source(
            1_000.0,
            &protocol,
            &wallet,
            RebalanceDirection::Boost,
            2,
            &fees(),
        );
        assert!(matches!(
            early,
            Err(LeverageError::InsufficientLiquidity(_))
        ));

        let late = select_source(
            1_000.0,
            &protocol,
            &wallet,
            RebalanceDirection::Boost,
            3,
            &fees(),
        )
        .unwrap();
        assert!(late.signer_flash_loan);
        assert_eq!(late.fee_bps, 0);
    }

    #[test]
    fn test_insufficient_everywhere_is_fatal() {
        let err = select_source(
            1_000_000.0,
            &SideLiquidity {
                supply_usd: 10.0,
                debt_usd: 10.0,
            },
            &SideLiquidity::default(),
            RebalanceDirection::Boost,
            5,
            &fees(),
        )
        .unwrap_err();
        assert!(!err.should_retry());
    }
}
