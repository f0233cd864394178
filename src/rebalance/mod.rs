// src/rebalance/mod.rs
//! Rebalance math: fee schedule, debt-adjustment calculator, flash-loan
//! source selection, and the swap-quote negotiation loop.

pub mod calculator;
pub mod fees;
pub mod flash_loan;
pub mod negotiator;

use crate::position::PositionValues;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceDirection {
    /// Increase leverage: borrow more debt, supply more collateral.
    Boost,
    /// Decrease leverage: sell collateral, repay debt.
    Repay,
}

/// Unit-fraction fee layers applied during a rebalance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RebalanceFees {
    /// Protocol fee taken from the credited side.
    pub protocol: f64,
    /// Lending-pool borrow fee on the borrowed leg.
    pub lp_borrow: f64,
    /// Flash-loan premium on the bridged amount.
    pub flash_loan: f64,
}

impl RebalanceFees {
    /// Combines the protocol fee schedule with the venue's fee layers.
    pub fn from_schedule(
        breakdown: &fees::FeeBreakdown,
        lp_borrow_fee_bps: u16,
        flash_loan_fee_bps: u16,
    ) -> Self {
        Self {
            protocol: crate::utils::from_bps(breakdown.total_bps),
            lp_borrow: crate::utils::from_bps(lp_borrow_fee_bps),
            flash_loan: crate::utils::from_bps(flash_loan_fee_bps),
        }
    }
}

/// Result of the debt-adjustment computation for one rebalance attempt.
/// Produced fresh per attempt, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct DebtAdjustment {
    pub direction: RebalanceDirection,
    /// Signed USD amount to move: positive for boosts, negative for repays.
    pub debt_adjustment_usd: f64,
    pub end_result: PositionValues,
    /// Utilization rate after the flash-loan-financed leg lands but before
    /// the fee-adjusted leg. Flash-loan requirement checks must use this,
    /// not the end rate.
    pub intermediary_liq_utilization_rate_bps: u16,
    pub repaying_close_to_max_ltv: bool,
}

pub use calculator::{debt_adjustment, liq_utilization_rate_bps};
pub use fees::{fee_bps, FeeBreakdown};
pub use flash_loan::{select_source, FlashLoanRequirement, LiquiditySource};
pub use negotiator::{find_sufficient_quote, RebalanceSwapContext, SwapCriteria};
