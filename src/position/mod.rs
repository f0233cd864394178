// src/position/mod.rs
//! Two-asset (supply/debt) leveraged position model and its automation
//! settings, expressed in USD value and basis points.

use crate::error::{LeverageError, Result};
use crate::rebalance::calculator::{
    liq_utilization_rate_bps, max_boost_to_bps, max_repay_from_bps,
};
use crate::rebalance::RebalanceDirection;
use serde::{Deserialize, Serialize};

/// USD value of the two sides of a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionValues {
    pub supply_usd: f64,
    pub debt_usd: f64,
}

impl PositionValues {
    pub fn new(supply_usd: f64, debt_usd: f64) -> Self {
        Self {
            supply_usd,
            debt_usd,
        }
    }

    pub fn net_worth_usd(&self) -> f64 {
        self.supply_usd - self.debt_usd
    }
}

/// Target band settings driving automated boosts and repays.
///
/// `repay_from = repay_to + repay_gap` and `boost_from = boost_to - boost_gap`
/// are the trigger edges; both must stay inside the platform-derived bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub boost_to_bps: u16,
    pub boost_gap: u16,
    pub repay_to_bps: u16,
    pub repay_gap: u16,
}

impl AutomationSettings {
    pub fn boost_from_bps(&self) -> u16 {
        self.boost_to_bps.saturating_sub(self.boost_gap)
    }

    pub fn repay_from_bps(&self) -> u16 {
        self.repay_to_bps.saturating_add(self.repay_gap)
    }

    pub fn validate(&self, max_ltv_bps: u16, liq_threshold_bps: u16) -> Result<()> {
        if self.boost_gap == 0 || self.repay_gap == 0 {
            return Err(LeverageError::InvalidInput(
                "boost_gap and repay_gap must be non-zero".to_string(),
            ));
        }
        if self.boost_to_bps >= self.repay_to_bps {
            return Err(LeverageError::InvalidInput(format!(
                "boost_to ({}) must sit below repay_to ({})",
                self.boost_to_bps, self.repay_to_bps
            )));
        }
        let max_repay_from = max_repay_from_bps(max_ltv_bps, liq_threshold_bps);
        if self.repay_from_bps() > max_repay_from {
            return Err(LeverageError::InvalidInput(format!(
                "repay_from ({}) exceeds platform maximum ({})",
                self.repay_from_bps(),
                max_repay_from
            )));
        }
        let max_boost_to = max_boost_to_bps(max_ltv_bps, liq_threshold_bps);
        if self.boost_to_bps > max_boost_to {
            return Err(LeverageError::InvalidInput(format!(
                "boost_to ({}) exceeds platform maximum ({})",
                self.boost_to_bps, max_boost_to
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub values: PositionValues,
    pub liq_threshold_bps: u16,
    pub max_ltv_bps: u16,
    pub settings: AutomationSettings,
}

impl Position {
    pub fn current_liq_utilization_rate_bps(&self) -> u16 {
        liq_utilization_rate_bps(
            self.values.supply_usd,
            self.values.debt_usd,
            self.liq_threshold_bps,
        )
    }

    /// Which rebalance, if any, the current utilization rate calls for.
    /// Boost when below the boost-from edge, repay at or above the
    /// repay-from edge, nothing inside the band.
    pub fn eligible_rebalance_direction(&self) -> Option<RebalanceDirection> {
        let rate = self.current_liq_utilization_rate_bps();
        if rate < self.settings.boost_from_bps() {
            Some(RebalanceDirection::Boost)
        } else if rate >= self.settings.repay_from_bps() {
            Some(RebalanceDirection::Repay)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position {
            values: PositionValues::new(1000.0, 0.0),
            liq_threshold_bps: 8181,
            max_ltv_bps: 6400,
            settings: AutomationSettings {
                boost_to_bps: 4000,
                boost_gap: 1000,
                repay_to_bps: 7500,
                repay_gap: 1000,
            },
        }
    }

    #[test]
    fn test_trigger_edges() {
        let pos = sample_position();
        assert_eq!(pos.settings.boost_from_bps(), 3000);
        assert_eq!(pos.settings.repay_from_bps(), 8500);
    }

    #[test]
    fn test_settings_within_platform_bounds() {
        let pos = sample_position();
        assert!(pos
            .settings
            .validate(pos.max_ltv_bps, pos.liq_threshold_bps)
            .is_ok());
    }

    #[test]
    fn test_settings_rejected_past_platform_bounds() {
        let mut settings = sample_position().settings;
        settings.repay_to_bps = 9500;
        assert!(settings.validate(6400, 8181).is_err());

        let mut settings = sample_position().settings;
        settings.boost_gap = 0;
        assert!(settings.validate(6400, 8181).is_err());
    }

    #[test]
    fn test_unleveraged_position_wants_boost() {
        let pos = sample_position();
        assert_eq!(pos.current_liq_utilization_rate_bps(), 0);
        assert_eq!(
            pos.eligible_rebalance_direction(),
            Some(RebalanceDirection::Boost)
        );
    }

    #[test]
    fn test_overleveraged_position_wants_repay() {
        let mut pos = sample_position();
        pos.values.debt_usd = 720.0; // rate ~8801 bps, past repay_from 8500
        assert_eq!(
            pos.eligible_rebalance_direction(),
            Some(RebalanceDirection::Repay)
        );
    }

    #[test]
    fn test_in_band_position_needs_nothing() {
        let mut pos = sample_position();
        pos.values.debt_usd = 400.0; // rate ~4889 bps
        assert_eq!(pos.eligible_rebalance_direction(), None);
    }
}
