// src/rebalance/negotiator.rs
//! Iterative swap-quote negotiation. Re-quotes with a widened amount until
//! the predicted post-rebalance state satisfies the caller's bound, up to a
//! fixed iteration cap.

use super::calculator::{apply_debt_adjustment_usd, liq_utilization_rate_bps};
use super::{RebalanceDirection, RebalanceFees};
use crate::error::{LeverageError, Result};
use crate::position::PositionValues;
use crate::solana::jupiter::{SwapInput, SwapQuote, SwapQuoteProvider};
use crate::utils::TokenAmount;
use log::{debug, warn};

const MAX_ITERATIONS: usize = 20;

/// Bound a negotiated quote must satisfy. `min_output_amount` covers the
/// zero-out case; `max_liq_utilization_rate_bps` covers normal rebalances.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapCriteria {
    pub min_output_amount: Option<u64>,
    pub max_liq_utilization_rate_bps: Option<u16>,
}

/// Position state and prices needed to predict where a quote would leave
/// the utilization rate.
#[derive(Debug, Clone)]
pub struct RebalanceSwapContext {
    pub position: PositionValues,
    pub liq_threshold_bps: u16,
    pub direction: RebalanceDirection,
    pub fees: RebalanceFees,
    pub input_price_usd: f64,
    pub input_decimals: u8,
}

impl RebalanceSwapContext {
    /// Predicted utilization rate if this quote's actual fill were applied.
    /// Uses the quote's in amount, not the originally requested amount; the
    /// venue may return a different fill.
    pub fn predicted_rate_after(&self, quote: &SwapQuote) -> u16 {
        let in_usd =
            TokenAmount::new(quote.in_amount, self.input_decimals).usd_value(self.input_price_usd);
        let adjustment_usd = match self.direction {
            RebalanceDirection::Boost => in_usd,
            RebalanceDirection::Repay => -in_usd,
        };
        let (end, _) = apply_debt_adjustment_usd(
            adjustment_usd,
            &self.position,
            self.liq_threshold_bps,
            &self.fees,
        );
        liq_utilization_rate_bps(end.supply_usd, end.debt_usd, self.liq_threshold_bps)
    }
}

/// Queries the provider until a quote satisfies `criteria`, widening the
/// traded amount by `0.01 + i * 0.01` of itself each round. Boosts widen by
/// borrowing less, repays by selling more. Bounded: after the iteration cap
/// the last quote obtained is returned as-is.
pub async fn find_sufficient_quote<P: SwapQuoteProvider + ?Sized>(
    provider: &P,
    mut swap_input: SwapInput,
    context: &RebalanceSwapContext,
    criteria: &SwapCriteria,
) -> Result<SwapQuote> {
    let mut last_quote: Option<SwapQuote> = None;

    for iteration in 0..MAX_ITERATIONS {
        let quote = provider.quote(&swap_input).await?;

        let below_min_output = criteria
            .min_output_amount
            .map(|min| quote.out_amount < min)
            .unwrap_or(false);
        let over_max_rate = criteria
            .max_liq_utilization_rate_bps
            .map(|max| context.predicted_rate_after(&quote) > max)
            .unwrap_or(false);

        if !below_min_output && !over_max_rate {
            return Ok(quote);
        }

        let step =
            (swap_input.amount as f64 * (0.01 + iteration as f64 * 0.01)).round() as u64;
        swap_input.amount = match context.direction {
            RebalanceDirection::Boost => swap_input.amount.saturating_sub(step),
            RebalanceDirection::Repay => swap_input.amount.saturating_add(step),
        };
        debug!(
            "Quote iteration {} insufficient (below_min={}, over_rate={}); next amount {}",
            iteration, below_min_output, over_max_rate, swap_input.amount
        );
        last_quote = Some(quote);
    }

    warn!(
        "Quote negotiation exhausted {} iterations without satisfying criteria; using last quote",
        MAX_ITERATIONS
    );
    last_quote.ok_or_else(|| {
        LeverageError::QuoteApiError("quote negotiation produced no quote".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use solana_sdk::pubkey::Pubkey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fills exactly what is asked at a fixed price ratio.
    struct LinearProvider {
        out_per_in: f64,
        calls: AtomicUsize,
    }

    impl LinearProvider {
        fn new(out_per_in: f64) -> Self {
            Self {
                out_per_in,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SwapQuoteProvider for LinearProvider {
        async fn quote(&self, input: &SwapInput) -> Result<SwapQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SwapQuote {
                input_mint: input.input_mint,
                output_mint: input.output_mint,
                in_amount: input.amount,
                out_amount: (input.amount as f64 * self.out_per_in) as u64,
                slippage_bps: input.slippage_bps,
                price_impact_bps: 10,
            })
        }
    }

    fn boost_context() -> RebalanceSwapContext {
        RebalanceSwapContext {
            position: PositionValues::new(1000.0, 200.0),
            liq_threshold_bps: 8181,
            direction: RebalanceDirection::Boost,
            fees: RebalanceFees::default(),
            input_price_usd: 1.0,
            input_decimals: 6,
        }
    }

    fn input(amount: u64) -> SwapInput {
        SwapInput {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            amount,
            exact_in: true,
            slippage_bps: 50,
        }
    }

    #[tokio::test]
    async fn test_satisfying_quote_returns_first() {
        let provider = LinearProvider::new(0.99);
        // $100 borrow against a $1000 position stays far below the cap
        let quote = find_sufficient_quote(
            &provider,
            input(100_000_000),
            &boost_context(),
            &SwapCriteria {
                min_output_amount: None,
                max_liq_utilization_rate_bps: Some(8000),
            },
        )
        .await
        .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(quote.in_amount, 100_000_000);
    }

    #[tokio::test]
    async fn test_boost_narrows_until_rate_satisfied() {
        let provider = LinearProvider::new(0.99);
        // $700 borrow would overshoot the 5000 bps cap; the loop must shrink it
        let quote = find_sufficient_quote(
            &provider,
            input(700_000_000),
            &boost_context(),
            &SwapCriteria {
                min_output_amount: None,
                max_liq_utilization_rate_bps: Some(5000),
            },
        )
        .await
        .unwrap();
        assert!(provider.calls.load(Ordering::SeqCst) > 1);
        assert!(quote.in_amount < 700_000_000);
        let ctx = boost_context();
        assert!(ctx.predicted_rate_after(&quote) <= 5000);
    }

    #[tokio::test]
    async fn test_repay_widens_until_min_output() {
        let provider = LinearProvider::new(0.5);
        let mut ctx = boost_context();
        ctx.direction = RebalanceDirection::Repay;
        // needs 100 out, gets 0.5 per unit in: amount must roughly double
        let quote = find_sufficient_quote(
            &provider,
            input(100_000_000),
            &ctx,
            &SwapCriteria {
                min_output_amount: Some(100_000_000),
                max_liq_utilization_rate_bps: None,
            },
        )
        .await
        .unwrap();
        assert!(quote.out_amount >= 100_000_000);
        assert!(quote.in_amount > 100_000_000);
    }

    #[tokio::test]
    async fn test_terminates_within_bound_and_returns_last_quote() {
        // impossible criterion: output can never reach the minimum
        let provider = LinearProvider::new(0.0);
        let mut ctx = boost_context();
        ctx.direction = RebalanceDirection::Repay;
        let quote = find_sufficient_quote(
            &provider,
            input(1_000_000),
            &ctx,
            &SwapCriteria {
                min_output_amount: Some(1),
                max_liq_utilization_rate_bps: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_ITERATIONS);
        assert_eq!(quote.out_amount, 0);
    }
}
