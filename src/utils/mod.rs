// src/utils/mod.rs
use log::info;
use serde::{Deserialize, Serialize};

pub const BPS_SCALE: f64 = 10_000.0;

/// Converts basis points into a unit fraction (5000 -> 0.5).
pub fn from_bps(bps: u16) -> f64 {
    bps as f64 / BPS_SCALE
}

/// Converts a unit fraction into rounded basis points (0.5 -> 5000).
pub fn to_bps(fraction: f64) -> u16 {
    (fraction * BPS_SCALE).round().clamp(0.0, u16::MAX as f64) as u16
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenAmount {
    pub amount: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(amount: u64, decimals: u8) -> Self {
        Self { amount, decimals }
    }

    pub fn to_float(&self) -> f64 {
        let divisor = 10u64.pow(self.decimals as u32) as f64;
        self.amount as f64 / divisor
    }

    pub fn from_float(value: f64, decimals: u8) -> Self {
        let multiplier = 10u64.pow(decimals as u32) as f64;
        Self {
            amount: (value * multiplier).round().max(0.0) as u64,
            decimals,
        }
    }

    /// USD value of this amount at the given token price.
    pub fn usd_value(&self, price_usd: f64) -> f64 {
        self.to_float() * price_usd
    }
}

/// Base units of a token equivalent to the given USD value at the given price.
pub fn base_units_from_usd(usd: f64, decimals: u8, price_usd: f64) -> u64 {
    if price_usd <= 0.0 {
        return 0;
    }
    TokenAmount::from_float(usd / price_usd, decimals).amount
}

pub fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("solana_rbpf", log::LevelFilter::Warn)
        .level_for("solana_runtime::message_processor", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}
