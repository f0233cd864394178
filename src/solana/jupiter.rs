// src/solana/jupiter.rs
//! Swap-quote provider seam plus the Jupiter HTTP client implementing it.

use crate::error::{LeverageError, Result};
use async_trait::async_trait;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::str::FromStr;
use std::time::Duration;

/// Request shape for a swap quote. `amount` is rewritten by the negotiator
/// between iterations.
#[derive(Debug, Clone)]
pub struct SwapInput {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub exact_in: bool,
    pub slippage_bps: u16,
}

/// A quote from the external swap venue. The core only reads the amounts
/// and slippage.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u16,
    pub price_impact_bps: u16,
}

#[async_trait]
pub trait SwapQuoteProvider: Send + Sync {
    async fn quote(&self, input: &SwapInput) -> Result<SwapQuote>;
}

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://quote-api.jup.ag/v6".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Jupiter quote API client.
pub struct JupiterClient {
    config: JupiterConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    slippage_bps: u16,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsRequest<'a> {
    user_public_key: String,
    quote_response: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInstruction {
    program_id: String,
    accounts: Vec<WireAccountMeta>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAccountMeta {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsResponse {
    #[serde(default)]
    setup_instructions: Vec<WireInstruction>,
    swap_instruction: WireInstruction,
    #[serde(default)]
    cleanup_instruction: Option<WireInstruction>,
    #[serde(default)]
    address_lookup_table_addresses: Vec<String>,
}

impl JupiterClient {
    pub fn new(config: JupiterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    /// Resolves a quote into venue instructions plus the lookup tables they
    /// need. The raw quote JSON is round-tripped so the venue sees exactly
    /// what it returned.
    pub async fn instructions_for(
        &self,
        user: &Pubkey,
        quote_json: &serde_json::Value,
    ) -> Result<(Vec<Instruction>, Vec<Pubkey>)> {
        let request = SwapInstructionsRequest {
            user_public_key: user.to_string(),
            quote_response: quote_json,
        };
        let url = format!("{}/swap-instructions", self.config.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let response = Self::check_status(response)?;
        let body: SwapInstructionsResponse = response.json().await?;

        let mut instructions = Vec::new();
        for wire in body
            .setup_instructions
            .iter()
            .chain(std::iter::once(&body.swap_instruction))
            .chain(body.cleanup_instruction.iter())
        {
            instructions.push(decode_instruction(wire)?);
        }
        let lookup_tables = body
            .address_lookup_table_addresses
            .iter()
            .map(|s| parse_pubkey(s))
            .collect::<Result<Vec<_>>>()?;
        Ok((instructions, lookup_tables))
    }

    fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LeverageError::QuoteRateLimitError);
        }
        if !status.is_success() {
            return Err(LeverageError::QuoteApiError(format!(
                "HTTP error: {}",
                status
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl SwapQuoteProvider for JupiterClient {
    async fn quote(&self, input: &SwapInput) -> Result<SwapQuote> {
        let swap_mode = if input.exact_in { "ExactIn" } else { "ExactOut" };
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&swapMode={}&slippageBps={}",
            self.config.base_url,
            input.input_mint,
            input.output_mint,
            input.amount,
            swap_mode,
            input.slippage_bps
        );
        debug!("Requesting quote: {}", url);

        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response)?;
        let body: QuoteResponse = response.json().await?;

        Ok(SwapQuote {
            input_mint: parse_pubkey(&body.input_mint)?,
            output_mint: parse_pubkey(&body.output_mint)?,
            in_amount: parse_amount(&body.in_amount)?,
            out_amount: parse_amount(&body.out_amount)?,
            slippage_bps: body.slippage_bps,
            price_impact_bps: body
                .price_impact_pct
                .as_deref()
                .and_then(|pct| pct.parse::<f64>().ok())
                .map(|pct| (pct * 100.0).round().clamp(0.0, u16::MAX as f64) as u16)
                .unwrap_or(0),
        })
    }
}

fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| LeverageError::ParseError(format!("pubkey {}: {}", s, e)))
}

fn parse_amount(s: &str) -> Result<u64> {
    s.parse::<u64>()
        .map_err(|e| LeverageError::ParseError(format!("amount {}: {}", s, e)))
}

fn decode_instruction(wire: &WireInstruction) -> Result<Instruction> {
    let program_id = parse_pubkey(&wire.program_id)?;
    let accounts = wire
        .accounts
        .iter()
        .map(|meta| {
            Ok(AccountMeta {
                pubkey: parse_pubkey(&meta.pubkey)?,
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(&wire.data)
        .map_err(|e| LeverageError::ParseError(format!("instruction data: {}", e)))?;
    Ok(Instruction {
        program_id,
        accounts,
        data,
    })
}
