// src/solana/rpc.rs
use crate::error::{LeverageError, Result};
use crate::rebalance::flash_loan::SideLiquidity;
use crate::solana::{LedgerRpc, SimulationOutcome};
use crate::utils::TokenAmount;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use solana_client::{
    nonblocking::rpc_client::RpcClient as NonBlockingRpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::state::Mint;
use solana_sdk::program_pack::Pack;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_COMMITMENT: CommitmentConfig = CommitmentConfig::confirmed();

/// Provides high-availability RPC with retries/fallbacks.
pub struct SolanaRpcClient {
    pub primary_client: Arc<NonBlockingRpcClient>,
    pub fallback_clients: Vec<Arc<NonBlockingRpcClient>>,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl SolanaRpcClient {
    pub fn new(
        primary_endpoint: &str,
        fallback_endpoints: Vec<String>,
        max_retries: usize,
        retry_delay: Duration,
    ) -> Self {
        let primary_client = Arc::new(NonBlockingRpcClient::new_with_commitment(
            primary_endpoint.to_string(),
            DEFAULT_COMMITMENT,
        ));

        let fallback_clients = fallback_endpoints
            .iter()
            .map(|url| {
                Arc::new(NonBlockingRpcClient::new_with_commitment(
                    url.clone(),
                    DEFAULT_COMMITMENT,
                ))
            })
            .collect();

        Self {
            primary_client,
            fallback_clients,
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            &config.rpc_url,
            config.rpc_url_backup.clone().unwrap_or_default(),
            config.rpc_max_retries.unwrap_or(3),
            Duration::from_millis(config.rpc_retry_delay_ms.unwrap_or(250)),
        )
    }

    async fn execute_with_retry_and_fallback<F, Fut, T>(
        &self,
        operation_name: &str,
        mut rpc_call_fn: F,
    ) -> Result<T>
    where
        F: FnMut(Arc<NonBlockingRpcClient>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, solana_client::client_error::ClientError>>
            + Send,
        T: Send,
    {
        let mut last_error: Option<solana_client::client_error::ClientError> = None;

        for attempt in 0..self.max_retries {
            match rpc_call_fn(Arc::clone(&self.primary_client)).await {
                Ok(result) => {
                    debug!(
                        "[RPC HA - {}] Primary client succeeded on attempt {}",
                        operation_name,
                        attempt + 1
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        "[RPC HA - {}] Primary client attempt {}/{} failed: {}",
                        operation_name,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.max_retries - 1 {
                        let mut delay_ms = self.retry_delay.as_millis() as u64;
                        if delay_ms > 0 {
                            let jitter_val = rand::thread_rng().gen_range(0..(delay_ms / 4).max(1));
                            delay_ms += jitter_val;
                        }
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }

        for (i, fallback_client) in self.fallback_clients.iter().enumerate() {
            debug!(
                "[RPC HA - {}] Attempting with fallback client #{}",
                operation_name,
                i + 1
            );
            match rpc_call_fn(Arc::clone(fallback_client)).await {
                Ok(result) => {
                    info!(
                        "[RPC HA - {}] Fallback client #{} succeeded.",
                        operation_name,
                        i + 1
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        "[RPC HA - {}] Fallback client #{} failed: {}",
                        operation_name,
                        i + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        let final_error_message = format!("[RPC HA - {}] All RPC attempts failed.", operation_name);
        error!("{}", final_error_message);
        Err(match last_error {
            Some(e) => LeverageError::RpcError(format!("{}: {}", final_error_message, e)),
            None => LeverageError::RpcError(final_error_message),
        })
    }

    pub async fn get_token_account_balance(&self, pubkey: &Pubkey) -> Result<TokenAmount> {
        let op_name = format!("get_token_account_balance({})", pubkey);
        let pubkey = *pubkey;
        let result = self
            .execute_with_retry_and_fallback(&op_name, |client| async move {
                client.get_token_account_balance(&pubkey).await
            })
            .await?;

        let amount = result.amount.parse::<u64>().map_err(|e| {
            LeverageError::ParseError(format!("token balance for {}: {}", pubkey, e))
        })?;
        Ok(TokenAmount::new(amount, result.decimals))
    }

    /// USD value of the signer's associated token accounts for the two
    /// position mints; feeds the signer flash-loan fallback.
    pub async fn get_wallet_side_liquidity(
        &self,
        wallet: &Pubkey,
        supply_mint: &Pubkey,
        supply_price_usd: f64,
        debt_mint: &Pubkey,
        debt_price_usd: f64,
    ) -> Result<SideLiquidity> {
        let supply_ata = get_associated_token_address(wallet, supply_mint);
        let debt_ata = get_associated_token_address(wallet, debt_mint);

        let supply_usd = match self.get_token_account_balance(&supply_ata).await {
            Ok(balance) => balance.usd_value(supply_price_usd),
            Err(e) => {
                debug!("No supply-side wallet balance for {}: {}", wallet, e);
                0.0
            }
        };
        let debt_usd = match self.get_token_account_balance(&debt_ata).await {
            Ok(balance) => balance.usd_value(debt_price_usd),
            Err(e) => {
                debug!("No debt-side wallet balance for {}: {}", wallet, e);
                0.0
            }
        };

        Ok(SideLiquidity {
            supply_usd,
            debt_usd,
        })
    }

    pub async fn get_token_mint_decimals(&self, mint_pubkey: &Pubkey) -> Result<u8> {
        let op_name = format!("get_token_mint_decimals({})", mint_pubkey);
        let mint_pubkey = *mint_pubkey;
        let account_data = self
            .execute_with_retry_and_fallback(&op_name, |client| async move {
                client.get_account_data(&mint_pubkey).await
            })
            .await?;

        Mint::unpack(&account_data)
            .map(|mint_info| mint_info.decimals)
            .map_err(|e| {
                LeverageError::ParseError(format!(
                    "Failed to unpack mint account data for {}: {}",
                    mint_pubkey, e
                ))
            })
    }

    /// Checks the health of the RPC client, primarily by querying the primary client.
    pub async fn is_healthy(&self) -> bool {
        debug!("[RPC HA - is_healthy] Checking RPC health...");
        match self.primary_client.get_health().await {
            Ok(_) => {
                debug!("[RPC HA - is_healthy] Primary RPC client is healthy.");
                true
            }
            Err(e) => {
                warn!(
                    "[RPC HA - is_healthy] Primary RPC client health check failed: {}",
                    e
                );
                false
            }
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpcClient {
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome> {
        let tx = tx.clone();
        let response = self
            .execute_with_retry_and_fallback("simulate_transaction", move |client| {
                let tx = tx.clone();
                async move { client.simulate_transaction(&tx).await }
            })
            .await?;

        let value = response.value;
        Ok(SimulationOutcome {
            units_consumed: value.units_consumed,
            err: value.err,
            logs: value.logs.unwrap_or_default(),
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature> {
        // Preflight is skipped; the manager simulates explicitly beforehand.
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            ..RpcSendTransactionConfig::default()
        };
        let tx = tx.clone();
        self.execute_with_retry_and_fallback("send_transaction", move |client| {
            let tx = tx.clone();
            let config = config.clone();
            async move { client.send_transaction_with_config(&tx, config).await }
        })
        .await
    }

    async fn confirm(&self, signature: &Signature) -> Result<bool> {
        let signature = *signature;
        let response = self
            .execute_with_retry_and_fallback("confirm_transaction", move |client| async move {
                client
                    .confirm_transaction_with_commitment(&signature, DEFAULT_COMMITMENT)
                    .await
            })
            .await?;
        Ok(response.value)
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>> {
        let pubkey = *pubkey;
        let response = self
            .execute_with_retry_and_fallback("get_account", move |client| async move {
                client
                    .get_account_with_commitment(&pubkey, DEFAULT_COMMITMENT)
                    .await
            })
            .await?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let pubkeys = pubkeys.to_vec();
        self.execute_with_retry_and_fallback("get_multiple_accounts", move |client| {
            let pubkeys = pubkeys.clone();
            async move { client.get_multiple_accounts(&pubkeys).await }
        })
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.execute_with_retry_and_fallback("get_latest_blockhash", |client| async move {
            client.get_latest_blockhash().await
        })
        .await
    }

    async fn get_slot(&self) -> Result<u64> {
        self.execute_with_retry_and_fallback("get_slot", |client| async move {
            client.get_slot().await
        })
        .await
    }
}
