// src/transactions/bundle.rs
//! Atomic bundle submission through a block engine. All transactions in a
//! bundle land together or not at all.

use crate::error::{LeverageError, Result};
use async_trait::async_trait;
use base64::Engine;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Block engines cap bundles at five transactions.
pub const MAX_BUNDLE_SIZE: usize = 5;

#[async_trait]
pub trait BundleSubmitter: Send + Sync {
    /// Submits the transactions as one atomic bundle, returning its id.
    async fn submit_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String>;

    /// Polls until the bundle lands or the window closes. An empty result
    /// means no signature within the window; the caller decides whether to
    /// retry. A failed bundle is an error.
    async fn poll_bundle_status(
        &self,
        bundle_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<Signature>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEngineConfig {
    pub block_engine_url: String,
    pub submission_timeout_ms: u64,
}

impl Default for BlockEngineConfig {
    fn default() -> Self {
        Self {
            block_engine_url: "https://mainnet.block-engine.jito.wtf".to_string(),
            submission_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: String,
    id: u64,
    method: String,
    params: T,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BundleStatusResult {
    value: Vec<BundleStatusValue>,
}

#[derive(Debug, Clone, Deserialize)]
struct BundleStatusValue {
    #[allow(dead_code)]
    bundle_id: String,
    transactions: Vec<String>,
    #[serde(default)]
    confirmation_status: Option<String>,
    #[serde(default)]
    err: Option<serde_json::Value>,
}

/// Block-engine JSON-RPC client for bundle submission.
pub struct BlockEngineClient {
    config: BlockEngineConfig,
    client: reqwest::Client,
    request_id_counter: AtomicU64,
}

impl BlockEngineClient {
    pub fn new(config: BlockEngineConfig) -> Self {
        info!(
            "Initializing block engine client for {}",
            config.block_engine_url
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.submission_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            request_id_counter: AtomicU64::new(1),
        }
    }

    fn validate_bundle(&self, transactions: &[VersionedTransaction]) -> Result<()> {
        if transactions.is_empty() {
            return Err(LeverageError::BundleError("Bundle cannot be empty".to_string()));
        }
        if transactions.len() > MAX_BUNDLE_SIZE {
            return Err(LeverageError::BundleError(format!(
                "Bundle too large (max {} transactions)",
                MAX_BUNDLE_SIZE
            )));
        }
        for (idx, tx) in transactions.iter().enumerate() {
            if tx.message.instructions().is_empty() {
                return Err(LeverageError::BundleError(format!(
                    "Transaction {} has no instructions",
                    idx
                )));
            }
        }
        Ok(())
    }

    fn encode_transactions(&self, transactions: &[VersionedTransaction]) -> Result<Vec<String>> {
        let mut encoded = Vec::with_capacity(transactions.len());
        for (idx, tx) in transactions.iter().enumerate() {
            let serialized = bincode::serialize(tx)?;
            debug!("Encoded bundle transaction {}: {} bytes", idx, serialized.len());
            encoded.push(base64::engine::general_purpose::STANDARD.encode(&serialized));
        }
        Ok(encoded)
    }

    async fn rpc_call<P: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: P,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.request_id_counter.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            params,
        };

        let response = self
            .client
            .post(&self.config.block_engine_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LeverageError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: JsonRpcResponse<T> = response.json().await?;
        if let Some(error) = body.error {
            return Err(LeverageError::BundleError(format!(
                "Block engine error {}: {}",
                error.code, error.message
            )));
        }
        body.result
            .ok_or_else(|| LeverageError::BundleError("Empty block engine response".to_string()))
    }
}

#[async_trait]
impl BundleSubmitter for BlockEngineClient {
    async fn submit_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String> {
        self.validate_bundle(transactions)?;
        let encoded = self.encode_transactions(transactions)?;
        info!("Submitting bundle with {} transactions", transactions.len());

        let bundle_id: String = self.rpc_call("sendBundle", (encoded,)).await?;
        info!("Bundle submitted: {}", bundle_id);
        Ok(bundle_id)
    }

    async fn poll_bundle_status(
        &self,
        bundle_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<Signature>> {
        let start = Instant::now();

        while start.elapsed() < timeout {
            let result: std::result::Result<BundleStatusResult, LeverageError> = self
                .rpc_call("getBundleStatuses", ((vec![bundle_id.to_string()]),))
                .await;

            match result {
                Ok(status) => {
                    if let Some(value) = status.value.first() {
                        if let Some(err) = &value.err {
                            if !err.is_null() {
                                return Err(LeverageError::BundleError(format!(
                                    "Bundle {} failed: {}",
                                    bundle_id, err
                                )));
                            }
                        }
                        match value.confirmation_status.as_deref() {
                            Some("confirmed") | Some("finalized") => {
                                let signatures = value
                                    .transactions
                                    .iter()
                                    .filter_map(|sig| sig.parse().ok())
                                    .collect();
                                info!("Bundle {} landed", bundle_id);
                                return Ok(signatures);
                            }
                            other => {
                                debug!("Bundle {} status: {:?}", bundle_id, other);
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("Failed to get bundle status: {}", e);
                }
            }
            sleep(interval).await;
        }

        // No signature within the window; not fatal on its own.
        warn!("Bundle {} unconfirmed after {:?}", bundle_id, timeout);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{v0, VersionedMessage};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::{hash::Hash, instruction::Instruction};

    fn dummy_tx(n_instructions: usize) -> VersionedTransaction {
        let payer = Pubkey::new_unique();
        let instructions: Vec<Instruction> = (0..n_instructions)
            .map(|_| Instruction {
                program_id: Pubkey::new_unique(),
                accounts: vec![],
                data: vec![1, 2, 3],
            })
            .collect();
        let message = v0::Message::try_compile(&payer, &instructions, &[], Hash::default()).unwrap();
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        }
    }

    #[test]
    fn test_bundle_validation() {
        let client = BlockEngineClient::new(BlockEngineConfig::default());

        assert!(client.validate_bundle(&[]).is_err());
        assert!(client.validate_bundle(&[dummy_tx(0)]).is_err());
        assert!(client.validate_bundle(&[dummy_tx(1)]).is_ok());

        let oversized: Vec<VersionedTransaction> =
            (0..MAX_BUNDLE_SIZE + 1).map(|_| dummy_tx(1)).collect();
        assert!(client.validate_bundle(&oversized).is_err());
    }

    #[test]
    fn test_transactions_encode_to_base64() {
        let client = BlockEngineClient::new(BlockEngineConfig::default());
        let encoded = client.encode_transactions(&[dummy_tx(1)]).unwrap();
        assert_eq!(encoded.len(), 1);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded[0])
            .unwrap();
        let tx: VersionedTransaction = bincode::deserialize(&decoded).unwrap();
        assert_eq!(tx.message.instructions().len(), 1);
    }

    #[test]
    fn test_bundle_status_wire_shape() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": {"slot": 12345},
                "value": [{
                    "bundle_id": "abc",
                    "transactions": ["sig1"],
                    "slot": 12345,
                    "confirmation_status": "confirmed",
                    "err": null
                }]
            }
        }"#;
        let body: JsonRpcResponse<BundleStatusResult> = serde_json::from_str(raw).unwrap();
        let result = body.result.unwrap();
        assert_eq!(
            result.value[0].confirmation_status.as_deref(),
            Some("confirmed")
        );
    }
}
