// src/solana/mod.rs
//! Ledger-facing seams: the RPC primitive trait, transaction signing, the
//! swap-quote provider, and the price cache.

pub mod jupiter;
pub mod price;
pub mod rpc;

use crate::error::{LeverageError, Result};
use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};

/// Outcome of a transaction simulation.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    pub units_consumed: Option<u64>,
    pub err: Option<solana_sdk::transaction::TransactionError>,
    pub logs: Vec<String>,
}

impl SimulationOutcome {
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

/// The ledger RPC primitive the transaction manager runs against.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome>;
    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature>;
    async fn confirm(&self, signature: &Signature) -> Result<bool>;
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>>;
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>>;
    async fn get_latest_blockhash(&self) -> Result<Hash>;
    async fn get_slot(&self) -> Result<u64>;
}

/// Signing seam. Wallet/key custody stays outside the crate; the manager
/// only needs a payer pubkey and a message-signing hook.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;
    async fn sign(&self, message: VersionedMessage) -> Result<VersionedTransaction>;
}

#[async_trait]
impl TransactionSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        solana_sdk::signer::Signer::pubkey(self)
    }

    async fn sign(&self, message: VersionedMessage) -> Result<VersionedTransaction> {
        VersionedTransaction::try_new(message, &[self])
            .map_err(|e| LeverageError::TransactionError(format!("signing failed: {}", e)))
    }
}
