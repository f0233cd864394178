// src/transactions/item.rs
//! A retryable, lazily-recomputed unit of work. Items re-derive their
//! instructions on every attempt because upstream price/quote state may
//! have shifted since the previous one.

use super::priority_fee::PriorityFeeTier;
use crate::error::Result;
use async_trait::async_trait;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a transaction item semantically does. Declared at construction time
/// so downstream stages never have to re-parse instruction bytes to find out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Plain protocol interaction (deposit/withdraw/borrow/repay, open/close).
    ActionSet,
    /// Oracle refresh with no economic effect on its own.
    OracleUpdate,
    /// A rebalance step; depends on fresh oracle state.
    Rebalance,
}

/// Per-attempt state threaded explicitly through the send loop.
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    pub attempt: u32,
    pub prev_error: Option<String>,
    pub fee_tier: PriorityFeeTier,
}

impl RetryContext {
    pub fn first() -> Self {
        Self::default()
    }

    /// The context for the next attempt, carrying the failure that caused it.
    pub fn next(&self, error: Option<&crate::error::LeverageError>) -> Self {
        Self {
            attempt: self.attempt + 1,
            prev_error: error.map(|e| e.to_string()),
            fee_tier: self.fee_tier,
        }
    }
}

/// One attempt's worth of resolved instructions.
#[derive(Debug, Clone, Default)]
pub struct FetchedInstructions {
    pub instructions: Vec<Instruction>,
    pub lookup_table_addresses: Vec<Pubkey>,
    pub order_prio: i32,
}

/// Attempt-aware instruction producer. Returning `None` means the item has
/// nothing to contribute this attempt (it is dropped from packing).
#[async_trait]
pub trait InstructionSource: Send + Sync {
    async fn fetch(&self, ctx: RetryContext) -> Result<Option<FetchedInstructions>>;
}

type BoxFetchFuture = Pin<Box<dyn Future<Output = Result<Option<FetchedInstructions>>> + Send>>;

/// Adapter turning a plain closure into an [`InstructionSource`].
pub struct FnSource {
    f: Box<dyn Fn(RetryContext) -> BoxFetchFuture + Send + Sync>,
}

impl FnSource {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<FetchedInstructions>>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl InstructionSource for FnSource {
    async fn fetch(&self, ctx: RetryContext) -> Result<Option<FetchedInstructions>> {
        (self.f)(ctx).await
    }
}

#[derive(Clone)]
pub struct TransactionItem {
    source: Arc<dyn InstructionSource>,
    pub name: String,
    pub kind: ItemKind,
    pub initialized: bool,
    fetched: Option<FetchedInstructions>,
}

impl TransactionItem {
    pub fn new(source: Arc<dyn InstructionSource>, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            source,
            name: name.into(),
            kind,
            initialized: false,
            fetched: None,
        }
    }

    pub fn from_fn<F, Fut>(f: F, name: impl Into<String>, kind: ItemKind) -> Self
    where
        F: Fn(RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<FetchedInstructions>>> + Send + 'static,
    {
        Self::new(Arc::new(FnSource::new(f)), name, kind)
    }

    /// Performs attempt 0.
    pub async fn initialize(&mut self) -> Result<()> {
        self.refetch(&RetryContext::first()).await?;
        self.initialized = true;
        Ok(())
    }

    /// Recomputes instructions for a retry attempt.
    pub async fn refetch(&mut self, ctx: &RetryContext) -> Result<()> {
        self.fetched = self.source.fetch(ctx.clone()).await?;
        Ok(())
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.fetched
            .as_ref()
            .map(|f| f.instructions.as_slice())
            .unwrap_or(&[])
    }

    pub fn lookup_table_addresses(&self) -> &[Pubkey] {
        self.fetched
            .as_ref()
            .map(|f| f.lookup_table_addresses.as_slice())
            .unwrap_or(&[])
    }

    pub fn order_prio(&self) -> i32 {
        self.fetched.as_ref().map(|f| f.order_prio).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions().is_empty()
    }

    /// Program ids and account keys touched; counted against the
    /// per-transaction lock limit.
    pub fn unique_accounts(&self) -> HashSet<Pubkey> {
        let mut accounts = HashSet::new();
        for ix in self.instructions() {
            accounts.insert(ix.program_id);
            for meta in &ix.accounts {
                accounts.insert(meta.pubkey);
            }
        }
        accounts
    }
}

impl std::fmt::Debug for TransactionItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionItem")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("initialized", &self.initialized)
            .field("instructions", &self.instructions().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::AccountMeta;

    fn ix_with_accounts(program: Pubkey, accounts: &[Pubkey]) -> Instruction {
        Instruction {
            program_id: program,
            accounts: accounts
                .iter()
                .map(|k| AccountMeta::new(*k, false))
                .collect(),
            data: vec![0u8; 8],
        }
    }

    #[tokio::test]
    async fn test_initialize_fetches_attempt_zero() {
        let program = Pubkey::new_unique();
        let mut item = TransactionItem::from_fn(
            move |ctx| async move {
                assert_eq!(ctx.attempt, 0);
                Ok(Some(FetchedInstructions {
                    instructions: vec![ix_with_accounts(program, &[])],
                    lookup_table_addresses: vec![],
                    order_prio: 1,
                }))
            },
            "open",
            ItemKind::ActionSet,
        );
        assert!(!item.initialized);
        item.initialize().await.unwrap();
        assert!(item.initialized);
        assert_eq!(item.instructions().len(), 1);
        assert_eq!(item.order_prio(), 1);
    }

    #[tokio::test]
    async fn test_refetch_sees_attempt_and_prev_error() {
        let item_source = FnSource::new(|ctx: RetryContext| async move {
            let marker = if ctx.prev_error.is_some() { 2 } else { 1 };
            Ok(Some(FetchedInstructions {
                instructions: vec![Instruction {
                    program_id: Pubkey::new_unique(),
                    accounts: vec![],
                    data: vec![marker],
                }],
                lookup_table_addresses: vec![],
                order_prio: 0,
            }))
        });
        let mut item = TransactionItem::new(Arc::new(item_source), "rebalance", ItemKind::Rebalance);
        item.initialize().await.unwrap();
        assert_eq!(item.instructions()[0].data, vec![1]);

        let ctx = RetryContext::first().next(Some(&crate::error::LeverageError::RpcError(
            "timeout".to_string(),
        )));
        item.refetch(&ctx).await.unwrap();
        assert_eq!(item.instructions()[0].data, vec![2]);
    }

    #[tokio::test]
    async fn test_empty_fetch_yields_no_instructions() {
        let mut item = TransactionItem::from_fn(
            |_| async { Ok(None) },
            "noop",
            ItemKind::OracleUpdate,
        );
        item.initialize().await.unwrap();
        assert!(item.is_empty());
        assert!(item.unique_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_unique_accounts_deduplicates() {
        let program = Pubkey::new_unique();
        let shared = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let mut item = TransactionItem::from_fn(
            move |_| async move {
                Ok(Some(FetchedInstructions {
                    instructions: vec![
                        ix_with_accounts(program, &[shared, other]),
                        ix_with_accounts(program, &[shared]),
                    ],
                    lookup_table_addresses: vec![],
                    order_prio: 0,
                }))
            },
            "dedup",
            ItemKind::ActionSet,
        );
        item.initialize().await.unwrap();
        // program + shared + other
        assert_eq!(item.unique_accounts().len(), 3);
    }
}
