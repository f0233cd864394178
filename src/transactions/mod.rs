// src/transactions/mod.rs
//! Transaction assembly and dispatch: retryable instruction items, lookup
//! table resolution, size/lock-constrained bin packing, and the send loop.

pub mod bundle;
pub mod item;
pub mod lookup_table;
pub mod manager;
pub mod priority_fee;
pub mod program_errors;
pub mod set;

pub use bundle::{BlockEngineClient, BlockEngineConfig, BundleSubmitter};
pub use item::{
    FetchedInstructions, FnSource, InstructionSource, ItemKind, RetryContext, TransactionItem,
};
pub use lookup_table::LookupTableCache;
pub use manager::{
    SendMode, TransactionManagerConfig, TransactionStatus, TransactionsManager, TxStatus,
};
pub use priority_fee::PriorityFeeTier;
pub use set::{pack_transaction_sets, TransactionSet, MAX_ACCOUNT_LOCKS, MAX_TRANSACTION_SIZE};
