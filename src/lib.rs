pub mod config;
pub mod error;
pub mod position;
pub mod rebalance;
pub mod solana;
pub mod transactions;
pub mod utils;

// Re-export the send-loop surface callers wire up
pub use transactions::{
    BundleSubmitter, ItemKind, SendMode, TransactionItem, TransactionManagerConfig,
    TransactionStatus, TransactionsManager, TxStatus,
};

pub use error::{LeverageError, Result};
pub use position::{AutomationSettings, Position, PositionValues};
pub use rebalance::{DebtAdjustment, RebalanceDirection, RebalanceFees};
pub use solana::{LedgerRpc, TransactionSigner};
