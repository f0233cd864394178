use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LeverageError {
    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// RPC/Solana network errors
    #[error("RPC Error: {0}")]
    RpcError(String),

    /// Instruction building errors
    #[error("Instruction Error: {0}")]
    InstructionError(String),

    /// Parsing errors for account or API data
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Swap quote API specific errors
    #[error("Quote API Error: {0}")]
    QuoteApiError(String),

    /// Swap quote API rate limiting error
    #[error("Quote API rate limit exceeded")]
    QuoteRateLimitError,

    /// Swap quote API timeout error
    #[error("Quote API timeout: {0}")]
    QuoteTimeoutError(String),

    /// Timeout errors for operations
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Invalid input parameters
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// A single transaction item exceeds the serialized byte limit alone.
    /// Structural bug, never retried.
    #[error("Transaction Too Large: {0}")]
    TransactionTooLarge(String),

    /// No viable flash-loan liquidity source. Fatal, thrown before
    /// transaction construction.
    #[error("Insufficient Liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Simulation failed errors
    #[error("Simulation Failed: {0}")]
    SimulationFailed(String),

    /// Transaction/blockchain errors
    #[error("Transaction Error: {0}")]
    TransactionError(String),

    /// Bundle submission/confirmation errors
    #[error("Bundle Error: {0}")]
    BundleError(String),

    /// Decoded on-chain program error
    #[error("Program Error [{program}] {code}: {message}")]
    ProgramError {
        program: String,
        code: u32,
        message: String,
    },

    /// Send was cancelled through the cooperative abort signal. Never
    /// recorded as a failed transaction set.
    #[error("Send aborted by caller")]
    Aborted,

    /// All retry attempts exhausted
    #[error("Max Retries Exceeded: {0}")]
    MaxRetriesExceeded(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for LeverageError {
    fn from(err: serde_json::Error) -> Self {
        LeverageError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<anyhow::Error> for LeverageError {
    fn from(err: anyhow::Error) -> Self {
        LeverageError::RpcError(format!("{:#}", err))
    }
}

impl From<solana_client::client_error::ClientError> for LeverageError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        LeverageError::RpcError(format!("Solana client error: {}", err))
    }
}

impl From<reqwest::Error> for LeverageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LeverageError::QuoteTimeoutError(err.to_string())
        } else {
            LeverageError::NetworkError(format!("HTTP request failed: {}", err))
        }
    }
}

impl From<Box<bincode::ErrorKind>> for LeverageError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LeverageError::ParseError(format!("Transaction serialization error: {}", err))
    }
}

impl LeverageError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            LeverageError::NetworkError(_) => true,
            LeverageError::RpcError(_) => true,
            LeverageError::InstructionError(_) => false, // Instruction errors usually need code fixes
            LeverageError::ParseError(_) => false,       // Data format issues aren't recoverable
            LeverageError::ConfigError(_) => false,      // Config needs fixing
            LeverageError::QuoteApiError(_) => true,
            LeverageError::QuoteRateLimitError => true, // Rate limits are recoverable after waiting
            LeverageError::QuoteTimeoutError(_) => true,
            LeverageError::TimeoutError(_) => true,
            LeverageError::InvalidInput(_) => false,
            LeverageError::TransactionTooLarge(_) => false, // Structural, never retried
            LeverageError::InsufficientLiquidity(_) => false, // No source to draw from
            LeverageError::SimulationFailed(_) => true, // Simulations can be retried with fresh state
            LeverageError::TransactionError(msg) => {
                !msg.contains("signature") && !msg.contains("invalid")
            }
            LeverageError::BundleError(_) => true,
            LeverageError::ProgramError { .. } => true, // Fresh state between attempts may clear it
            LeverageError::Aborted => false,
            LeverageError::MaxRetriesExceeded(_) => false,
            LeverageError::Unknown(_) => true,
        }
    }

    /// Determines if the send loop should retry this error with refreshed state
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                LeverageError::NetworkError(_) => true,
                LeverageError::RpcError(_) => true,
                LeverageError::QuoteApiError(_) => true,
                LeverageError::QuoteRateLimitError => true,
                LeverageError::QuoteTimeoutError(_) => true,
                LeverageError::TimeoutError(_) => true,
                LeverageError::SimulationFailed(_) => true,
                LeverageError::TransactionError(_) => true,
                LeverageError::BundleError(_) => true,
                LeverageError::ProgramError { .. } => true,
                LeverageError::Unknown(_) => false, // Don't immediately retry unknown errors
                _ => false,
            }
    }

    /// Whether a blockhash-expiry-class failure occurred; these drive
    /// priority-fee escalation in the send loop.
    pub fn is_blockhash_expiry(&self) -> bool {
        match self {
            LeverageError::TransactionError(msg)
            | LeverageError::RpcError(msg)
            | LeverageError::BundleError(msg) => {
                msg.contains("BlockhashNotFound")
                    || msg.contains("blockhash")
                    || msg.contains("block height exceeded")
            }
            _ => false,
        }
    }

    /// Short stable name used by the caller-supplied "throw immediately" list
    pub fn variant_name(&self) -> &'static str {
        match self {
            LeverageError::NetworkError(_) => "NetworkError",
            LeverageError::RpcError(_) => "RpcError",
            LeverageError::InstructionError(_) => "InstructionError",
            LeverageError::ParseError(_) => "ParseError",
            LeverageError::ConfigError(_) => "ConfigError",
            LeverageError::QuoteApiError(_) => "QuoteApiError",
            LeverageError::QuoteRateLimitError => "QuoteRateLimitError",
            LeverageError::QuoteTimeoutError(_) => "QuoteTimeoutError",
            LeverageError::TimeoutError(_) => "TimeoutError",
            LeverageError::InvalidInput(_) => "InvalidInput",
            LeverageError::TransactionTooLarge(_) => "TransactionTooLarge",
            LeverageError::InsufficientLiquidity(_) => "InsufficientLiquidity",
            LeverageError::SimulationFailed(_) => "SimulationFailed",
            LeverageError::TransactionError(_) => "TransactionError",
            LeverageError::BundleError(_) => "BundleError",
            LeverageError::ProgramError { .. } => "ProgramError",
            LeverageError::Aborted => "Aborted",
            LeverageError::MaxRetriesExceeded(_) => "MaxRetriesExceeded",
            LeverageError::Unknown(_) => "Unknown",
        }
    }

    /// Categorizes error for logging and status reporting
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            LeverageError::NetworkError(_)
            | LeverageError::RpcError(_)
            | LeverageError::TimeoutError(_)
            | LeverageError::QuoteApiError(_)
            | LeverageError::QuoteRateLimitError
            | LeverageError::QuoteTimeoutError(_) => ErrorCategory::Network,
            LeverageError::ParseError(_) => ErrorCategory::Data,
            LeverageError::ConfigError(_) | LeverageError::InvalidInput(_) => {
                ErrorCategory::Configuration
            }
            LeverageError::TransactionTooLarge(_) | LeverageError::InstructionError(_) => {
                ErrorCategory::Structural
            }
            LeverageError::InsufficientLiquidity(_) => ErrorCategory::Liquidity,
            LeverageError::SimulationFailed(_)
            | LeverageError::TransactionError(_)
            | LeverageError::BundleError(_)
            | LeverageError::ProgramError { .. } => ErrorCategory::Execution,
            LeverageError::Aborted => ErrorCategory::Cancelled,
            LeverageError::MaxRetriesExceeded(_) | LeverageError::Unknown(_) => {
                ErrorCategory::Critical
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    Structural,
    Liquidity,
    Execution,
    Cancelled,
    Critical,
}

pub type Result<T> = std::result::Result<T, LeverageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_are_not_retried() {
        assert!(!LeverageError::TransactionTooLarge("item x".into()).should_retry());
        assert!(!LeverageError::InsufficientLiquidity("no source".into()).should_retry());
        assert!(!LeverageError::Aborted.should_retry());
    }

    #[test]
    fn test_transient_errors_are_retried() {
        assert!(LeverageError::RpcError("connection reset".into()).should_retry());
        assert!(LeverageError::SimulationFailed("units exceeded".into()).should_retry());
        assert!(LeverageError::QuoteRateLimitError.should_retry());
    }

    #[test]
    fn test_blockhash_expiry_detection() {
        let err = LeverageError::TransactionError("BlockhashNotFound".into());
        assert!(err.is_blockhash_expiry());
        let err = LeverageError::RpcError("transaction block height exceeded".into());
        assert!(err.is_blockhash_expiry());
        assert!(!LeverageError::NetworkError("refused".into()).is_blockhash_expiry());
    }

    #[test]
    fn test_categorize() {
        assert_eq!(
            LeverageError::InsufficientLiquidity("x".into()).categorize(),
            ErrorCategory::Liquidity
        );
        assert_eq!(
            LeverageError::Aborted.categorize(),
            ErrorCategory::Cancelled
        );
    }
}
