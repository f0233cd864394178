// src/transactions/program_errors.rs
//! Decoding of on-chain custom error codes through each external program's
//! own error table. One known code classifies as ignorable: the affected
//! set is skipped instead of failed.

use lazy_static::lazy_static;
use solana_sdk::instruction::InstructionError;
use solana_sdk::transaction::TransactionError;

#[derive(Debug, Clone)]
pub struct ProgramErrorTable {
    pub program: &'static str,
    pub errors: &'static [(u32, &'static str)],
}

/// Lending automation program: rebalance no longer applies by the time the
/// transaction lands. The position moved back into its band on its own.
pub const REBALANCE_STALE_CODE: u32 = 6015;

const AUTOMATION_ERRORS: &[(u32, &'static str)] = &[
    (6000, "incorrect signer or position authority"),
    (6001, "invalid position settings"),
    (6002, "position utilization outside allowed bounds"),
    (6003, "stale price data"),
    (6004, "incorrect token accounts for position"),
    (6005, "incorrect debt adjustment for target rate"),
    (6011, "missing required oracle account"),
    (REBALANCE_STALE_CODE, "rebalance condition no longer applies"),
];

const LENDING_VENUE_ERRORS: &[(u32, &'static str)] = &[
    (6001, "reserve liquidity insufficient for borrow"),
    (6002, "borrow would exceed collateral limits"),
    (6005, "obligation unhealthy"),
    (6009, "flash loan not repaid within transaction"),
    (6016, "reserve stale, refresh required"),
];

lazy_static! {
    static ref ERROR_TABLES: Vec<ProgramErrorTable> = vec![
        ProgramErrorTable {
            program: "leverage-automation",
            errors: AUTOMATION_ERRORS,
        },
        ProgramErrorTable {
            program: "lending-venue",
            errors: LENDING_VENUE_ERRORS,
        },
    ];
}

#[derive(Debug, Clone)]
pub struct DecodedProgramError {
    pub program: &'static str,
    pub code: u32,
    pub message: &'static str,
    pub ignorable: bool,
}

/// Looks a custom error code up across the registered program tables. The
/// automation program is consulted first; its codes shadow venue codes.
pub fn decode_custom_error(code: u32) -> Option<DecodedProgramError> {
    for table in ERROR_TABLES.iter() {
        if let Some(&(_, message)) = table.errors.iter().find(|(c, _)| *c == code) {
            return Some(DecodedProgramError {
                program: table.program,
                code,
                message,
                ignorable: table.program == "leverage-automation" && code == REBALANCE_STALE_CODE,
            });
        }
    }
    None
}

/// Decodes a failed transaction's error if it carries a custom program code.
pub fn decode_transaction_error(err: &TransactionError) -> Option<DecodedProgramError> {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
            decode_custom_error(*code)
        }
        _ => None,
    }
}

/// Extracts and decodes a `custom program error: 0x...` code embedded in a
/// transport error message; send-path failures only surface as strings.
pub fn decode_error_message(message: &str) -> Option<DecodedProgramError> {
    let marker = "custom program error: 0x";
    let start = message.find(marker)? + marker.len();
    let hex: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    let code = u32::from_str_radix(&hex, 16).ok()?;
    decode_custom_error(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_rebalance_is_ignorable() {
        let decoded = decode_custom_error(REBALANCE_STALE_CODE).unwrap();
        assert!(decoded.ignorable);
        assert_eq!(decoded.program, "leverage-automation");
    }

    #[test]
    fn test_other_codes_are_not_ignorable() {
        let decoded = decode_custom_error(6003).unwrap();
        assert!(!decoded.ignorable);
        assert!(decode_custom_error(59999).is_none());
    }

    #[test]
    fn test_decode_from_transaction_error() {
        let err = TransactionError::InstructionError(2, InstructionError::Custom(6005));
        let decoded = decode_transaction_error(&err).unwrap();
        assert_eq!(decoded.code, 6005);

        assert!(decode_transaction_error(&TransactionError::BlockhashNotFound).is_none());
    }

    #[test]
    fn test_decode_from_message_string() {
        let msg = format!(
            "Transaction simulation failed: Error processing Instruction 3: custom program error: 0x{:x}",
            REBALANCE_STALE_CODE
        );
        let decoded = decode_error_message(&msg).unwrap();
        assert_eq!(decoded.code, REBALANCE_STALE_CODE);
        assert!(decoded.ignorable);

        assert!(decode_error_message("connection refused").is_none());
    }
}
