// src/transactions/set.rs
//! Greedy bin packing of transaction items into the fewest protocol-valid
//! transactions. Deterministic and not globally optimal; the global problem
//! is NP-hard.

use super::item::{ItemKind, TransactionItem};
use super::lookup_table::LookupTableCache;
use crate::error::{LeverageError, Result};
use crate::solana::LedgerRpc;
use itertools::Itertools;
use log::debug;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::collections::HashSet;

/// Single-transaction serialized byte limit.
pub const MAX_TRANSACTION_SIZE: usize = solana_sdk::packet::PACKET_DATA_SIZE;
/// Unique account locks allowed when lookup tables are in use.
pub const MAX_ACCOUNT_LOCKS: usize = 64;

/// Placeholder compute-budget values used during size measurement. The
/// encoded length of these instructions does not depend on the values.
const SIZING_CU_LIMIT: u32 = 1_400_000;
const SIZING_CU_PRICE: u64 = 1_000_000;

/// An ordered group of items that fits in one transaction. Rebuilt from
/// scratch on every retry, never mutated in place across attempts.
#[derive(Debug, Clone)]
pub struct TransactionSet {
    pub name: String,
    /// Indices into the caller's item list; used to target refetches.
    pub item_indices: Vec<usize>,
    pub kinds: Vec<ItemKind>,
    pub instructions: Vec<Instruction>,
    pub lookup_table_addresses: Vec<Pubkey>,
}

impl TransactionSet {
    fn from_items(items: &[TransactionItem], indices: &[usize]) -> Self {
        let name = indices
            .iter()
            .map(|&i| items[i].name.as_str())
            .join(" + ");
        let kinds = indices.iter().map(|&i| items[i].kind).collect();
        let instructions = indices
            .iter()
            .flat_map(|&i| items[i].instructions().iter().cloned())
            .collect();
        let lookup_table_addresses = indices
            .iter()
            .flat_map(|&i| items[i].lookup_table_addresses().iter().copied())
            .unique()
            .collect();
        Self {
            name,
            item_indices: indices.to_vec(),
            kinds,
            instructions,
            lookup_table_addresses,
        }
    }

    /// True when every member is an oracle refresh with no economic effect.
    pub fn oracle_update_only(&self) -> bool {
        !self.kinds.is_empty() && self.kinds.iter().all(|k| *k == ItemKind::OracleUpdate)
    }
}

/// Prepends the two compute-budget instructions every transaction carries.
pub fn with_compute_budget(
    instructions: &[Instruction],
    cu_limit: u32,
    cu_price_micro_lamports: u64,
) -> Vec<Instruction> {
    let mut all = Vec::with_capacity(instructions.len() + 2);
    all.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
    all.push(ComputeBudgetInstruction::set_compute_unit_price(
        cu_price_micro_lamports,
    ));
    all.extend_from_slice(instructions);
    all
}

/// Serialized size of the v0 transaction these instructions compile into,
/// with placeholder signatures counted.
pub fn serialized_transaction_size(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
) -> Result<usize> {
    let message = v0::Message::try_compile(payer, instructions, tables, Hash::default())
        .map_err(|e| LeverageError::InstructionError(format!("message compilation: {}", e)))?;
    let num_signatures = message.header.num_required_signatures as usize;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: VersionedMessage::V0(message),
    };
    Ok(bincode::serialize(&tx)?.len())
}

fn unique_locks(payer: &Pubkey, items: &[&TransactionItem]) -> usize {
    let mut accounts: HashSet<Pubkey> = HashSet::new();
    accounts.insert(*payer);
    accounts.insert(solana_sdk::compute_budget::id());
    for item in items {
        accounts.extend(item.unique_accounts());
    }
    accounts.len()
}

async fn fits<R: LedgerRpc + ?Sized>(
    rpc: &R,
    lut_cache: &mut LookupTableCache,
    payer: &Pubkey,
    items: &[&TransactionItem],
) -> Result<bool> {
    if unique_locks(payer, items) > MAX_ACCOUNT_LOCKS {
        return Ok(false);
    }
    let table_addresses: Vec<Pubkey> = items
        .iter()
        .flat_map(|item| item.lookup_table_addresses().iter().copied())
        .unique()
        .collect();
    let tables = lut_cache.resolve(rpc, &table_addresses).await?;
    let instructions: Vec<Instruction> = items
        .iter()
        .flat_map(|item| item.instructions().iter().cloned())
        .collect();
    let sized = with_compute_budget(&instructions, SIZING_CU_LIMIT, SIZING_CU_PRICE);
    match serialized_transaction_size(payer, &sized, &tables) {
        Ok(size) => Ok(size <= MAX_TRANSACTION_SIZE),
        // Compilation overflow means the group cannot form a transaction.
        Err(LeverageError::InstructionError(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Packs the fetched items into the fewest sets this greedy heuristic
/// achieves: sort ascending by order priority, then walk backward absorbing
/// preceding items while size and lock limits hold.
///
/// `candidates` selects which items participate (the full range on a fresh
/// send; a suffix when resplitting after a sequential-mode failure). Items
/// whose latest fetch produced no instructions are dropped here.
pub async fn pack_transaction_sets<R: LedgerRpc + ?Sized>(
    rpc: &R,
    lut_cache: &mut LookupTableCache,
    payer: &Pubkey,
    items: &[TransactionItem],
    candidates: &[usize],
) -> Result<Vec<TransactionSet>> {
    let mut order: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| !items[i].is_empty())
        .collect();
    order.sort_by_key(|&i| items[i].order_prio());

    let mut sets_rev: Vec<TransactionSet> = Vec::new();
    let mut end = order.len();

    while end > 0 {
        let mut start = end - 1;

        let single = [&items[order[start]]];
        if !fits(rpc, lut_cache, payer, &single).await? {
            return Err(LeverageError::TransactionTooLarge(format!(
                "item '{}' exceeds transaction limits on its own",
                items[order[start]].name
            )));
        }

        while start > 0 {
            let candidate: Vec<&TransactionItem> =
                order[start - 1..end].iter().map(|&i| &items[i]).collect();
            if fits(rpc, lut_cache, payer, &candidate).await? {
                start -= 1;
            } else {
                break;
            }
        }

        let indices: Vec<usize> = order[start..end].to_vec();
        sets_rev.push(TransactionSet::from_items(items, &indices));
        end = start;
    }

    sets_rev.reverse();
    debug!(
        "Packed {} items into {} transaction sets",
        order.len(),
        sets_rev.len()
    );
    Ok(sets_rev)
}

/// Builds an unsigned transaction for simulation; real sends re-sign the
/// same message through the signer seam.
pub fn unsigned_transaction(message: v0::Message) -> VersionedTransaction {
    let num_signatures = message.header.num_required_signatures as usize;
    VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: VersionedMessage::V0(message),
    }
}
