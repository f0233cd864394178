// src/transactions/lookup_table.rs
//! Resolution and memoization of on-chain address lookup tables. Non-default
//! entries are dropped at the start of every send so each attempt works
//! against fresh table contents.

use crate::error::{LeverageError, Result};
use crate::solana::LedgerRpc;
use log::{debug, warn};
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    pubkey::Pubkey,
};
use std::collections::HashMap;

pub struct LookupTableCache {
    defaults: Vec<AddressLookupTableAccount>,
    resolved: HashMap<Pubkey, AddressLookupTableAccount>,
}

impl LookupTableCache {
    pub fn new(defaults: Vec<AddressLookupTableAccount>) -> Self {
        let mut cache = Self {
            defaults,
            resolved: HashMap::new(),
        };
        cache.reset();
        cache
    }

    /// Drops everything except the default tables.
    pub fn reset(&mut self) {
        self.resolved = self
            .defaults
            .iter()
            .map(|table| (table.key, table.clone()))
            .collect();
    }

    pub fn default_addresses(&self) -> Vec<Pubkey> {
        self.defaults.iter().map(|t| t.key).collect()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Resolves the given table addresses, fetching any not yet cached in a
    /// single batched account read. Tables that do not exist on chain are
    /// skipped with a warning; message compilation surfaces genuinely
    /// missing ones.
    pub async fn resolve<R: LedgerRpc + ?Sized>(
        &mut self,
        rpc: &R,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        let missing: Vec<Pubkey> = addresses
            .iter()
            .filter(|addr| !self.resolved.contains_key(addr))
            .copied()
            .collect();

        if !missing.is_empty() {
            debug!("Resolving {} lookup tables", missing.len());
            let accounts = rpc.get_multiple_accounts(&missing).await?;
            for (addr, account) in missing.iter().zip(accounts) {
                match account {
                    Some(account) => {
                        let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
                            LeverageError::ParseError(format!(
                                "lookup table {} deserialization: {}",
                                addr, e
                            ))
                        })?;
                        self.resolved.insert(
                            *addr,
                            AddressLookupTableAccount {
                                key: *addr,
                                addresses: table.addresses.to_vec(),
                            },
                        );
                    }
                    None => {
                        warn!("Lookup table {} not found on chain; skipping", addr);
                    }
                }
            }
        }

        Ok(addresses
            .iter()
            .filter_map(|addr| self.resolved.get(addr))
            .cloned()
            .collect())
    }
}

impl Default for LookupTableCache {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solana::SimulationOutcome;
    use async_trait::async_trait;
    use solana_sdk::{
        account::Account, hash::Hash, signature::Signature, transaction::VersionedTransaction,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableLedger {
        tables: HashMap<Pubkey, Vec<Pubkey>>,
        fetches: AtomicUsize,
    }

    impl TableLedger {
        fn with_table(addr: Pubkey, contents: Vec<Pubkey>) -> Self {
            let mut tables = HashMap::new();
            tables.insert(addr, contents);
            Self {
                tables,
                fetches: AtomicUsize::new(0),
            }
        }

        fn serialized_table(addresses: &[Pubkey]) -> Vec<u8> {
            use solana_sdk::address_lookup_table::state::LookupTableMeta;
            let table = AddressLookupTable {
                meta: LookupTableMeta::default(),
                addresses: std::borrow::Cow::Borrowed(addresses),
            };
            AddressLookupTable::serialize_for_tests(table).unwrap()
        }
    }

    #[async_trait]
    impl LedgerRpc for TableLedger {
        async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimulationOutcome> {
            unimplemented!()
        }
        async fn send(&self, _tx: &VersionedTransaction) -> Result<Signature> {
            unimplemented!()
        }
        async fn confirm(&self, _signature: &Signature) -> Result<bool> {
            unimplemented!()
        }
        async fn get_account(&self, _pubkey: &Pubkey) -> Result<Option<Account>> {
            unimplemented!()
        }
        async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(pubkeys
                .iter()
                .map(|addr| {
                    self.tables.get(addr).map(|contents| Account {
                        lamports: 1,
                        data: Self::serialized_table(contents),
                        owner: solana_sdk::address_lookup_table::program::id(),
                        executable: false,
                        rent_epoch: 0,
                    })
                })
                .collect())
        }
        async fn get_latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::default())
        }
        async fn get_slot(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_resolution_is_memoized() {
        let addr = Pubkey::new_unique();
        let contents = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let ledger = TableLedger::with_table(addr, contents.clone());
        let mut cache = LookupTableCache::default();

        let first = cache.resolve(&ledger, &[addr]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].addresses, contents);

        let second = cache.resolve(&ledger, &[addr]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(ledger.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_skipped() {
        let ledger = TableLedger::with_table(Pubkey::new_unique(), vec![]);
        let mut cache = LookupTableCache::default();
        let resolved = cache.resolve(&ledger, &[Pubkey::new_unique()]).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_reset_retains_only_defaults() {
        let default_table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: vec![Pubkey::new_unique()],
        };
        let extra_addr = Pubkey::new_unique();
        let ledger = TableLedger::with_table(extra_addr, vec![Pubkey::new_unique()]);
        let mut cache = LookupTableCache::new(vec![default_table.clone()]);

        cache.resolve(&ledger, &[extra_addr]).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.reset();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.default_addresses(), vec![default_table.key]);
    }
}
