// src/solana/price.rs
//! TTL-checked price cache over an external oracle. Passed by reference
//! wherever prices are read; there is no process-wide instance.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use solana_sdk::pubkey::Pubkey;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceKind {
    Realtime,
    Ema,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, mint: &Pubkey, kind: PriceKind) -> Result<f64>;
}

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    price: f64,
    fetched_at: Instant,
}

pub struct PriceCache {
    ttl: Duration,
    entries: DashMap<(Pubkey, PriceKind), PriceEntry>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached price if fresh, otherwise fetched from the source and stored.
    pub async fn get<S: PriceSource + ?Sized>(
        &self,
        source: &S,
        mint: &Pubkey,
        kind: PriceKind,
    ) -> Result<f64> {
        if let Some(entry) = self.entries.get(&(*mint, kind)) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.price);
            }
        }

        let price = source.price(mint, kind).await?;
        debug!("Price refresh {:?} {:?}: {}", mint, kind, price);
        self.entries.insert(
            (*mint, kind),
            PriceEntry {
                price,
                fetched_at: Instant::now(),
            },
        );
        Ok(price)
    }

    pub fn insert(&self, mint: Pubkey, kind: PriceKind, price: f64) {
        self.entries.insert(
            (mint, kind),
            PriceEntry {
                price,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        price: f64,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn price(&self, _mint: &Pubkey, _kind: PriceKind) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_source() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            price: 150.0,
        };
        let cache = PriceCache::new(Duration::from_secs(60));
        let mint = Pubkey::new_unique();

        let first = cache.get(&source, &mint, PriceKind::Realtime).await.unwrap();
        let second = cache.get(&source, &mint, PriceKind::Realtime).await.unwrap();
        assert_eq!(first, 150.0);
        assert_eq!(second, 150.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            price: 150.0,
        };
        let cache = PriceCache::new(Duration::from_millis(0));
        let mint = Pubkey::new_unique();

        cache.get(&source, &mint, PriceKind::Ema).await.unwrap();
        cache.get(&source, &mint, PriceKind::Ema).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_kinds_are_cached_separately() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            price: 150.0,
        };
        let cache = PriceCache::new(Duration::from_secs(60));
        let mint = Pubkey::new_unique();

        cache.get(&source, &mint, PriceKind::Realtime).await.unwrap();
        cache.get(&source, &mint, PriceKind::Ema).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
