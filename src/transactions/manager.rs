// src/transactions/manager.rs
//! The send loop: packs items into sets, submits them atomically or
//! sequentially, and drives retry, priority-fee escalation, and status
//! reporting. A manager instance must not service concurrent overlapping
//! `send()` calls; the lookup-table cache, status list, and fee tier are
//! mutated in place across attempts within one call.

use super::bundle::BundleSubmitter;
use super::item::{RetryContext, TransactionItem};
use super::lookup_table::LookupTableCache;
use super::priority_fee::ESCALATE_EVERY_N_FAILURES;
use super::program_errors::{self, DecodedProgramError};
use super::set::{pack_transaction_sets, unsigned_transaction, with_compute_budget, TransactionSet};
use crate::error::{LeverageError, Result};
use crate::solana::{LedgerRpc, SimulationOutcome, TransactionSigner};
use log::{debug, error, info, warn};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    message::{v0, VersionedMessage},
    signature::Signature,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Queued,
    Processing,
    Successful,
    Failed,
    Skipped,
}

/// Live status of one transaction set; exactly one entry exists per
/// currently-known set name.
#[derive(Debug, Clone)]
pub struct TransactionStatus {
    pub name: String,
    pub attempt: u32,
    pub status: TxStatus,
    pub signature: Option<Signature>,
    pub simulation_successful: Option<bool>,
    pub more_info: Option<String>,
}

impl TransactionStatus {
    fn queued(name: String, attempt: u32) -> Self {
        Self {
            name,
            attempt,
            status: TxStatus::Queued,
            signature: None,
            simulation_successful: None,
            more_info: None,
        }
    }
}

pub type StatusCallback = Arc<dyn Fn(&[TransactionStatus]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Every set lands together or not at all (bundle semantics).
    Atomic,
    /// One set at a time, each with its own bounded retry loop.
    Sequential,
}

#[derive(Clone)]
pub struct TransactionManagerConfig {
    pub mode: SendMode,
    pub total_retries: u32,
    /// Hard stop on attempts that reached the ready-to-sign stage.
    pub signable_retries: u32,
    pub retry_base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub confirm_poll_interval_ms: u64,
    pub confirm_timeout_ms: u64,
    pub default_compute_unit_limit: u32,
    /// Error variant names that bypass the retry loop entirely.
    pub abort_on: Vec<String>,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            mode: SendMode::Sequential,
            total_retries: 5,
            signable_retries: 3,
            retry_base_delay_ms: 350,
            backoff_multiplier: 2.0,
            confirm_poll_interval_ms: 500,
            confirm_timeout_ms: 30_000,
            default_compute_unit_limit: 1_400_000,
            abort_on: Vec::new(),
        }
    }
}

impl TransactionManagerConfig {
    pub fn from_config(config: &crate::config::Config, mode: SendMode) -> Self {
        Self {
            mode,
            total_retries: config.total_retries,
            signable_retries: config.signable_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
            backoff_multiplier: config.retry_backoff_multiplier,
            confirm_poll_interval_ms: config.confirm_poll_interval_ms,
            confirm_timeout_ms: config.confirm_timeout_ms,
            default_compute_unit_limit: config.default_compute_unit_limit,
            abort_on: Vec::new(),
        }
    }
}

pub struct TransactionsManager<R: LedgerRpc> {
    rpc: Arc<R>,
    signer: Arc<dyn TransactionSigner>,
    bundle_client: Option<Arc<dyn BundleSubmitter>>,
    config: TransactionManagerConfig,
    lookup_tables: LookupTableCache,
    statuses: Vec<TransactionStatus>,
    status_callback: Option<StatusCallback>,
    abort: Arc<AtomicBool>,
    signable_attempts: u32,
    blockhash_failures: u32,
}

impl<R: LedgerRpc> TransactionsManager<R> {
    pub fn new(rpc: Arc<R>, signer: Arc<dyn TransactionSigner>, config: TransactionManagerConfig) -> Self {
        Self {
            rpc,
            signer,
            bundle_client: None,
            config,
            lookup_tables: LookupTableCache::default(),
            statuses: Vec::new(),
            status_callback: None,
            abort: Arc::new(AtomicBool::new(false)),
            signable_attempts: 0,
            blockhash_failures: 0,
        }
    }

    pub fn with_bundle_client(mut self, bundle_client: Arc<dyn BundleSubmitter>) -> Self {
        self.bundle_client = Some(bundle_client);
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.status_callback = Some(callback);
        self
    }

    pub fn with_default_lookup_tables(mut self, tables: Vec<AddressLookupTableAccount>) -> Self {
        self.lookup_tables = LookupTableCache::new(tables);
        self
    }

    /// Flag for cooperative cancellation; checked right after submission.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn statuses(&self) -> &[TransactionStatus] {
        &self.statuses
    }

    /// Packs the items and submits them per the configured mode. Returns the
    /// final status list; statuses are also pushed through the callback on
    /// every transition.
    pub async fn send(&mut self, mut items: Vec<TransactionItem>) -> Result<Vec<TransactionStatus>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.statuses.clear();
        self.lookup_tables.reset();
        self.signable_attempts = 0;
        self.blockhash_failures = 0;
        self.abort.store(false, Ordering::SeqCst);

        info!(
            "Sending {} transaction items in {:?} mode",
            items.len(),
            self.config.mode
        );

        // Items refresh sequentially: later items may depend on earlier
        // items' resolved accounts.
        for item in items.iter_mut() {
            if !item.initialized {
                item.initialize().await?;
            }
        }

        match self.config.mode {
            SendMode::Atomic => self.send_atomic(items).await,
            SendMode::Sequential => self.send_sequential(items).await,
        }
    }

    // ------------------------------------------------------------------
    // Atomic mode
    // ------------------------------------------------------------------

    async fn send_atomic(&mut self, mut items: Vec<TransactionItem>) -> Result<Vec<TransactionStatus>> {
        let bundle_client = self.bundle_client.clone().ok_or_else(|| {
            LeverageError::ConfigError("atomic mode requires a bundle client".to_string())
        })?;
        let payer = self.signer.pubkey();
        let mut ctx = RetryContext::first();
        let mut last_error = LeverageError::Unknown("bundle never submitted".to_string());

        loop {
            if ctx.attempt > 0 {
                let delay = self.backoff_delay(ctx.attempt);
                debug!("Retry attempt {} after {:?}", ctx.attempt, delay);
                sleep(delay).await;
                for item in items.iter_mut() {
                    item.refetch(&ctx).await?;
                }
                self.lookup_tables.reset();
            }

            // Sets are rebuilt from scratch every attempt; refreshed
            // instructions may change how many there are.
            let all_indices: Vec<usize> = (0..items.len()).collect();
            let sets = pack_transaction_sets(
                self.rpc.as_ref(),
                &mut self.lookup_tables,
                &payer,
                &items,
                &all_indices,
            )
            .await?;
            self.reset_statuses(&sets, ctx.attempt);

            if sets.is_empty() {
                info!("Nothing left to send after refresh");
                return Ok(self.statuses.clone());
            }
            if sets.iter().all(|set| set.oracle_update_only()) {
                info!("Only oracle updates remain; skipping send");
                self.mark_all(TxStatus::Skipped, Some("oracle update only".to_string()));
                return Ok(self.statuses.clone());
            }

            match self.attempt_bundle(&sets, &ctx, bundle_client.as_ref()).await {
                Ok(signatures) => {
                    for (i, signature) in signatures.into_iter().enumerate() {
                        self.statuses[i].status = TxStatus::Successful;
                        self.statuses[i].signature = signature;
                    }
                    self.emit();
                    return Ok(self.statuses.clone());
                }
                Err(LeverageError::Aborted) => {
                    // Externally aborted; never recorded as Failed.
                    warn!("Send aborted by caller after bundle submission");
                    return Err(LeverageError::Aborted);
                }
                Err(e) => {
                    if let Some(decoded) = ignorable_program_error(&e) {
                        info!(
                            "Ignorable program error ({}): marking sets skipped",
                            decoded.message
                        );
                        self.mark_all(
                            TxStatus::Skipped,
                            Some(format!("{}: {}", decoded.program, decoded.message)),
                        );
                        return Ok(self.statuses.clone());
                    }
                    let fatal = !e.should_retry()
                        || self.config.abort_on.iter().any(|n| n.as_str() == e.variant_name());
                    self.mark_all(TxStatus::Failed, Some(e.to_string()));
                    if fatal {
                        return Err(e);
                    }
                    self.note_failure_for_fee_escalation(&e, &mut ctx);
                    last_error = e;
                }
            }

            ctx = ctx.next(Some(&last_error));
            if ctx.attempt >= self.config.total_retries {
                error!(
                    "All {} bundle attempts exhausted: {}",
                    self.config.total_retries, last_error
                );
                return Err(LeverageError::MaxRetriesExceeded(last_error.to_string()));
            }
        }
    }

    /// One bundle attempt: build, simulate, sign, submit, confirm. Returns
    /// landed signatures aligned with the set order.
    async fn attempt_bundle(
        &mut self,
        sets: &[TransactionSet],
        ctx: &RetryContext,
        bundle_client: &dyn BundleSubmitter,
    ) -> Result<Vec<Option<Signature>>> {
        self.mark_all(TxStatus::Processing, None);

        let mut messages = Vec::new();
        let mut set_for_tx = Vec::new();
        for (set_idx, set) in sets.iter().enumerate() {
            if let Some(message) = self.build_message(set, ctx).await? {
                messages.push(message);
                set_for_tx.push(set_idx);
            }
        }
        if messages.is_empty() {
            return Err(LeverageError::InstructionError(
                "no transactions to submit".to_string(),
            ));
        }

        for (message, &set_idx) in messages.iter().zip(&set_for_tx) {
            let tx = unsigned_transaction(message.clone());
            let outcome = self.rpc.simulate(&tx).await?;
            if !outcome.is_success() {
                self.statuses[set_idx].simulation_successful = Some(false);
                self.emit();
                return Err(simulation_error(&outcome));
            }
            self.statuses[set_idx].simulation_successful = Some(true);
        }
        self.emit();

        // Ready-to-sign stage: bounded separately so the signer is never
        // prompted more than `signable_retries` times.
        self.signable_attempts += 1;
        if self.signable_attempts > self.config.signable_retries {
            return Err(LeverageError::MaxRetriesExceeded(format!(
                "signable retries ({}) exhausted",
                self.config.signable_retries
            )));
        }

        let mut transactions = Vec::with_capacity(messages.len());
        for message in messages {
            transactions.push(self.signer.sign(VersionedMessage::V0(message)).await?);
        }

        let bundle_id = bundle_client.submit_bundle(&transactions).await?;
        if self.abort.load(Ordering::SeqCst) {
            return Err(LeverageError::Aborted);
        }

        let signatures = bundle_client
            .poll_bundle_status(
                &bundle_id,
                Duration::from_millis(self.config.confirm_poll_interval_ms),
                Duration::from_millis(self.config.confirm_timeout_ms),
            )
            .await?;
        if signatures.is_empty() {
            return Err(LeverageError::TimeoutError(format!(
                "bundle {} not confirmed within poll window",
                bundle_id
            )));
        }

        let mut by_set = vec![None; sets.len()];
        for (tx_idx, &set_idx) in set_for_tx.iter().enumerate() {
            by_set[set_idx] = signatures.get(tx_idx).copied();
        }
        Ok(by_set)
    }

    // ------------------------------------------------------------------
    // Sequential mode
    // ------------------------------------------------------------------

    async fn send_sequential(
        &mut self,
        mut items: Vec<TransactionItem>,
    ) -> Result<Vec<TransactionStatus>> {
        let payer = self.signer.pubkey();
        let all_indices: Vec<usize> = (0..items.len()).collect();
        let mut sets = pack_transaction_sets(
            self.rpc.as_ref(),
            &mut self.lookup_tables,
            &payer,
            &items,
            &all_indices,
        )
        .await?;
        self.reset_statuses(&sets, 0);
        let mut ctx = RetryContext::first();

        let mut idx = 0;
        while idx < sets.len() {
            if sets[idx..].iter().all(|set| set.oracle_update_only()) {
                info!("Only oracle updates remain; skipping the rest");
                for i in idx..sets.len() {
                    self.statuses[i].status = TxStatus::Skipped;
                    self.statuses[i].more_info = Some("oracle update only".to_string());
                }
                self.emit();
                break;
            }

            let mut attempts_for_set = 0u32;
            loop {
                let set = sets[idx].clone();
                self.statuses[idx].status = TxStatus::Processing;
                self.statuses[idx].attempt = ctx.attempt;
                self.emit();

                match self.try_send_set(&set, idx, &ctx).await {
                    Ok(Some(signature)) => {
                        self.statuses[idx].status = TxStatus::Successful;
                        self.statuses[idx].signature = Some(signature);
                        self.emit();
                        break;
                    }
                    Ok(None) => {
                        self.statuses[idx].status = TxStatus::Skipped;
                        self.statuses[idx].more_info = Some("nothing to send".to_string());
                        self.emit();
                        break;
                    }
                    Err(LeverageError::Aborted) => {
                        warn!("Send aborted by caller");
                        return Err(LeverageError::Aborted);
                    }
                    Err(e) => {
                        if let Some(decoded) = ignorable_program_error(&e) {
                            info!(
                                "Ignorable program error on '{}': {}",
                                set.name, decoded.message
                            );
                            self.statuses[idx].status = TxStatus::Skipped;
                            self.statuses[idx].more_info =
                                Some(format!("{}: {}", decoded.program, decoded.message));
                            self.emit();
                            break;
                        }

                        let fatal = !e.should_retry()
                            || self.config.abort_on.iter().any(|n| n.as_str() == e.variant_name());
                        if fatal {
                            self.statuses[idx].status = TxStatus::Failed;
                            self.statuses[idx].more_info = Some(e.to_string());
                            self.emit();
                            return Err(e);
                        }

                        attempts_for_set += 1;
                        if attempts_for_set >= self.config.total_retries {
                            error!(
                                "Set '{}' failed after {} attempts: {}",
                                set.name, attempts_for_set, e
                            );
                            self.statuses[idx].status = TxStatus::Failed;
                            self.statuses[idx].more_info = Some(e.to_string());
                            self.emit();
                            return Err(LeverageError::MaxRetriesExceeded(e.to_string()));
                        }

                        warn!(
                            "Set '{}' attempt {} failed: {} (retrying)",
                            set.name, attempts_for_set, e
                        );
                        let delay = self.backoff_delay(attempts_for_set);
                        sleep(delay).await;
                        self.note_failure_for_fee_escalation(&e, &mut ctx);
                        ctx = ctx.next(Some(&e));

                        // Re-derive sets from this index onward; confirmed
                        // sets stay untouched. The resplit may change how
                        // many sets remain, so the queue and status list are
                        // spliced accordingly.
                        let remaining: Vec<usize> = sets[idx..]
                            .iter()
                            .flat_map(|set| set.item_indices.iter().copied())
                            .collect();
                        for &item_idx in &remaining {
                            items[item_idx].refetch(&ctx).await?;
                        }
                        self.lookup_tables.reset();
                        let new_tail = pack_transaction_sets(
                            self.rpc.as_ref(),
                            &mut self.lookup_tables,
                            &payer,
                            &items,
                            &remaining,
                        )
                        .await?;

                        sets.truncate(idx);
                        sets.extend(new_tail);
                        self.statuses.truncate(idx);
                        for set in &sets[idx..] {
                            self.statuses
                                .push(TransactionStatus::queued(set.name.clone(), ctx.attempt));
                        }
                        self.emit();

                        if idx >= sets.len() {
                            break;
                        }
                    }
                }
            }
            idx += 1;
        }

        Ok(self.statuses.clone())
    }

    /// One sequential attempt for one set: build, simulate, sign, send,
    /// confirm within the bounded poll window.
    async fn try_send_set(
        &mut self,
        set: &TransactionSet,
        set_idx: usize,
        ctx: &RetryContext,
    ) -> Result<Option<Signature>> {
        let Some(message) = self.build_message(set, ctx).await? else {
            return Ok(None);
        };

        let tx = unsigned_transaction(message.clone());
        let outcome = self.rpc.simulate(&tx).await?;
        if !outcome.is_success() {
            self.statuses[set_idx].simulation_successful = Some(false);
            self.emit();
            return Err(simulation_error(&outcome));
        }
        self.statuses[set_idx].simulation_successful = Some(true);
        self.emit();

        self.signable_attempts += 1;
        if self.signable_attempts > self.config.signable_retries {
            return Err(LeverageError::MaxRetriesExceeded(format!(
                "signable retries ({}) exhausted",
                self.config.signable_retries
            )));
        }

        let tx = self.signer.sign(VersionedMessage::V0(message)).await?;
        let signature = self.rpc.send(&tx).await?;
        if self.abort.load(Ordering::SeqCst) {
            return Err(LeverageError::Aborted);
        }

        let start = Instant::now();
        let interval = Duration::from_millis(self.config.confirm_poll_interval_ms);
        let timeout = Duration::from_millis(self.config.confirm_timeout_ms);
        loop {
            if self.rpc.confirm(&signature).await? {
                return Ok(Some(signature));
            }
            if start.elapsed() >= timeout {
                // No signature within the window; the normal retry loop
                // decides what happens next.
                return Err(LeverageError::TimeoutError(format!(
                    "no confirmation for {} within poll window",
                    signature
                )));
            }
            sleep(interval).await;
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    async fn build_message(
        &mut self,
        set: &TransactionSet,
        ctx: &RetryContext,
    ) -> Result<Option<v0::Message>> {
        if set.instructions.is_empty() {
            return Ok(None);
        }
        let tables = self
            .lookup_tables
            .resolve(self.rpc.as_ref(), &set.lookup_table_addresses)
            .await?;
        let instructions = with_compute_budget(
            &set.instructions,
            self.config.default_compute_unit_limit,
            ctx.fee_tier.micro_lamports(),
        );
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message =
            v0::Message::try_compile(&self.signer.pubkey(), &instructions, &tables, blockhash)
                .map_err(|e| {
                    LeverageError::InstructionError(format!(
                        "message compilation for '{}': {}",
                        set.name, e
                    ))
                })?;
        Ok(Some(message))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        backoff_delay(
            self.config.retry_base_delay_ms,
            self.config.backoff_multiplier,
            attempt,
        )
    }

    fn note_failure_for_fee_escalation(&mut self, error: &LeverageError, ctx: &mut RetryContext) {
        if error.is_blockhash_expiry() {
            self.blockhash_failures += 1;
            if self.blockhash_failures % ESCALATE_EVERY_N_FAILURES == 0 && !ctx.fee_tier.is_max() {
                ctx.fee_tier = ctx.fee_tier.next();
                info!("Escalating priority fee tier to {:?}", ctx.fee_tier);
            }
        }
    }

    fn reset_statuses(&mut self, sets: &[TransactionSet], attempt: u32) {
        self.statuses = sets
            .iter()
            .map(|set| TransactionStatus::queued(set.name.clone(), attempt))
            .collect();
        self.emit();
    }

    fn mark_all(&mut self, status: TxStatus, more_info: Option<String>) {
        for entry in &mut self.statuses {
            entry.status = status;
            if more_info.is_some() {
                entry.more_info = more_info.clone();
            }
        }
        self.emit();
    }

    fn emit(&self) {
        if let Some(callback) = &self.status_callback {
            callback(&self.statuses);
        }
    }
}

/// Exponential backoff, capped at 15 seconds.
fn backoff_delay(base_ms: u64, multiplier: f64, attempt: u32) -> Duration {
    let delay_ms = base_ms as f64 * multiplier.powi(attempt.saturating_sub(1) as i32);
    Duration::from_millis(delay_ms.min(15_000.0) as u64)
}

fn simulation_error(outcome: &SimulationOutcome) -> LeverageError {
    match &outcome.err {
        Some(err) => {
            if let Some(decoded) = program_errors::decode_transaction_error(err) {
                return LeverageError::ProgramError {
                    program: decoded.program.to_string(),
                    code: decoded.code,
                    message: decoded.message.to_string(),
                };
            }
            let log_tail: Vec<&str> = outcome
                .logs
                .iter()
                .rev()
                .take(3)
                .map(|s| s.as_str())
                .collect();
            LeverageError::SimulationFailed(format!("{:?} | logs: {:?}", err, log_tail))
        }
        None => LeverageError::SimulationFailed("simulation failed without error detail".to_string()),
    }
}

/// The known "rebalance condition no longer applies" class: the affected
/// set is skipped, not failed, and does not abort the batch.
fn ignorable_program_error(error: &LeverageError) -> Option<DecodedProgramError> {
    let decoded = match error {
        LeverageError::ProgramError { code, .. } => program_errors::decode_custom_error(*code),
        LeverageError::TransactionError(msg)
        | LeverageError::SimulationFailed(msg)
        | LeverageError::RpcError(msg)
        | LeverageError::BundleError(msg) => program_errors::decode_error_message(msg),
        _ => None,
    };
    decoded.filter(|d| d.ignorable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_is_exponential_and_capped() {
        assert_eq!(backoff_delay(350, 2.0, 1), Duration::from_millis(350));
        assert_eq!(backoff_delay(350, 2.0, 2), Duration::from_millis(700));
        assert_eq!(backoff_delay(350, 2.0, 3), Duration::from_millis(1400));
        assert_eq!(backoff_delay(350, 2.0, 20), Duration::from_millis(15_000));
    }

    #[test]
    fn test_ignorable_classification_from_messages() {
        let stale = LeverageError::TransactionError(format!(
            "custom program error: 0x{:x}",
            program_errors::REBALANCE_STALE_CODE
        ));
        assert!(ignorable_program_error(&stale).is_some());

        let other = LeverageError::TransactionError("custom program error: 0x1772".to_string());
        assert!(ignorable_program_error(&other).is_none());

        let transport = LeverageError::NetworkError("connection refused".to_string());
        assert!(ignorable_program_error(&transport).is_none());
    }

    #[test]
    fn test_simulation_error_decodes_program_code() {
        use solana_sdk::instruction::InstructionError;
        use solana_sdk::transaction::TransactionError;

        let outcome = SimulationOutcome {
            units_consumed: Some(250_000),
            err: Some(TransactionError::InstructionError(
                1,
                InstructionError::Custom(6003),
            )),
            logs: vec![],
        };
        match simulation_error(&outcome) {
            LeverageError::ProgramError { code, program, .. } => {
                assert_eq!(code, 6003);
                assert_eq!(program, "leverage-automation");
            }
            other => panic!("expected ProgramError, got {:?}", other),
        }
    }
}
